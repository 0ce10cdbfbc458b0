use tracing::trace;

/// Visibility of the task-creation dialog.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq,
)]
pub struct ModalController {
  visible: bool
}

impl ModalController {
  pub fn open(&mut self) {
    trace!("create modal opened");
    self.visible = true;
  }

  pub fn close(&mut self) {
    trace!("create modal closed");
    self.visible = false;
  }

  pub fn is_visible(&self) -> bool {
    self.visible
  }
}
