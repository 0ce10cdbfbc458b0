use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use chrono::Weekday;
use chrono_tz::Tz;
use tracing::{
  debug,
  info,
  trace,
  warn
};

const RC_ENV_VAR: &str = "TASKDECKRC";
const RC_FILE_NAME: &str =
  ".taskdeckrc";

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    for (key, value) in [
      ("data.location", "~/.taskdeck"),
      ("load.delay_ms", "0"),
      ("calendar.weekstart", "sunday"),
      ("color", "on")
    ] {
      map.insert(
        key.to_string(),
        value.to_string()
      );
    }
    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc = resolve_rc_path(
      rc_override
    )?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading rc file");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no rc file found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn load_delay(
    &self
  ) -> anyhow::Result<Duration> {
    let raw = self
      .get("load.delay_ms")
      .unwrap_or_else(|| "0".to_string());
    let ms =
      raw.trim().parse::<u64>().map_err(
        |_| {
          anyhow!(
            "invalid load.delay_ms: \
             {raw}"
          )
        }
      )?;
    Ok(Duration::from_millis(ms))
  }

  pub fn week_start(
    &self
  ) -> anyhow::Result<Weekday> {
    let raw = self
      .get("calendar.weekstart")
      .unwrap_or_else(|| {
        "sunday".to_string()
      });
    raw.trim().parse::<Weekday>().map_err(
      |_| {
        anyhow!(
          "invalid calendar.weekstart: \
           {raw}"
        )
      }
    )
  }

  pub fn timezone(
    &self
  ) -> anyhow::Result<Option<Tz>> {
    let Some(raw) = self.get("timezone")
    else {
      return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty()
      || trimmed
        .eq_ignore_ascii_case("local")
    {
      return Ok(None);
    }
    trimmed
      .parse::<Tz>()
      .map(Some)
      .map_err(|err| {
        anyhow!(
          "invalid timezone {trimmed}: \
           {err}"
        )
      })
  }

  pub fn color(
    &self
  ) -> anyhow::Result<bool> {
    let raw = self
      .get("color")
      .unwrap_or_else(|| "on".to_string());
    parse_bool(&raw).ok_or_else(|| {
      anyhow!(
        "invalid color setting: {raw}"
      )
    })
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let line = raw_line
        .split_once('#')
        .map_or(raw_line, |(before, _)| {
          before
        })
        .trim();
      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        if self
          .loaded_files
          .contains(&include_path)
        {
          warn!(include = %include_path.display(), "include cycle; skipping");
          continue;
        }
        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping rc file"
    );
    return Ok(None);
  };
  let candidate = home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".taskdeck"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let expanded =
    expand_tilde(Path::new(include));
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> Option<bool> {
  match s
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Some(true),
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use chrono::Weekday;
  use tempfile::tempdir;

  use super::Config;

  #[test]
  fn defaults_are_usable_without_rc() {
    let cfg = Config::default();
    assert_eq!(
      cfg.load_delay().expect("delay"),
      Duration::ZERO
    );
    assert_eq!(
      cfg.week_start().expect("weekstart"),
      Weekday::Sun
    );
    assert_eq!(
      cfg.timezone().expect("tz"),
      None
    );
    assert!(cfg.color().expect("color"));
  }

  #[test]
  fn rc_file_with_include_and_comments()
  {
    let temp = tempdir().expect("tempdir");
    let extra = temp.path().join("extra.rc");
    std::fs::write(
      &extra,
      "timezone = Europe/Berlin\n"
    )
    .expect("write include");
    let rc = temp.path().join("main.rc");
    std::fs::write(
      &rc,
      "# taskdeck settings\n\
       load.delay_ms = 1000  # like the web client\n\
       calendar.weekstart = monday\n\
       include extra.rc\n"
    )
    .expect("write rc");

    let cfg = Config::load(Some(rc.as_path()))
      .expect("load rc");
    assert_eq!(cfg.loaded_files.len(), 2);
    assert_eq!(
      cfg.load_delay().expect("delay"),
      Duration::from_millis(1000)
    );
    assert_eq!(
      cfg.week_start().expect("weekstart"),
      Weekday::Mon
    );
    assert_eq!(
      cfg
        .timezone()
        .expect("tz")
        .map(|tz| tz.name()),
      Some("Europe/Berlin")
    );
  }

  #[test]
  fn overrides_strip_rc_prefix_and_win() {
    let mut cfg = Config::default();
    cfg.apply_overrides([
      (
        "rc.color".to_string(),
        "off".to_string()
      ),
      (
        "load.delay_ms".to_string(),
        "soon".to_string()
      )
    ]);
    assert!(!cfg.color().expect("color"));
    assert!(cfg.load_delay().is_err());
  }

  #[test]
  fn malformed_line_is_reported() {
    let temp = tempdir().expect("tempdir");
    let rc = temp.path().join("bad.rc");
    std::fs::write(&rc, "just words\n")
      .expect("write rc");
    let err = Config::load(Some(rc.as_path()))
      .expect_err("should fail");
    assert!(
      err
        .to_string()
        .contains("invalid config line")
    );
  }
}
