use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{
  Datelike,
  Days,
  Local,
  NaiveDate,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use tracing::trace;

use crate::store::LoadStatus;
use crate::task::{
  ParseEnumError,
  Priority,
  Status,
  Task
};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum StatusFilter {
  #[default]
  All,
  Only(Status)
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum PriorityFilter {
  #[default]
  All,
  Only(Priority)
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum DateRange {
  #[default]
  All,
  Today,
  ThisWeek,
  ThisMonth
}

#[derive(
  Debug, Clone, PartialEq, Eq, Default,
)]
pub struct FilterCriteria {
  pub status:     StatusFilter,
  pub priority:   PriorityFilter,
  pub date_range: DateRange,
  pub search:     String
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum SortField {
  DueDate,
  Title
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum SortDirection {
  Ascending,
  Descending
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct SortCriteria {
  pub field:     SortField,
  pub direction: SortDirection
}

/// Pins "today" so that date-range
/// filtering stays a pure function.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct Calendar {
  pub today:      NaiveDate,
  pub week_start: Weekday
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewNotice {
  Loading,
  Error(String),
  NoTasks,
  NoMatches
}

impl FromStr for StatusFilter {
  type Err = ParseEnumError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    if s.trim().eq_ignore_ascii_case("all")
    {
      return Ok(Self::All);
    }
    s.parse().map(Self::Only)
  }
}

impl FromStr for PriorityFilter {
  type Err = ParseEnumError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    if s.trim().eq_ignore_ascii_case("all")
    {
      return Ok(Self::All);
    }
    s.parse().map(Self::Only)
  }
}

impl FromStr for DateRange {
  type Err = ParseEnumError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "all" => Ok(Self::All),
      | "today" => Ok(Self::Today),
      | "week" | "this-week" => {
        Ok(Self::ThisWeek)
      }
      | "month" | "this-month" => {
        Ok(Self::ThisMonth)
      }
      | other => Err(ParseEnumError::new(
        "date range",
        other
      ))
    }
  }
}

impl FromStr for SortField {
  type Err = ParseEnumError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "duedate" | "due-date" | "due" => {
        Ok(Self::DueDate)
      }
      | "title" => Ok(Self::Title),
      | other => Err(ParseEnumError::new(
        "sort field",
        other
      ))
    }
  }
}

impl SortDirection {
  #[must_use]
  pub fn flipped(self) -> Self {
    match self {
      | Self::Ascending => {
        Self::Descending
      }
      | Self::Descending => {
        Self::Ascending
      }
    }
  }
}

impl Default for SortCriteria {
  fn default() -> Self {
    Self {
      field:     SortField::DueDate,
      direction: SortDirection::Descending
    }
  }
}

impl SortCriteria {
  /// Same field flips the direction; a
  /// new field starts ascending.
  pub fn toggle(
    &mut self,
    field: SortField
  ) {
    if self.field == field {
      self.direction =
        self.direction.flipped();
    } else {
      self.field = field;
      self.direction =
        SortDirection::Ascending;
    }
  }
}

impl Calendar {
  pub fn new(
    today: NaiveDate,
    week_start: Weekday
  ) -> Self {
    Self {
      today,
      week_start
    }
  }

  /// Reads the clock in the given zone,
  /// or the system's local zone.
  pub fn local(
    week_start: Weekday,
    timezone: Option<Tz>
  ) -> Self {
    let today = match timezone {
      | Some(tz) => {
        Utc::now()
          .with_timezone(&tz)
          .date_naive()
      }
      | None => Local::now().date_naive()
    };
    Self::new(today, week_start)
  }

  pub fn is_today(
    &self,
    date: NaiveDate
  ) -> bool {
    date == self.today
  }

  pub fn is_this_week(
    &self,
    date: NaiveDate
  ) -> bool {
    week_start_of(date, self.week_start)
      == week_start_of(
        self.today,
        self.week_start
      )
  }

  pub fn is_this_month(
    &self,
    date: NaiveDate
  ) -> bool {
    date.year() == self.today.year()
      && date.month()
        == self.today.month()
  }
}

fn week_start_of(
  date: NaiveDate,
  week_start: Weekday
) -> Option<NaiveDate> {
  let offset = (date
    .weekday()
    .num_days_from_monday()
    + 7
    - week_start.num_days_from_monday())
    % 7;
  date.checked_sub_days(Days::new(
    u64::from(offset)
  ))
}

impl FilterCriteria {
  pub fn matches(
    &self,
    task: &Task,
    calendar: &Calendar
  ) -> bool {
    self.matches_with_needle(
      task,
      &self.search.to_lowercase(),
      calendar
    )
  }

  fn matches_with_needle(
    &self,
    task: &Task,
    needle: &str,
    calendar: &Calendar
  ) -> bool {
    let status_ok = match self.status {
      | StatusFilter::All => true,
      | StatusFilter::Only(status) => {
        task.status == status
      }
    };
    let priority_ok = match self.priority
    {
      | PriorityFilter::All => true,
      | PriorityFilter::Only(priority) => {
        task.priority == priority
      }
    };
    let date_ok = match self.date_range {
      | DateRange::All => true,
      | DateRange::Today => {
        calendar.is_today(task.due_date)
      }
      | DateRange::ThisWeek => {
        calendar
          .is_this_week(task.due_date)
      }
      | DateRange::ThisMonth => {
        calendar
          .is_this_month(task.due_date)
      }
    };

    status_ok
      && priority_ok
      && task.matches_text(needle)
      && date_ok
  }
}

/// Filters and orders the collection for
/// display. Deterministic for fixed
/// inputs; the input slice is untouched.
#[tracing::instrument(skip_all, fields(total = tasks.len()))]
pub fn visible_tasks(
  tasks: &[Task],
  filter: &FilterCriteria,
  sort: &SortCriteria,
  calendar: &Calendar
) -> Vec<Task> {
  let needle =
    filter.search.to_lowercase();
  let mut out: Vec<Task> = tasks
    .iter()
    .filter(|task| {
      filter.matches_with_needle(
        task, &needle, calendar
      )
    })
    .cloned()
    .collect();

  match sort.field {
    | SortField::DueDate => {
      out.sort_by(|a, b| {
        directed(
          a.due_date.cmp(&b.due_date),
          sort.direction
        )
      });
    }
    | SortField::Title => {
      trace!(
        "title ordering not applied; \
         keeping collection order"
      );
    }
  }

  trace!(
    visible = out.len(),
    "computed view"
  );
  out
}

fn directed(
  ord: Ordering,
  direction: SortDirection
) -> Ordering {
  match direction {
    | SortDirection::Ascending => ord,
    | SortDirection::Descending => {
      ord.reverse()
    }
  }
}

pub fn view_notice(
  all: &[Task],
  visible: &[Task],
  status: &LoadStatus
) -> Option<ViewNotice> {
  if status.is_loading() && all.is_empty()
  {
    return Some(ViewNotice::Loading);
  }
  if let Some(message) = status.error() {
    return Some(ViewNotice::Error(
      message.to_string()
    ));
  }
  if status.is_loading()
    || !visible.is_empty()
  {
    return None;
  }
  if all.is_empty() {
    Some(ViewNotice::NoTasks)
  } else {
    Some(ViewNotice::NoMatches)
  }
}

impl ViewNotice {
  pub fn message(&self) -> &str {
    match self {
      | Self::Loading => {
        "Loading tasks..."
      }
      | Self::Error(message) => message,
      | Self::NoTasks => {
        crate::loader::NO_TASKS_MESSAGE
      }
      | Self::NoMatches => {
        "No tasks found matching your \
         criteria"
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    Weekday
  };

  use super::{
    Calendar,
    DateRange,
    FilterCriteria,
    PriorityFilter,
    SortCriteria,
    SortDirection,
    SortField,
    StatusFilter,
    ViewNotice,
    view_notice,
    visible_tasks
  };
  use crate::store::LoadStatus;
  use crate::task::{
    Priority,
    Status,
    Task
  };

  fn day(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  fn task(
    id: &str,
    title: &str,
    due: NaiveDate
  ) -> Task {
    Task {
      id:          id.to_string(),
      title:       title.to_string(),
      description: String::new(),
      status:      Status::Todo,
      priority:    Priority::Low,
      due_date:    due
    }
  }

  fn calendar() -> Calendar {
    // Wednesday
    Calendar::new(
      day(2025, 6, 11),
      Weekday::Sun
    )
  }

  fn ids(tasks: &[Task]) -> Vec<&str> {
    tasks
      .iter()
      .map(|t| t.id.as_str())
      .collect()
  }

  #[test]
  fn default_view_sorts_due_descending()
  {
    let tasks = vec![
      task("jan", "a", day(2025, 1, 1)),
      task("jun", "b", day(2025, 6, 1)),
    ];
    let mut sort =
      SortCriteria::default();

    let out = visible_tasks(
      &tasks,
      &FilterCriteria::default(),
      &sort,
      &calendar()
    );
    assert_eq!(ids(&out), ["jun", "jan"]);

    sort.toggle(SortField::DueDate);
    assert_eq!(
      sort.direction,
      SortDirection::Ascending
    );
    let out = visible_tasks(
      &tasks,
      &FilterCriteria::default(),
      &sort,
      &calendar()
    );
    assert_eq!(ids(&out), ["jan", "jun"]);
  }

  #[test]
  fn toggle_contract() {
    let mut sort = SortCriteria {
      field:     SortField::DueDate,
      direction: SortDirection::Ascending
    };
    sort.toggle(SortField::DueDate);
    assert_eq!(
      sort.direction,
      SortDirection::Descending
    );

    let mut sort = SortCriteria {
      field:     SortField::DueDate,
      direction: SortDirection::Ascending
    };
    sort.toggle(SortField::Title);
    assert_eq!(sort, SortCriteria {
      field:     SortField::Title,
      direction: SortDirection::Ascending
    });
  }

  #[test]
  fn title_sort_keeps_collection_order()
  {
    let tasks = vec![
      task("z", "zebra", day(2025, 3, 1)),
      task("a", "apple", day(2025, 1, 1)),
    ];
    let sort = SortCriteria {
      field:     SortField::Title,
      direction: SortDirection::Ascending
    };
    let out = visible_tasks(
      &tasks,
      &FilterCriteria::default(),
      &sort,
      &calendar()
    );
    assert_eq!(ids(&out), ["z", "a"]);
  }

  #[test]
  fn search_is_case_insensitive_over_title_and_description()
   {
    let mut walk =
      task("2", "Walk dog", day(2025, 1, 2));
    walk.description =
      "bring the leash".to_string();
    let tasks = vec![
      task("1", "Buy milk", day(2025, 1, 1)),
      walk,
    ];

    for needle in ["milk", "MILK"] {
      let filter = FilterCriteria {
        search: needle.to_string(),
        ..FilterCriteria::default()
      };
      let out = visible_tasks(
        &tasks,
        &filter,
        &SortCriteria::default(),
        &calendar()
      );
      assert_eq!(ids(&out), ["1"]);
    }

    let filter = FilterCriteria {
      search: "Leash".to_string(),
      ..FilterCriteria::default()
    };
    let out = visible_tasks(
      &tasks,
      &filter,
      &SortCriteria::default(),
      &calendar()
    );
    assert_eq!(ids(&out), ["2"]);
  }

  #[test]
  fn status_and_priority_predicates_combine()
   {
    let mut a =
      task("a", "a", day(2025, 1, 1));
    a.status = Status::Done;
    a.priority = Priority::High;
    let mut b =
      task("b", "b", day(2025, 1, 1));
    b.status = Status::Done;
    let c =
      task("c", "c", day(2025, 1, 1));
    let tasks = vec![a, b, c];

    let filter = FilterCriteria {
      status: StatusFilter::Only(
        Status::Done
      ),
      priority: PriorityFilter::Only(
        Priority::High
      ),
      ..FilterCriteria::default()
    };
    let out = visible_tasks(
      &tasks,
      &filter,
      &SortCriteria::default(),
      &calendar()
    );
    assert_eq!(ids(&out), ["a"]);
  }

  #[test]
  fn date_ranges_follow_calendar_boundaries()
   {
    let tasks = vec![
      task("today", "t", day(2025, 6, 11)),
      task("sun", "t", day(2025, 6, 8)),
      task("sat", "t", day(2025, 6, 14)),
      task("next", "t", day(2025, 6, 15)),
      task("june", "t", day(2025, 6, 30)),
      task("july", "t", day(2025, 7, 1)),
    ];
    let sort = SortCriteria {
      field:     SortField::DueDate,
      direction: SortDirection::Ascending
    };
    let run = |range: DateRange,
               cal: Calendar| {
      let filter = FilterCriteria {
        date_range: range,
        ..FilterCriteria::default()
      };
      visible_tasks(
        &tasks, &filter, &sort, &cal
      )
      .into_iter()
      .map(|t| t.id)
      .collect::<Vec<_>>()
    };

    assert_eq!(
      run(DateRange::Today, calendar()),
      ["today"]
    );
    assert_eq!(
      run(DateRange::ThisWeek, calendar()),
      ["sun", "today", "sat"]
    );
    assert_eq!(
      run(
        DateRange::ThisWeek,
        Calendar::new(
          day(2025, 6, 11),
          Weekday::Mon
        )
      ),
      ["today", "sat", "next"]
    );
    assert_eq!(
      run(DateRange::ThisMonth, calendar()),
      ["sun", "today", "sat", "next", "june"]
    );
  }

  #[test]
  fn view_is_pure() {
    let tasks = vec![
      task("1", "x", day(2025, 2, 1)),
      task("2", "y", day(2025, 1, 1)),
    ];
    let snapshot = tasks.clone();
    let filter = FilterCriteria::default();
    let sort = SortCriteria::default();

    let first = visible_tasks(
      &tasks, &filter, &sort, &calendar()
    );
    let second = visible_tasks(
      &tasks, &filter, &sort, &calendar()
    );
    assert_eq!(first, second);
    assert_eq!(tasks, snapshot);
  }

  #[test]
  fn parses_filter_wire_values() {
    assert_eq!(
      "all".parse::<StatusFilter>(),
      Ok(StatusFilter::All)
    );
    assert_eq!(
      "in-progress"
        .parse::<StatusFilter>(),
      Ok(StatusFilter::Only(
        Status::InProgress
      ))
    );
    assert_eq!(
      "week".parse::<DateRange>(),
      Ok(DateRange::ThisWeek)
    );
    assert_eq!(
      "dueDate".parse::<SortField>(),
      Ok(SortField::DueDate)
    );
    assert!(
      "yesterday"
        .parse::<DateRange>()
        .is_err()
    );
  }

  #[test]
  fn notices_mirror_list_states() {
    let one =
      vec![task("1", "x", day(2025, 1, 1))];

    assert_eq!(
      view_notice(
        &[],
        &[],
        &LoadStatus::Loading
      ),
      Some(ViewNotice::Loading)
    );
    assert_eq!(
      view_notice(
        &[],
        &[],
        &LoadStatus::Errored(
          "No tasks added yet..."
            .to_string()
        )
      )
      .map(|n| n.message().to_string()),
      Some(
        "No tasks added yet..."
          .to_string()
      )
    );
    assert_eq!(
      view_notice(
        &[],
        &[],
        &LoadStatus::Loaded
      ),
      Some(ViewNotice::NoTasks)
    );
    assert_eq!(
      view_notice(
        &one,
        &[],
        &LoadStatus::Loaded
      ),
      Some(ViewNotice::NoMatches)
    );
    assert_eq!(
      view_notice(
        &one,
        &one,
        &LoadStatus::Loaded
      ),
      None
    );
  }
}
