//! Partitioning of the harvest range into query windows.
//!
//! A harvest walks backwards in time from an initial end date down to a global floor. Each
//! step covers at most `window_size_days` and ends one day before the previous window started,
//! so windows are contiguous at day granularity, never overlap and strictly decrease. The last
//! window is clamped to the floor rather than skipped, which may make it shorter than the
//! others.
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use gleaner::window::next_window;
//!
//! let floor = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
//! let start = Utc.with_ymd_and_hms(2023, 6, 15, 0, 0, 0).unwrap();
//!
//! let first = next_window(start, floor, 7).unwrap();
//! assert_eq!(first.end, Utc.with_ymd_and_hms(2023, 6, 14, 0, 0, 0).unwrap());
//! assert_eq!(first.start, Utc.with_ymd_and_hms(2023, 6, 7, 0, 0, 0).unwrap());
//!
//! let second = next_window(first.start, floor, 7).unwrap();
//! assert_eq!(second.start, floor);
//!
//! assert!(next_window(second.start, floor, 7).is_none());
//! ```

use super::*;

/// A closed range of submission dates to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
  /// Oldest instant covered
  pub start: DateTime<Utc>,
  /// Newest instant covered
  pub end:   DateTime<Utc>,
}

impl Window {
  /// The first window of a run: `[max(initial_end - days, floor), initial_end]`.
  ///
  /// Returns `None` when `initial_end` already lies before the floor.
  pub fn seed(
    initial_end: DateTime<Utc>,
    global_floor: DateTime<Utc>,
    window_size_days: u32,
  ) -> Option<Self> {
    let start = back_off(initial_end, window_size_days, global_floor);
    (start <= initial_end).then_some(Self { start, end: initial_end })
  }

  /// Start date as used in the source's date-range clause.
  pub fn start_stamp(&self) -> String { self.start.format("%Y%m%d").to_string() }

  /// End date as used in the source's date-range clause.
  pub fn end_stamp(&self) -> String { self.end.format("%Y%m%d").to_string() }
}

impl Display for Window {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} to {}", self.start.format("%Y-%m-%d"), self.end.format("%Y-%m-%d"))
  }
}

/// Computes the window that precedes the one starting at `current_start`.
///
/// The new window ends one day before `current_start` and starts `window_size_days` earlier
/// than that. A start before `global_floor` is clamped to the floor; if the clamped start then
/// lies after the end, the floor has been passed and the walk is over.
pub fn next_window(
  current_start: DateTime<Utc>,
  global_floor: DateTime<Utc>,
  window_size_days: u32,
) -> Option<Window> {
  let end = current_start.checked_sub_signed(days(1))?;
  let start = back_off(end, window_size_days, global_floor);
  (start <= end).then_some(Window { start, end })
}

/// Iterator over the windows of a run, newest first.
///
/// Yields the [seed window](Window::seed) and then repeatedly applies [`next_window`].
#[derive(Debug, Clone)]
pub struct WindowPlanner {
  /// Lower bound no window may cross
  global_floor:     DateTime<Utc>,
  /// Span of each window in days
  window_size_days: u32,
  /// The window to yield next
  next:             Option<Window>,
}

impl WindowPlanner {
  /// Plans a walk from `initial_end` back to `global_floor`.
  pub fn new(
    global_floor: DateTime<Utc>,
    initial_end: DateTime<Utc>,
    window_size_days: u32,
  ) -> Self {
    Self {
      global_floor,
      window_size_days,
      next: Window::seed(initial_end, global_floor, window_size_days),
    }
  }

  /// The floor this planner walks down to.
  pub fn global_floor(&self) -> DateTime<Utc> { self.global_floor }
}

impl Iterator for WindowPlanner {
  type Item = Window;

  fn next(&mut self) -> Option<Window> {
    let current = self.next.take()?;
    self.next = next_window(current.start, self.global_floor, self.window_size_days);
    Some(current)
  }
}

/// Midnight UTC at the start of `date`.
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> { Utc.from_utc_datetime(&date.into()) }

/// `end` moved back by `window_size_days`, clamped to `global_floor`.
///
/// A span reaching past the earliest representable date clamps to the floor as well.
fn back_off(
  end: DateTime<Utc>,
  window_size_days: u32,
  global_floor: DateTime<Utc>,
) -> DateTime<Utc> {
  end
    .checked_sub_signed(days(window_size_days))
    .map_or(global_floor, |start| start.max(global_floor))
}

/// Shorthand for a span of whole days.
fn days(n: u32) -> TimeDelta { TimeDelta::days(i64::from(n)) }
