//! Extraction window planning
//!
//! Turns the configured date range and the stored bookmark into an ordered
//! sequence of half-open `[start, end)` day windows. Planning is a pure
//! function of its inputs: a [`WindowPlan`] can be iterated any number of
//! times and always yields the same windows.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A contiguous date span covered by one extraction pass: `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExtractionWindow {
    /// First day covered (inclusive)
    pub start: NaiveDate,
    /// First day not covered (exclusive)
    pub end: NaiveDate,
}

impl ExtractionWindow {
    /// Create a window, rejecting empty or inverted spans
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, String> {
        if start >= end {
            return Err(format!("window start {start} must be before end {end}"));
        }
        Ok(Self { start, end })
    }

    /// Last day covered by the window (inclusive), as the report API expects
    pub fn last_day(&self) -> NaiveDate {
        self.end.pred_opt().unwrap_or(self.start)
    }

    /// Number of days in the window
    pub fn days(&self) -> u64 {
        (self.end - self.start).num_days().max(0) as u64
    }

    /// Whether `day` falls inside the window
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day < self.end
    }
}

impl fmt::Display for ExtractionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Inputs that shape the plan, independent of the bookmark
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerConfig {
    /// Lookback width used when there is no bookmark and no `start_date`
    pub report_range_days: u32,
    /// Optional lower bound overriding the lookback
    pub start_date: Option<NaiveDate>,
    /// Optional fixed end (exclusive); never later than today
    pub end_date: Option<NaiveDate>,
    /// Days re-covered before the bookmark to absorb late data
    pub overlap_days: u32,
    /// Width of each window in days
    pub window_days: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            report_range_days: 30,
            start_date: None,
            end_date: None,
            overlap_days: 0,
            window_days: 1,
        }
    }
}

/// Ordered, non-overlapping windows exactly covering `[start, end)`
///
/// When resuming with an overlap margin, the margin is folded into the first
/// window so later windows stay aligned on the bookmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPlan {
    start: NaiveDate,
    anchor: NaiveDate,
    end: NaiveDate,
    window_days: u64,
}

impl WindowPlan {
    /// Plan windows for a run
    ///
    /// # Arguments
    /// * `config` - Range and granularity settings
    /// * `bookmark` - Exclusive lower bound left by the previous run, if any
    /// * `today` - Current UTC date; data for today is never requested
    pub fn new(config: &PlannerConfig, bookmark: Option<NaiveDate>, today: NaiveDate) -> Self {
        let end = match config.end_date {
            Some(end_date) => end_date.min(today),
            None => today,
        };

        let (start, anchor) = match bookmark {
            Some(bookmark) => {
                let rewound = sub_days(bookmark, config.overlap_days);
                let start = match config.start_date {
                    Some(start_date) => rewound.max(start_date),
                    None => rewound,
                };
                (start, bookmark.max(start))
            }
            None => {
                let start = config
                    .start_date
                    .unwrap_or_else(|| sub_days(today, config.report_range_days));
                (start, start)
            }
        };

        Self {
            start,
            anchor,
            end,
            window_days: u64::from(config.window_days.max(1)),
        }
    }

    /// Inclusive lower bound of the planned range
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Exclusive upper bound of the planned range
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Whether the run has nothing to extract
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Number of windows the plan yields
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Iterate the windows in ascending order
    pub fn iter(&self) -> Windows {
        Windows {
            next_start: self.start,
            first_end: add_days(self.anchor, self.window_days),
            end: self.end,
            window_days: self.window_days,
            first: true,
        }
    }
}

impl IntoIterator for WindowPlan {
    type Item = ExtractionWindow;
    type IntoIter = Windows;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for &WindowPlan {
    type Item = ExtractionWindow;
    type IntoIter = Windows;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator over the windows of a [`WindowPlan`]
#[derive(Debug, Clone)]
pub struct Windows {
    next_start: NaiveDate,
    first_end: NaiveDate,
    end: NaiveDate,
    window_days: u64,
    first: bool,
}

impl Iterator for Windows {
    type Item = ExtractionWindow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_start >= self.end {
            return None;
        }

        let candidate = if self.first {
            self.first = false;
            self.first_end.max(add_days(self.next_start, 1))
        } else {
            add_days(self.next_start, self.window_days)
        };
        let window_end = candidate.min(self.end);

        let window = ExtractionWindow {
            start: self.next_start,
            end: window_end,
        };
        self.next_start = window_end;
        Some(window)
    }
}

fn add_days(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_add_days(Days::new(days))
        .unwrap_or(NaiveDate::MAX)
}

fn sub_days(date: NaiveDate, days: u32) -> NaiveDate {
    date.checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MIN)
}
