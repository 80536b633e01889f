//! Assignment windows and their lifecycle classification.
//!
//! Status is never stored; it is derived from the window bounds and an
//! explicit `now` every time it is needed.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use cohort_id::{CandidateId, ResourceId};
use serde::{Deserialize, Serialize};

use crate::resource::ResourceKind;

/// A candidate's attachment to a resource for a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentWindow {
    pub candidate_id: CandidateId,
    pub resource_id: ResourceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_kind: Option<ResourceKind>,
    /// Raw start bound as stored upstream.
    #[serde(default)]
    pub start_date: Option<String>,
    /// Raw end bound as stored upstream.
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub is_current: bool,
}

impl AssignmentWindow {
    pub fn start_bound(&self) -> Option<DateBound> {
        self.start_date.as_deref().and_then(DateBound::parse)
    }

    pub fn end_bound(&self) -> Option<DateBound> {
        self.end_date.as_deref().and_then(DateBound::parse)
    }

    pub fn classify(&self, now: DateTime<Utc>) -> WindowStatus {
        classify(self, now)
    }
}

/// One end of a window: a calendar day or an exact instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateBound {
    Day(NaiveDate),
    At(DateTime<Utc>),
}

impl DateBound {
    /// Parse `YYYY-MM-DD` or RFC 3339. Returns `None` for anything else.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Some(Self::Day(day));
        }

        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| Self::At(dt.with_timezone(&Utc)))
    }

    /// Earliest instant covered by this bound (used when it opens a window).
    pub fn first_instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Day(day) => day
                .and_hms_opt(0, 0, 0)
                .map(|naive| Utc.from_utc_datetime(&naive)),
            Self::At(at) => Some(*at),
        }
    }

    /// Latest instant covered by this bound (used when it closes a window).
    pub fn last_instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Day(day) => day
                .and_hms_nano_opt(23, 59, 59, 999_999_999)
                .map(|naive| Utc.from_utc_datetime(&naive)),
            Self::At(at) => Some(*at),
        }
    }
}

impl fmt::Display for DateBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Day(day) => write!(f, "{}", day.format("%Y-%m-%d")),
            Self::At(at) => f.write_str(&at.to_rfc3339()),
        }
    }
}

/// Validated window bounds, `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidWindow {
    pub start: DateBound,
    pub end: DateBound,
}

impl ValidWindow {
    /// Returns `None` if either bound has no instant or the window is inverted.
    pub fn new(start: DateBound, end: DateBound) -> Option<Self> {
        let opens = start.first_instant()?;
        let closes = end.last_instant()?;
        (opens <= closes).then_some(Self { start, end })
    }
}

/// Lifecycle status of a window relative to a reference time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStatus {
    Upcoming,
    Current,
    Completed,
    Unknown,
}

impl fmt::Display for WindowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Upcoming => "upcoming",
            Self::Current => "current",
            Self::Completed => "completed",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Classify a window against `now`. Both bounds are inclusive.
pub fn classify(window: &AssignmentWindow, now: DateTime<Utc>) -> WindowStatus {
    let (Some(start), Some(end)) = (window.start_bound(), window.end_bound()) else {
        return WindowStatus::Unknown;
    };
    classify_bounds(start, end, now)
}

/// Classify already-parsed bounds against `now`.
pub fn classify_bounds(start: DateBound, end: DateBound, now: DateTime<Utc>) -> WindowStatus {
    let (Some(opens), Some(closes)) = (start.first_instant(), end.last_instant()) else {
        return WindowStatus::Unknown;
    };

    if now < opens {
        WindowStatus::Upcoming
    } else if now <= closes {
        WindowStatus::Current
    } else {
        WindowStatus::Completed
    }
}

/// A window paired with its derived status, for history views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedWindow {
    pub window: AssignmentWindow,
    pub status: WindowStatus,
}

/// Classify every window, ordered by start. Unknown windows go last,
/// even when their start parses.
pub fn classify_history(windows: &[AssignmentWindow], now: DateTime<Utc>) -> Vec<ClassifiedWindow> {
    let mut classified: Vec<ClassifiedWindow> = windows
        .iter()
        .map(|window| ClassifiedWindow {
            status: classify(window, now),
            window: window.clone(),
        })
        .collect();

    classified.sort_by(|a, b| {
        let a_unknown = a.status == WindowStatus::Unknown;
        let b_unknown = b.status == WindowStatus::Unknown;
        let a_start = a.window.start_bound().and_then(|b| b.first_instant());
        let b_start = b.window.start_bound().and_then(|b| b.first_instant());
        let by_start = match (a_start, b_start) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        a_unknown
            .cmp(&b_unknown)
            .then(by_start)
            .then_with(|| a.window.resource_id.cmp(&b.window.resource_id))
    });

    classified
}
