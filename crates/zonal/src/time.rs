//! Canonical timestamps and analysis windows.
//!
//! All tables exchanged between the engines carry event-local wall-clock
//! timestamps formatted as `"%Y-%m-%d %H:%M:%S"`. Window filtering compares
//! formatted strings, which is order-preserving for this format and matches
//! the `BETWEEN` semantics of the text-typed storage the pipeline ingests
//! from. Sources stored in UTC (e.g. load forecasts) are converted to the
//! event-local zone once, at ingestion, through [`utc_to_local`].

use crate::{Result, ZonalError};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

/// Wall-clock format used in every persisted table.
pub const LOCAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse an event-local timestamp string.
pub fn parse_local(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, LOCAL_FORMAT)
        .map_err(|e| ZonalError::InvalidArgument(format!("bad timestamp {s:?}: {e}")))
}

/// Format an event-local timestamp for storage and window comparison.
pub fn format_local(dt: NaiveDateTime) -> String {
    dt.format(LOCAL_FORMAT).to_string()
}

/// Convert an offset-bearing instant (RFC 3339 input boundary) into
/// event-local wall-clock time.
pub fn to_event_local(instant: DateTime<FixedOffset>, zone: Tz) -> NaiveDateTime {
    instant.with_timezone(&zone).naive_local()
}

/// Convert a naive UTC timestamp into event-local wall-clock time.
pub fn utc_to_local(utc: NaiveDateTime, zone: Tz) -> NaiveDateTime {
    zone.from_utc_datetime(&utc).naive_local()
}

/// Whole hours between `t` and `reference` (`t - reference`), floored.
pub fn hours_between(t: NaiveDateTime, reference: NaiveDateTime) -> i64 {
    (t - reference).num_seconds().div_euclid(3600)
}

/// An inclusive-inclusive time window in event-local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TimeWindow {
    /// Window start (inclusive)
    pub start: NaiveDateTime,
    /// Window end (inclusive)
    pub end: NaiveDateTime,
}

impl TimeWindow {
    /// Create a window, rejecting `start > end`.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        if start > end {
            return Err(ZonalError::InvalidDateRange {
                start: format_local(start),
                end: format_local(end),
            });
        }
        Ok(Self { start, end })
    }

    /// Parse a window from two local timestamp strings.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_local(start)?, parse_local(end)?)
    }

    /// Whether `t` falls inside the window (both bounds inclusive).
    pub fn contains(&self, t: NaiveDateTime) -> bool {
        self.start <= t && t <= self.end
    }

    /// Formatted bounds for lexicographic string filtering.
    pub fn bounds(&self) -> (String, String) {
        (format_local(self.start), format_local(self.end))
    }
}

/// A reference period for baseline computation: an inclusive window minus an
/// optional excluded sub-window (the disruption period itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReferenceWindow {
    /// Period contributing to the baseline (inclusive)
    pub include: TimeWindow,
    /// Period subtracted from the baseline (inclusive), if any
    pub exclude: Option<TimeWindow>,
}

impl ReferenceWindow {
    /// Reference window with no exclusion.
    pub const fn new(include: TimeWindow) -> Self {
        Self {
            include,
            exclude: None,
        }
    }

    /// Reference window that skips the given disruption period.
    pub const fn excluding(include: TimeWindow, exclude: TimeWindow) -> Self {
        Self {
            include,
            exclude: Some(exclude),
        }
    }

    /// Whether `t` contributes to the baseline.
    pub fn contains(&self, t: NaiveDateTime) -> bool {
        self.include.contains(t) && !self.exclude.is_some_and(|w| w.contains(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format_round_trip() {
        let dt = parse_local("2012-10-29 14:30:00").unwrap();
        assert_eq!(format_local(dt), "2012-10-29 14:30:00");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_local("yesterday"),
            Err(ZonalError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_window_rejects_inverted_bounds() {
        let err = TimeWindow::parse("2012-11-03 00:00:00", "2012-10-28 00:00:00");
        assert!(matches!(err, Err(ZonalError::InvalidDateRange { .. })));
    }

    #[test]
    fn test_window_bounds_inclusive() {
        let w = TimeWindow::parse("2012-10-28 00:00:00", "2012-11-03 23:59:59").unwrap();
        assert!(w.contains(parse_local("2012-10-28 00:00:00").unwrap()));
        assert!(w.contains(parse_local("2012-11-03 23:59:59").unwrap()));
        assert!(!w.contains(parse_local("2012-11-04 00:00:00").unwrap()));
    }

    #[test]
    fn test_reference_window_exclusion() {
        let include = TimeWindow::parse("2012-09-01 00:00:00", "2012-12-01 00:00:00").unwrap();
        let exclude = TimeWindow::parse("2012-10-28 00:00:00", "2012-11-03 23:59:59").unwrap();
        let reference = ReferenceWindow::excluding(include, exclude);

        assert!(reference.contains(parse_local("2012-09-15 12:00:00").unwrap()));
        assert!(!reference.contains(parse_local("2012-10-29 12:00:00").unwrap()));
        assert!(reference.contains(parse_local("2012-11-04 00:00:00").unwrap()));
    }

    #[test]
    fn test_utc_to_local_edt() {
        // 2012-10-29 was still EDT (UTC-4) in New York.
        let utc = parse_local("2012-10-29 16:00:00").unwrap();
        let local = utc_to_local(utc, chrono_tz::America::New_York);
        assert_eq!(format_local(local), "2012-10-29 12:00:00");
    }

    #[test]
    fn test_hours_between_floors() {
        let reference = parse_local("2012-11-03 00:00:00").unwrap();
        let before = parse_local("2012-11-02 22:30:00").unwrap();
        let after = parse_local("2012-11-03 05:00:00").unwrap();
        assert_eq!(hours_between(before, reference), -2);
        assert_eq!(hours_between(after, reference), 5);
    }
}
