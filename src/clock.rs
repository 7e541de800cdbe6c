//! Timezone-anchored calendar day arithmetic
//!
//! Cache validity is keyed to a fixed wall-clock boundary (midnight in a
//! target timezone), not a rolling TTL. This module converts instants into
//! timezone-local calendar days and computes the wait until the next day
//! boundary.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

/// Default timezone anchoring the daily refresh boundary
pub const DEFAULT_TIMEZONE: &str = "America/New_York";

/// Errors from resolving a timezone name
#[derive(Debug, Error)]
pub enum ClockError {
    /// The configured timezone is not a known IANA zone name
    #[error("Unknown timezone: '{0}'. Expected an IANA name like 'America/New_York'")]
    UnknownTimezone(String),
}

/// A timezone-local calendar date, the unit of cache validity
///
/// Two instants belong to the same cache day iff their `DayKey`s are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DayKey(NaiveDate);

impl std::fmt::Display for DayKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Converts instants to calendar days in a fixed target timezone
///
/// The zone name is validated once at construction; a malformed name is a
/// configuration error surfaced at startup rather than a per-call failure.
#[derive(Debug, Clone, Copy)]
pub struct DayClock {
    tz: Tz,
}

impl DayClock {
    /// Creates a clock for the given IANA timezone name
    pub fn new(timezone: &str) -> Result<Self, ClockError> {
        let tz: Tz = timezone
            .parse()
            .map_err(|_| ClockError::UnknownTimezone(timezone.to_string()))?;
        Ok(Self { tz })
    }

    /// Clock for the default Eastern Time boundary
    pub fn eastern() -> Self {
        Self {
            tz: chrono_tz::America::New_York,
        }
    }

    /// The underlying timezone
    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Maps an instant to its calendar date in the target timezone
    pub fn calendar_day(&self, instant: DateTime<Utc>) -> DayKey {
        DayKey(instant.with_timezone(&self.tz).date_naive())
    }

    /// Whether two instants fall on the same calendar day in the target timezone
    pub fn same_calendar_day(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
        self.calendar_day(a) == self.calendar_day(b)
    }

    /// Non-negative duration from `instant` until the next 00:00:00 in the
    /// target timezone.
    ///
    /// Exactly at a boundary this returns a full day, never zero, so the
    /// one-shot midnight timer cannot refire immediately in a loop. A DST gap
    /// at midnight resolves to the earliest valid local time after it.
    pub fn duration_until_next_midnight(&self, instant: DateTime<Utc>) -> Duration {
        let local = instant.with_timezone(&self.tz);
        let next_day = match local.date_naive().succ_opt() {
            Some(day) => day,
            None => return Duration::days(1),
        };
        let midnight_naive = match next_day.and_hms_opt(0, 0, 0) {
            Some(t) => t,
            None => return Duration::days(1),
        };

        let midnight = match self.tz.from_local_datetime(&midnight_naive) {
            LocalResult::Single(t) => t,
            LocalResult::Ambiguous(earliest, _) => earliest,
            // Midnight was skipped by a DST transition; 01:00 always exists.
            LocalResult::None => match next_day
                .and_hms_opt(1, 0, 0)
                .and_then(|t| self.tz.from_local_datetime(&t).earliest())
            {
                Some(t) => t,
                None => return Duration::days(1),
            },
        };

        let until = midnight.with_timezone(&Utc) - instant;
        if until <= Duration::zero() {
            Duration::days(1)
        } else {
            until
        }
    }

    /// Formats an instant as a local wall-clock time for display (HH:MM)
    pub fn format_local_time(&self, instant: DateTime<Utc>) -> String {
        instant.with_timezone(&self.tz).format("%H:%M").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .expect("valid rfc3339 instant")
            .with_timezone(&Utc)
    }

    #[test]
    fn test_new_rejects_unknown_timezone() {
        let result = DayClock::new("Not/AZone");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Not/AZone"));
    }

    #[test]
    fn test_new_accepts_iana_name() {
        let clock = DayClock::new("America/New_York").expect("valid zone");
        assert_eq!(clock.timezone(), chrono_tz::America::New_York);
    }

    #[test]
    fn test_same_local_day_across_midnight_utc() {
        let clock = DayClock::eastern();
        // 23:00 ET and 23:30 ET are both March 1 in ET even though the first
        // maps to March 2 in UTC.
        let a = utc("2025-03-01T23:00:00-05:00");
        let b = utc("2025-03-01T23:30:00-05:00");
        assert!(clock.same_calendar_day(a, b));
    }

    #[test]
    fn test_et_midnight_splits_days_sharing_a_utc_date() {
        let clock = DayClock::eastern();
        // 23:30 ET Mar 1 is 04:30 UTC Mar 2; 00:30 ET Mar 2 is 05:30 UTC
        // Mar 2. Same UTC date, different ET days.
        let before = utc("2025-03-01T23:30:00-05:00");
        let after = utc("2025-03-02T00:30:00-05:00");
        assert!(!clock.same_calendar_day(before, after));
        assert_eq!(before.date_naive(), after.date_naive());
    }

    #[test]
    fn test_one_second_rollover_changes_day() {
        let clock = DayClock::eastern();
        let last = utc("2025-03-01T23:59:59-05:00");
        let first = utc("2025-03-02T00:00:01-05:00");
        assert!(!clock.same_calendar_day(last, first));
    }

    #[test]
    fn test_duration_until_next_midnight_basic() {
        let clock = DayClock::eastern();
        let at_2300 = utc("2025-03-01T23:00:00-05:00");
        assert_eq!(
            clock.duration_until_next_midnight(at_2300),
            Duration::hours(1)
        );
    }

    #[test]
    fn test_duration_at_exact_boundary_is_full_day() {
        let clock = DayClock::eastern();
        let midnight = utc("2025-03-02T00:00:00-05:00");
        assert_eq!(
            clock.duration_until_next_midnight(midnight),
            Duration::hours(24)
        );
    }

    #[test]
    fn test_duration_is_strictly_decreasing_within_a_day() {
        let clock = DayClock::eastern();
        let earlier = utc("2025-03-01T10:00:00-05:00");
        let later = utc("2025-03-01T15:45:00-05:00");
        let d1 = clock.duration_until_next_midnight(earlier);
        let d2 = clock.duration_until_next_midnight(later);
        assert!(d1 > d2);
        assert!(d2 > Duration::zero());
    }

    #[test]
    fn test_duration_resets_after_boundary() {
        let clock = DayClock::eastern();
        let just_before = utc("2025-03-01T23:59:00-05:00");
        let just_after = utc("2025-03-02T00:01:00-05:00");
        assert_eq!(
            clock.duration_until_next_midnight(just_before),
            Duration::minutes(1)
        );
        assert_eq!(
            clock.duration_until_next_midnight(just_after),
            Duration::hours(24) - Duration::minutes(1)
        );
    }

    #[test]
    fn test_duration_across_spring_forward() {
        let clock = DayClock::eastern();
        // 2025-03-09 is the US spring-forward date: the local day is 23h
        // long. From 01:00 EST the next midnight is 22 wall-clock hours away.
        let one_am = utc("2025-03-09T01:00:00-05:00");
        assert_eq!(
            clock.duration_until_next_midnight(one_am),
            Duration::hours(22)
        );
    }

    #[test]
    fn test_day_key_display() {
        let clock = DayClock::eastern();
        let key = clock.calendar_day(utc("2025-03-01T12:00:00-05:00"));
        assert_eq!(key.to_string(), "2025-03-01");
    }

    #[test]
    fn test_format_local_time() {
        let clock = DayClock::eastern();
        let instant = utc("2025-03-01T23:05:00-05:00");
        assert_eq!(clock.format_local_time(instant), "23:05");
    }
}
