//! Clock source and hour-bucket arithmetic.
//!
//! All rotation and reminder decisions are made against hour-aligned UTC
//! timestamps so a trigger that fires twice in the same hour selects the
//! same cohort.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Timelike, Utc};

use crate::models::RotationHour;

/// Supplies the current UTC time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// `at` with minutes, seconds and sub-seconds dropped.
pub fn truncate_to_hour(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

/// Hour-of-day bucket that `at` falls into.
pub fn hour_bucket(at: DateTime<Utc>) -> RotationHour {
    // hour() is always 0..=23
    RotationHour::new(at.hour() as u8).unwrap_or(RotationHour::MIDNIGHT)
}

/// Exclusive lower bound for "already rotated in this window": a user whose
/// last rotation is at or after this instant is not due again.
pub fn rotation_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    truncate_to_hour(now) - Duration::hours(23)
}

/// Activities notified at or after this instant are still frozen.
pub fn notification_cutoff(now: DateTime<Utc>, freeze_window: Duration) -> DateTime<Utc> {
    truncate_to_hour(now) - freeze_window
}

/// First whole hour strictly after `now`.
pub fn next_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    truncate_to_hour(now) + Duration::hours(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, s).unwrap()
    }

    #[test]
    fn truncates_to_whole_hour() {
        let t = at(5, 42, 17) + Duration::milliseconds(250);
        assert_eq!(truncate_to_hour(t), at(5, 0, 0));
        assert_eq!(truncate_to_hour(at(5, 0, 0)), at(5, 0, 0));
    }

    #[test]
    fn bucket_is_utc_hour() {
        assert_eq!(hour_bucket(at(0, 59, 59)).get(), 0);
        assert_eq!(hour_bucket(at(23, 1, 0)).get(), 23);
    }

    #[test]
    fn rotation_cutoff_is_23_hours_before_bucket_start() {
        assert_eq!(
            rotation_cutoff(at(5, 30, 0)),
            Utc.with_ymd_and_hms(2024, 3, 9, 6, 0, 0).unwrap()
        );
    }

    #[test]
    fn notification_cutoff_uses_truncated_now() {
        let cutoff = notification_cutoff(at(20, 45, 0), Duration::hours(15));
        assert_eq!(cutoff, at(5, 0, 0));
        // repeated calls within the hour agree
        assert_eq!(cutoff, notification_cutoff(at(20, 1, 0), Duration::hours(15)));
    }

    #[test]
    fn next_hour_rolls_over_midnight() {
        assert_eq!(
            next_hour(at(23, 10, 0)),
            Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap()
        );
        assert_eq!(next_hour(at(4, 0, 0)), at(5, 0, 0));
    }

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::new(at(1, 0, 0));
        clock.advance(Duration::hours(2));
        assert_eq!(clock.now(), at(3, 0, 0));
        clock.set(at(9, 0, 0));
        assert_eq!(clock.now(), at(9, 0, 0));
    }
}
