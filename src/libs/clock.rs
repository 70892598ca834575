//! Wall-clock source for the engine.

use crate::libs::rule::Millis;
use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> Millis;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> Millis {
        Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Millis) -> Self {
        Self { now: AtomicI64::new(start) }
    }

    pub fn set(&self, now: Millis) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Millis) {
        self.now.fetch_add(by, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> Millis {
        self.now.load(Ordering::SeqCst)
    }
}

/// Epoch milliseconds of the most recent local midnight at or before `now`.
pub fn last_local_midnight(now: Millis) -> Millis {
    let Some(now_utc) = DateTime::<Utc>::from_timestamp_millis(now) else {
        return now;
    };
    let Some(today) = now_utc.with_timezone(&Local).date_naive().and_hms_opt(0, 0, 0) else {
        return now;
    };
    // Midnight can be skipped by a DST change; fall back to the earliest valid instant.
    Local
        .from_local_datetime(&today)
        .earliest()
        .map(|midnight| midnight.timestamp_millis())
        .unwrap_or(now)
}

/// Time from `now` until the next local midnight.
pub fn until_next_local_midnight(now: DateTime<Local>) -> std::time::Duration {
    let tomorrow = now.date_naive().succ_opt().and_then(|date| date.and_hms_opt(0, 0, 0));
    let next = tomorrow.and_then(|midnight| Local.from_local_datetime(&midnight).earliest());
    let wait = match next {
        Some(next) => next.signed_duration_since(now),
        None => Duration::days(1),
    };
    wait.to_std().unwrap_or(std::time::Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_moves_only_on_demand() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_millis(), 1_000);
        clock.advance(500);
        assert_eq!(clock.now_millis(), 1_500);
        clock.set(10);
        assert_eq!(clock.now_millis(), 10);
    }

    #[test]
    fn test_last_local_midnight_is_not_after_now() {
        let now = Utc::now().timestamp_millis();
        let midnight = last_local_midnight(now);
        assert!(midnight <= now);
        assert!(now - midnight <= 25 * 60 * 60 * 1000);
    }

    #[test]
    fn test_next_midnight_is_within_a_day() {
        let wait = until_next_local_midnight(Local::now());
        assert!(wait <= std::time::Duration::from_secs(25 * 60 * 60));
    }
}
