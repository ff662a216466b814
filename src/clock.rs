use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, Local, LocalResult, TimeZone, Utc};

/// Wall-clock source in milliseconds since the Unix epoch (UTC).
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Settable clock for tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Next occurrence of `hour:00:00` strictly after `now`, in `now`'s time zone.
pub fn next_wall_time<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut day = now.date_naive();
    loop {
        if let Some(naive) = day.and_hms_opt(hour.min(23), 0, 0) {
            let candidate = match tz.from_local_datetime(&naive) {
                LocalResult::Single(dt) => Some(dt),
                LocalResult::Ambiguous(earliest, _) => Some(earliest),
                // the hour was skipped by a DST jump
                LocalResult::None => None,
            };
            if let Some(candidate) = candidate {
                if candidate > *now {
                    return candidate;
                }
            }
        }
        day += Duration::days(1);
    }
}

/// Milliseconds timestamp of the next local `hour:00`.
pub fn next_local_hour_ms(now_ms: i64, hour: u32) -> i64 {
    let now = match Local.timestamp_millis_opt(now_ms) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(dt, _) => dt,
        LocalResult::None => Local::now(),
    };
    next_wall_time(&now, hour).timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_wall_time_rolls_to_tomorrow_after_hour() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 22, 15, 0).unwrap();
        let next = next_wall_time(&now, 6);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 11, 6, 0, 0).unwrap());
    }

    #[test]
    fn next_wall_time_same_day_before_hour() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 2, 0, 0).unwrap();
        let next = next_wall_time(&now, 6);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 10, 6, 0, 0).unwrap());
    }

    #[test]
    fn next_wall_time_is_strictly_after_now() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 6, 0, 0).unwrap();
        let next = next_wall_time(&now, 6);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 11, 6, 0, 0).unwrap());
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        clock.advance(500);
        assert_eq!(clock.now_ms(), 1_500);
        clock.set(10);
        assert_eq!(clock.now_ms(), 10);
    }
}
