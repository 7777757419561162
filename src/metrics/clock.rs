//! Wall-clock source for uptime reporting
//!
//! `SystemClock` in production; tests drive `ManualClock` by hand.

use chrono::{DateTime, Utc};
use std::sync::Arc;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Seconds elapsed since construction, read through a [`Clock`]
pub struct Uptime {
    clock: Arc<dyn Clock>,
    started_at: DateTime<Utc>,
}

impl Uptime {
    pub fn start(clock: Arc<dyn Clock>) -> Self {
        let started_at = clock.now();
        Self { clock, started_at }
    }

    /// Fractional seconds, millisecond resolution; never negative
    pub fn seconds(&self) -> f64 {
        let elapsed = self.clock.now() - self.started_at;
        elapsed.num_milliseconds().max(0) as f64 / 1000.0
    }
}

#[cfg(test)]
pub struct ManualClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self
            .now
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self
            .now
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uptime_starts_at_zero() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let uptime = Uptime::start(clock);

        assert_eq!(uptime.seconds(), 0.0);
    }

    #[test]
    fn test_uptime_tracks_clock() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let uptime = Uptime::start(clock.clone());

        clock.advance(chrono::Duration::milliseconds(1_250));

        assert_eq!(uptime.seconds(), 1.25);
    }

    #[test]
    fn test_clock_going_backwards_clamps_to_zero() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let uptime = Uptime::start(clock.clone());

        clock.advance(chrono::Duration::seconds(-5));

        assert_eq!(uptime.seconds(), 0.0);
    }
}
