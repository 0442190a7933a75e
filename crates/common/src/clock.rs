//! Clock and polling utilities.
//!
//! The media framework only exposes synchronous state queries ("is the
//! output still active?"), so waits are expressed as a [`PollSchedule`]:
//! an explicit check interval plus an optional upper bound.

use std::time::{Duration, Instant};

/// Wall-clock anchored timer for one capture run.
#[derive(Debug, Clone)]
pub struct RunClock {
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339).
    epoch_wall: String,
}

impl RunClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Seconds elapsed since the clock started.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    /// Wall-clock time at start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }
}

/// How to wait for a condition by repeated checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// Sleep between two checks.
    pub interval: Duration,

    /// Give up after this long. `None` polls until the condition holds.
    pub timeout: Option<Duration>,
}

/// Result of [`PollSchedule::wait_until`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The condition held after `waited`.
    Satisfied { waited: Duration },
    /// The timeout elapsed with the condition still false.
    TimedOut { waited: Duration },
}

impl PollOutcome {
    pub fn timed_out(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    pub fn waited(&self) -> Duration {
        match *self {
            Self::Satisfied { waited } | Self::TimedOut { waited } => waited,
        }
    }
}

impl PollSchedule {
    /// Poll forever at `interval`.
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            timeout: None,
        }
    }

    /// Poll at `interval`, giving up after `timeout`.
    pub fn bounded(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout: Some(timeout),
        }
    }

    /// Build from millisecond settings as stored in the config.
    pub fn from_millis(interval_ms: u64, timeout_ms: Option<u64>) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms.max(1)),
            timeout: timeout_ms.map(Duration::from_millis),
        }
    }

    /// Number of checks a bounded schedule performs after the first one.
    pub fn max_retries(&self) -> Option<u64> {
        let interval_ns = self.interval.as_nanos().max(1);
        self.timeout
            .map(|timeout| u64::try_from(timeout.as_nanos() / interval_ns).unwrap_or(u64::MAX))
    }

    /// Check `condition`, sleeping `interval` between checks, until it
    /// returns true or the timeout elapses.
    ///
    /// Elapsed time is counted in whole intervals, so a check that itself
    /// blocks does not shorten the number of retries.
    pub fn wait_until(&self, mut condition: impl FnMut() -> bool) -> PollOutcome {
        let max_retries = self.max_retries();
        let mut retries: u64 = 0;
        loop {
            if condition() {
                return PollOutcome::Satisfied {
                    waited: self.waited_for(retries),
                };
            }
            if let Some(max) = max_retries {
                if retries >= max {
                    return PollOutcome::TimedOut {
                        waited: self.waited_for(retries),
                    };
                }
            }
            std::thread::sleep(self.interval);
            retries += 1;
        }
    }

    /// Time spent sleeping after `retries` intervals, saturating at
    /// `Duration::MAX`.
    fn waited_for(&self, retries: u64) -> Duration {
        const NANOS_PER_SEC: u128 = 1_000_000_000;
        let nanos = self.interval.as_nanos().saturating_mul(u128::from(retries));
        match u64::try_from(nanos / NANOS_PER_SEC) {
            Ok(secs) => Duration::new(secs, (nanos % NANOS_PER_SEC) as u32),
            Err(_) => Duration::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_elapsed() {
        let clock = RunClock::start();
        assert!(clock.elapsed_secs() < 1.0);
        assert!(!clock.epoch_wall().is_empty());
    }

    #[test]
    fn satisfied_immediately_does_not_sleep() {
        let schedule = PollSchedule::bounded(Duration::from_secs(10), Duration::from_secs(60));
        let outcome = schedule.wait_until(|| true);
        assert_eq!(
            outcome,
            PollOutcome::Satisfied {
                waited: Duration::ZERO
            }
        );
    }

    #[test]
    fn bounded_schedule_gives_up() {
        let schedule = PollSchedule::bounded(Duration::from_millis(1), Duration::from_millis(5));
        let mut checks = 0;
        let outcome = schedule.wait_until(|| {
            checks += 1;
            false
        });
        assert!(outcome.timed_out());
        assert_eq!(checks, 6);
        assert_eq!(outcome.waited(), Duration::from_millis(5));
    }

    #[test]
    fn unbounded_schedule_waits_for_condition() {
        let schedule = PollSchedule::unbounded(Duration::from_millis(1));
        let mut remaining = 3;
        let outcome = schedule.wait_until(|| {
            remaining -= 1;
            remaining == 0
        });
        assert_eq!(
            outcome,
            PollOutcome::Satisfied {
                waited: Duration::from_millis(2)
            }
        );
    }

    #[test]
    fn streaming_default_is_fifty_retries() {
        let schedule = PollSchedule::from_millis(100, Some(5000));
        assert_eq!(schedule.max_retries(), Some(50));
        assert_eq!(PollSchedule::from_millis(100, None).max_retries(), None);
    }

    #[test]
    fn waited_time_does_not_wrap() {
        let schedule = PollSchedule::unbounded(Duration::from_millis(1));
        let past_u32 = u64::from(u32::MAX) + 10;
        assert_eq!(
            schedule.waited_for(past_u32),
            Duration::from_millis(past_u32)
        );

        let huge = PollSchedule::unbounded(Duration::from_secs(u64::MAX / 2));
        assert_eq!(huge.waited_for(3), Duration::MAX);
    }
}
