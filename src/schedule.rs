//! Courtesy pacing between network-touching records.
//!
//! Records are resolved one at a time. After each one that actually hit
//! the network, the pacer sleeps a short random delay, and a longer one
//! every `every`-th time. Time goes through a [`Clock`] so tests can
//! record the sleeps instead of waiting.

use anyhow::{bail, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Clock
// ============================================================================

pub trait Clock {
    fn sleep(&self, duration: Duration);
    fn now(&self) -> DateTime<Utc>;
    /// Processing date assigned to rows without a mark date
    fn today(&self) -> NaiveDate;
}

/// Wall clock with real sleeps.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Frozen clock that records requested sleeps without waiting.
#[derive(Debug)]
pub struct FixedClock {
    now: DateTime<Utc>,
    sleeps: Mutex<Vec<Duration>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Clock for FixedClock {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }
}

// ============================================================================
// Delay Policy
// ============================================================================

/// Short pause after each network-touching record, long pause every Nth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelayPolicy {
    pub every: usize,
    /// Inclusive range in milliseconds
    pub short_ms: (u64, u64),
    pub long_ms: (u64, u64),
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self {
            every: 5,
            short_ms: (1_000, 1_000),
            long_ms: (3_000, 5_000),
        }
    }
}

impl DelayPolicy {
    /// No waiting at all (tests, local replays).
    pub fn none() -> Self {
        Self {
            every: 1,
            short_ms: (0, 0),
            long_ms: (0, 0),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.every == 0 {
            bail!("pacing.every must be at least 1");
        }
        for (name, (lo, hi)) in [("short_ms", self.short_ms), ("long_ms", self.long_ms)] {
            if lo > hi {
                bail!("pacing.{}: min {} exceeds max {}", name, lo, hi);
            }
        }
        Ok(())
    }

    /// Delay to apply after the `count`-th network-touching record (1-based).
    pub fn delay_for<R: Rng>(&self, count: usize, rng: &mut R) -> Duration {
        let (lo, hi) = if count > 0 && count % self.every == 0 {
            self.long_ms
        } else {
            self.short_ms
        };
        Duration::from_millis(rng.gen_range(lo..=hi))
    }
}

// ============================================================================
// Pacer
// ============================================================================

/// Counts network-touching records and sleeps according to the policy.
pub struct Pacer<R: Rng> {
    policy: DelayPolicy,
    rng: R,
    touched: usize,
}

impl<R: Rng> Pacer<R> {
    pub fn new(policy: DelayPolicy, rng: R) -> Self {
        Self {
            policy,
            rng,
            touched: 0,
        }
    }

    /// Call once after every record that went to the network.
    pub fn pause(&mut self, clock: &dyn Clock) -> Duration {
        self.touched += 1;
        let delay = self.policy.delay_for(self.touched, &mut self.rng);
        if !delay.is_zero() {
            clock.sleep(delay);
        }
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn clock() -> FixedClock {
        FixedClock::new(Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_long_pause_every_nth() {
        let clock = clock();
        let mut pacer = Pacer::new(DelayPolicy::default(), StdRng::seed_from_u64(7));
        for _ in 0..10 {
            pacer.pause(&clock);
        }
        let sleeps = clock.sleeps();
        assert_eq!(sleeps.len(), 10);
        for (i, d) in sleeps.iter().enumerate() {
            let ms = d.as_millis() as u64;
            if (i + 1) % 5 == 0 {
                assert!((3_000..=5_000).contains(&ms), "pause {} was {}ms", i + 1, ms);
            } else {
                assert_eq!(ms, 1_000, "pause {}", i + 1);
            }
        }
    }

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let policy = DelayPolicy::default();
        let a: Vec<_> = {
            let mut rng = StdRng::seed_from_u64(42);
            (1..=6).map(|n| policy.delay_for(n, &mut rng)).collect()
        };
        let b: Vec<_> = {
            let mut rng = StdRng::seed_from_u64(42);
            (1..=6).map(|n| policy.delay_for(n, &mut rng)).collect()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_policy_never_sleeps() {
        let clock = clock();
        let mut pacer = Pacer::new(DelayPolicy::none(), StdRng::seed_from_u64(1));
        pacer.pause(&clock);
        pacer.pause(&clock);
        assert!(clock.sleeps().is_empty());
        assert_eq!(pacer.touched, 2);
    }

    #[test]
    fn test_validate() {
        assert!(DelayPolicy::default().validate().is_ok());
        let mut bad = DelayPolicy::default();
        bad.every = 0;
        assert!(bad.validate().is_err());
        let mut bad = DelayPolicy::default();
        bad.long_ms = (5_000, 3_000);
        assert!(bad.validate().unwrap_err().to_string().contains("long_ms"));
    }

    #[test]
    fn test_fixed_clock_today() {
        assert_eq!(clock().today(), NaiveDate::from_ymd_opt(2026, 10, 18).unwrap());
    }
}
