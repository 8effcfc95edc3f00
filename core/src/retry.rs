//! Half-open retry policies
//!
//! While a breaker is open, every `ready()` query asks the retry policy whether
//! a probe may go through. All policies share an exponential backoff measured
//! from the last recorded failure: each granted probe doubles the next wait
//! (capped at `max`), and a successful probe resets it to `min`.

use crate::circuit::Breaker;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Highest backoff step; the delay has long since hit `max` by then
const MAX_ATTEMPT: u32 = 16;

/// Stateful half-open admission strategy
pub trait RetryPolicy: Send + Sync + std::fmt::Debug {
    /// Whether a probe may pass right now
    fn should_retry(&self, breaker: &Breaker) -> bool;

    /// Called after every outcome recorded while the breaker is open
    fn reset(&self, breaker: &Breaker, was_success: bool);
}

/// Exponential backoff bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub min: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
        }
    }

    /// Delay for the given 1-based attempt
    ///
    /// Bounds are normalized here too, since the fields may be set directly.
    pub fn delay(&self, attempt: u32) -> Duration {
        let max = self.max.max(self.min);
        let policy = chrono_machines::Policy {
            max_attempts: 16,
            base_delay_ms: self.min.as_millis() as u64,
            multiplier: 2.0,
            max_delay_ms: max.as_millis() as u64,
        };
        let attempt = attempt.clamp(1, MAX_ATTEMPT);
        let delay_ms = u64::from(policy.calculate_delay(attempt.try_into().unwrap_or_default(), 0.0));
        Duration::from_millis(delay_ms).clamp(self.min, max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(5))
    }
}

/// Backoff position shared by every retry policy
#[derive(Debug)]
struct BackoffClock {
    backoff: Backoff,
    attempt: AtomicU32,
}

impl BackoffClock {
    fn new(backoff: Backoff) -> Self {
        Self {
            backoff,
            attempt: AtomicU32::new(1),
        }
    }

    fn current(&self) -> Duration {
        self.backoff.delay(self.attempt.load(Ordering::Acquire))
    }

    fn elapsed(&self, breaker: &Breaker) -> bool {
        breaker.elapsed_since(breaker.last_failure_at()) >= self.current()
    }

    fn advance(&self) {
        let _ = self
            .attempt
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some((n + 1).min(MAX_ATTEMPT))
            });
    }

    fn reset(&self) {
        self.attempt.store(1, Ordering::Release);
    }
}

/// One probe at a time
#[derive(Debug)]
pub struct SingleRetry {
    clock: BackoffClock,
    in_flight: AtomicBool,
}

impl SingleRetry {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            clock: BackoffClock::new(backoff),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn current_backoff(&self) -> Duration {
        self.clock.current()
    }
}

impl RetryPolicy for SingleRetry {
    fn should_retry(&self, breaker: &Breaker) -> bool {
        if !self.clock.elapsed(breaker) {
            return false;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.clock.advance();
        true
    }

    fn reset(&self, _breaker: &Breaker, was_success: bool) {
        self.in_flight.store(false, Ordering::Release);
        if was_success {
            self.clock.reset();
        }
    }
}

/// Up to `limit` concurrent probes
#[derive(Debug)]
pub struct ThresholdRetry {
    clock: BackoffClock,
    limit: u64,
    in_flight: AtomicU64,
}

impl ThresholdRetry {
    pub fn new(limit: u64, backoff: Backoff) -> Self {
        Self {
            clock: BackoffClock::new(backoff),
            limit,
            in_flight: AtomicU64::new(0),
        }
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl Default for ThresholdRetry {
    fn default() -> Self {
        Self::new(5, Backoff::default())
    }
}

impl RetryPolicy for ThresholdRetry {
    fn should_retry(&self, breaker: &Breaker) -> bool {
        if !self.clock.elapsed(breaker) {
            return false;
        }
        let admitted = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.limit).then_some(n + 1)
            })
            .is_ok();
        if admitted {
            self.clock.advance();
        }
        admitted
    }

    fn reset(&self, _breaker: &Breaker, was_success: bool) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(1))
            });
        if was_success {
            self.clock.reset();
        }
    }
}

/// Admit each query with probability `rate` once the backoff has elapsed
#[derive(Debug)]
pub struct RateRetry {
    clock: BackoffClock,
    rate: f64,
    rng: Mutex<StdRng>,
}

impl RateRetry {
    pub fn new(rate: f64, backoff: Backoff) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();

        Self {
            clock: BackoffClock::new(backoff),
            rate: rate.clamp(0.0, 1.0),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RetryPolicy for RateRetry {
    fn should_retry(&self, breaker: &Breaker) -> bool {
        if !self.clock.elapsed(breaker) {
            return false;
        }
        let admitted = self.rng.lock().random::<f64>() < self.rate;
        if admitted {
            self.clock.advance();
        }
        admitted
    }

    fn reset(&self, _breaker: &Breaker, was_success: bool) {
        if was_success {
            self.clock.reset();
        }
    }
}

/// Admit everything once the backoff has elapsed
#[derive(Debug)]
pub struct FailBackoffRetry {
    clock: BackoffClock,
}

impl FailBackoffRetry {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            clock: BackoffClock::new(backoff),
        }
    }
}

impl RetryPolicy for FailBackoffRetry {
    fn should_retry(&self, breaker: &Breaker) -> bool {
        if !self.clock.elapsed(breaker) {
            return false;
        }
        self.clock.advance();
        true
    }

    fn reset(&self, _breaker: &Breaker, was_success: bool) {
        if was_success {
            self.clock.reset();
        }
    }
}
