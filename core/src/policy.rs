//! Trip and resume policies
//!
//! Both are pure predicates over a [`Breaker`] snapshot. Trip policies run on
//! the closed breaker after each recorded outcome; resume policies run on the
//! open breaker after each success.

use crate::circuit::Breaker;
use std::time::Duration;

/// Decides when a closed breaker opens
pub trait TripPolicy: Send + Sync + std::fmt::Debug {
    fn should_trip(&self, breaker: &Breaker) -> bool;
}

/// Decides when an open breaker closes again
pub trait ResumePolicy: Send + Sync + std::fmt::Debug {
    fn should_resume(&self, breaker: &Breaker) -> bool;
}

/// Trip once the window holds exactly `threshold` failures
///
/// The comparison is strict equality: a breaker that is reset or resumed while
/// the window still holds more failures will not re-trip on this policy until
/// the window decays back through the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdTrip {
    pub threshold: u64,
}

impl ThresholdTrip {
    pub fn new(threshold: u64) -> Self {
        Self { threshold }
    }
}

impl TripPolicy for ThresholdTrip {
    fn should_trip(&self, breaker: &Breaker) -> bool {
        breaker.failure_count() == self.threshold
    }
}

/// Trip after `threshold` failures in a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsecutiveTrip {
    pub threshold: u64,
}

impl ConsecutiveTrip {
    pub fn new(threshold: u64) -> Self {
        Self { threshold }
    }
}

impl TripPolicy for ConsecutiveTrip {
    fn should_trip(&self, breaker: &Breaker) -> bool {
        breaker.consecutive_failures() == self.threshold
    }
}

/// Trip when the windowed error rate reaches `rate` over at least `min_samples`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateTrip {
    pub rate: f64,
    pub min_samples: u64,
}

impl RateTrip {
    pub fn new(rate: f64, min_samples: u64) -> Self {
        Self { rate, min_samples }
    }
}

impl Default for RateTrip {
    fn default() -> Self {
        Self::new(0.5, 10)
    }
}

impl TripPolicy for RateTrip {
    fn should_trip(&self, breaker: &Breaker) -> bool {
        let snapshot = breaker.window_snapshot();
        let samples = (snapshot.failure + snapshot.success).max(0) as u64;
        samples >= self.min_samples && snapshot.error_rate() >= self.rate
    }
}

/// Resume once nothing has been recorded for `interval`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalResume {
    pub interval: Duration,
}

impl IntervalResume {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl ResumePolicy for IntervalResume {
    fn should_resume(&self, breaker: &Breaker) -> bool {
        breaker.elapsed_since(breaker.last_request_at()) >= self.interval
    }
}

/// Resume after `threshold` successes in a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsecutiveResume {
    pub threshold: u64,
}

impl ConsecutiveResume {
    pub fn new(threshold: u64) -> Self {
        Self { threshold }
    }
}

impl ResumePolicy for ConsecutiveResume {
    fn should_resume(&self, breaker: &Breaker) -> bool {
        breaker.consecutive_successes() >= self.threshold
    }
}

/// Resume when either the success streak or the idle interval is met
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsecutiveOrIntervalResume {
    pub threshold: u64,
    pub interval: Duration,
}

impl ConsecutiveOrIntervalResume {
    pub fn new(threshold: u64, interval: Duration) -> Self {
        Self {
            threshold,
            interval,
        }
    }
}

impl ResumePolicy for ConsecutiveOrIntervalResume {
    fn should_resume(&self, breaker: &Breaker) -> bool {
        ConsecutiveResume::new(self.threshold).should_resume(breaker)
            || IntervalResume::new(self.interval).should_resume(breaker)
    }
}

/// Resume when the windowed error rate drops below `1 - rate`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateResume {
    pub rate: f64,
    pub min_samples: u64,
}

impl RateResume {
    pub fn new(rate: f64, min_samples: u64) -> Self {
        Self { rate, min_samples }
    }
}

impl Default for RateResume {
    fn default() -> Self {
        Self::new(0.4, 10)
    }
}

impl ResumePolicy for RateResume {
    fn should_resume(&self, breaker: &Breaker) -> bool {
        let snapshot = breaker.window_snapshot();
        let samples = (snapshot.failure + snapshot.success).max(0) as u64;
        samples >= self.min_samples && snapshot.error_rate() < 1.0 - self.rate
    }
}

/// Closure-backed trip policy
///
/// ```rust
/// use ripcord::{Breaker, PredicateTrip};
///
/// let breaker = Breaker::builder("search")
///     .trip(PredicateTrip::new(|b| b.consecutive_failures() >= 3 && b.error_rate() > 0.2))
///     .build();
/// assert!(!breaker.is_tripped());
/// ```
pub struct PredicateTrip<F>
where
    F: Fn(&Breaker) -> bool + Send + Sync,
{
    predicate: F,
}

impl<F> PredicateTrip<F>
where
    F: Fn(&Breaker) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> TripPolicy for PredicateTrip<F>
where
    F: Fn(&Breaker) -> bool + Send + Sync,
{
    fn should_trip(&self, breaker: &Breaker) -> bool {
        (self.predicate)(breaker)
    }
}

impl<F> std::fmt::Debug for PredicateTrip<F>
where
    F: Fn(&Breaker) -> bool + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateTrip")
            .field("predicate", &"<closure>")
            .finish()
    }
}

/// Closure-backed resume policy
pub struct PredicateResume<F>
where
    F: Fn(&Breaker) -> bool + Send + Sync,
{
    predicate: F,
}

impl<F> PredicateResume<F>
where
    F: Fn(&Breaker) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> ResumePolicy for PredicateResume<F>
where
    F: Fn(&Breaker) -> bool + Send + Sync,
{
    fn should_resume(&self, breaker: &Breaker) -> bool {
        (self.predicate)(breaker)
    }
}

impl<F> std::fmt::Debug for PredicateResume<F>
where
    F: Fn(&Breaker) -> bool + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateResume")
            .field("predicate", &"<closure>")
            .finish()
    }
}
