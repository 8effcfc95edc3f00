//! Traffic shaping pipeline
//!
//! A [`Pipeline`] admits calls against an ordered list of [`Rule`]s. Two
//! controllers run over every rule: the reject controller refuses calls that
//! would push the QPS or concurrency signal over its limit, and the waiting
//! controller turns QPS rules into a leaky bucket that delays callers instead.
//!
//! ```rust
//! use ripcord::shaping::{Pipeline, Rule, RuleKind};
//!
//! # tokio_test::block_on(async {
//! let pipeline = Pipeline::new(vec![Rule::reject(RuleKind::Concurrency, 8.0)]).unwrap();
//! let answer = pipeline.run(|| async { 42 }).await.unwrap();
//! assert_eq!(answer, 42);
//! # });
//! ```

mod controller;
mod inflight;
mod rule;

pub use controller::{Admission, Controller, RejectController, WaitingController};
pub use inflight::{InFlightCounter, InFlightGuard};
pub use rule::{Behavior, Rule, RuleKind};

use crate::errors::ShapingError;
use crate::window::SlidingWindow;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const WINDOW_INTERVAL: Duration = Duration::from_millis(100);
const WINDOW_BUCKETS: usize = 10;

/// Admission pipeline over QPS and concurrency signals
#[derive(Debug)]
pub struct Pipeline {
    rules: Vec<Rule>,
    controllers: Vec<Box<dyn Controller>>,
    window: SlidingWindow,
    in_flight: Arc<InFlightCounter>,
    // Tightest concurrency reject rule, enforced again when taking the slot
    concurrency_cap: Option<Rule>,
    epoch: Instant,
}

impl Pipeline {
    /// Build a pipeline, validating every rule
    pub fn new(rules: Vec<Rule>) -> Result<Self, ShapingError> {
        for rule in &rules {
            rule.validate()?;
        }

        let concurrency_cap = rules
            .iter()
            .filter(|r| r.kind == RuleKind::Concurrency && r.behavior == Behavior::Reject)
            .min_by(|a, b| a.limit.total_cmp(&b.limit))
            .cloned();

        Ok(Self {
            rules,
            controllers: vec![
                Box::new(RejectController),
                Box::new(WaitingController::new()),
            ],
            window: SlidingWindow::new(WINDOW_INTERVAL, WINDOW_BUCKETS),
            in_flight: Arc::new(InFlightCounter::new()),
            concurrency_cap,
            epoch: Instant::now(),
        })
    }

    /// Run `f` once every controller has admitted it
    ///
    /// Waiting admissions sleep before evaluation continues; any rejection
    /// returns [`ShapingError::Rejected`] without running `f`.
    pub async fn run<F, Fut, T>(&self, f: F) -> Result<T, ShapingError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        for controller in &self.controllers {
            for rule in &self.rules {
                match controller.check(self, rule) {
                    Admission::Pass => {}
                    Admission::Wait(delay) => {
                        tracing::debug!(kind = %rule.kind, limit = rule.limit, ?delay, "admission delayed");
                        tokio::time::sleep(delay).await;
                    }
                    Admission::Reject => {
                        tracing::warn!(kind = %rule.kind, limit = rule.limit, "admission rejected");
                        return Err(rejected(rule));
                    }
                }
            }
        }

        let _guard = match &self.concurrency_cap {
            Some(rule) => match self.in_flight.try_enter(rule.limit.floor() as i64) {
                Some(guard) => guard,
                None => {
                    tracing::warn!(kind = %rule.kind, limit = rule.limit, "admission rejected");
                    return Err(rejected(rule));
                }
            },
            None => self.in_flight.enter(),
        };
        self.window.increase();

        Ok(f().await)
    }

    /// Admitted calls over the last second
    pub fn qps(&self) -> i64 {
        self.window.slide();
        self.window.count()
    }

    /// Calls currently executing
    pub fn concurrent_count(&self) -> i64 {
        self.in_flight.current()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub(crate) fn now_nanos(&self) -> i64 {
        let nanos = Instant::now().saturating_duration_since(self.epoch).as_nanos();
        i64::try_from(nanos).unwrap_or(i64::MAX)
    }
}

fn rejected(rule: &Rule) -> ShapingError {
    ShapingError::Rejected {
        kind: rule.kind,
        limit: rule.limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    #[test]
    fn test_invalid_rule_rejected_at_construction() {
        let mut rule = Rule::reject(RuleKind::Qps, 5.0);
        rule.max_wait_ms = 10;

        assert!(matches!(
            Pipeline::new(vec![rule]),
            Err(ShapingError::InvalidRule(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_qps_reject() {
        let pipeline = Arc::new(Pipeline::new(vec![Rule::reject(RuleKind::Qps, 1.0)]).unwrap());
        let mut handles = vec![];

        for _ in 0..100 {
            let pipeline = Arc::clone(&pipeline);
            handles.push(tokio::spawn(async move {
                pipeline
                    .run(|| tokio::time::sleep(Duration::from_millis(500)))
                    .await
            }));
        }

        let mut rejected = 0;
        for handle in handles {
            if handle.await.unwrap().is_err() {
                rejected += 1;
            }
        }

        assert!(rejected >= 99, "rejected {rejected}");
        assert_eq!(pipeline.qps(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_qps_waiting_sequential() {
        // Sequential callers never queue more than one interval deep
        let pipeline = Pipeline::new(vec![Rule::waiting(2.0, Duration::from_secs(3))]).unwrap();
        let start = Instant::now();
        let mut passed_at = vec![];

        for _ in 0..10 {
            pipeline.run(|| async {}).await.unwrap();
            passed_at.push(Instant::now());
        }

        for pair in passed_at.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(500));
        }
        let total = start.elapsed();
        assert!(total >= Duration::from_millis(4500), "took {total:?}");
        assert!(total < Duration::from_millis(5000), "took {total:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_limit_holds() {
        let pipeline = Arc::new(
            Pipeline::new(vec![Rule::reject(RuleKind::Concurrency, 2.0)]).unwrap(),
        );
        let peak = Arc::new(AtomicI64::new(0));
        let mut handles = vec![];

        for _ in 0..10 {
            let pipeline = Arc::clone(&pipeline);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let observer = Arc::clone(&pipeline);
                pipeline
                    .run(|| async move {
                        peak.fetch_max(observer.concurrent_count(), Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    })
                    .await
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 2);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pipeline.concurrent_count(), 0);
    }

    #[tokio::test]
    async fn test_slot_released_when_cancelled() {
        let pipeline = Pipeline::new(vec![Rule::reject(RuleKind::Concurrency, 1.0)]).unwrap();

        let slow = pipeline.run(|| tokio::time::sleep(Duration::from_secs(60)));
        let _ = tokio::time::timeout(Duration::from_millis(10), slow).await;

        assert_eq!(pipeline.concurrent_count(), 0);
        assert!(pipeline.run(|| async {}).await.is_ok());
    }
}
