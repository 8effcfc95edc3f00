//! Circuit breaker over a sliding window
//!
//! The breaker is lock-free apart from its window: state flags, streak counters
//! and timestamps are atomics, so one `Arc<Breaker>` can be shared by any
//! number of tasks. Policies read a snapshot that may be slightly inconsistent
//! under contention.

use crate::builder::BreakerBuilder;
use crate::callbacks::Callbacks;
use crate::errors::BreakerError;
use crate::policy::{ResumePolicy, TripPolicy};
use crate::retry::RetryPolicy;
use crate::window::{SlidingWindow, WindowSnapshot};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Externally visible breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "Closed",
            BreakerState::Open => "Open",
        }
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker public API
pub struct Breaker {
    name: String,
    window: SlidingWindow,
    tripped: AtomicBool,
    broken: AtomicBool,
    consecutive_failures: AtomicU64,
    consecutive_successes: AtomicU64,
    // Nanoseconds since `epoch`, 0 = never
    last_request_at: AtomicU64,
    last_success_at: AtomicU64,
    last_failure_at: AtomicU64,
    epoch: Instant,
    trip: Arc<dyn TripPolicy>,
    resume: Arc<dyn ResumePolicy>,
    retry: Arc<dyn RetryPolicy>,
    callbacks: Callbacks,
}

impl Breaker {
    /// Create a new breaker builder
    pub fn builder(name: impl Into<String>) -> BreakerBuilder {
        BreakerBuilder::new(name)
    }

    pub(crate) fn from_parts(
        name: String,
        window: SlidingWindow,
        trip: Arc<dyn TripPolicy>,
        resume: Arc<dyn ResumePolicy>,
        retry: Arc<dyn RetryPolicy>,
        callbacks: Callbacks,
    ) -> Self {
        Self {
            name,
            window,
            tripped: AtomicBool::new(false),
            broken: AtomicBool::new(false),
            consecutive_failures: AtomicU64::new(0),
            consecutive_successes: AtomicU64::new(0),
            last_request_at: AtomicU64::new(0),
            last_success_at: AtomicU64::new(0),
            last_failure_at: AtomicU64::new(0),
            epoch: Instant::now(),
            trip,
            resume,
            retry,
            callbacks,
        }
    }

    /// Run `f` under breaker protection
    ///
    /// With a zero `timeout` this is [`Breaker::call_inline`]. Otherwise `f`
    /// is spawned and raced against the timer; on expiry the call fails with
    /// [`BreakerError::Timeout`] while the spawned task keeps running.
    pub async fn call<F, Fut, T, E>(&self, f: F, timeout: Duration) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        if timeout.is_zero() {
            return self.call_inline(f).await;
        }
        self.admit()?;

        let task = tokio::spawn(f());
        let outcome = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result.map_err(BreakerError::Execution),
            Ok(Err(join)) => {
                self.fail();
                if join.is_panic() {
                    std::panic::resume_unwind(join.into_panic());
                }
                return Err(BreakerError::Cancelled {
                    breaker: self.name.clone(),
                });
            }
            Err(_) => {
                tracing::warn!(breaker = %self.name, ?timeout, "call timed out");
                Err(BreakerError::Timeout {
                    breaker: self.name.clone(),
                    timeout,
                })
            }
        };

        self.record(&outcome);
        outcome
    }

    /// Run `f` under breaker protection in the caller's task, without a timer
    ///
    /// The future may borrow local state and need not be `Send`.
    pub async fn call_inline<F, Fut, T, E>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.admit()?;
        let outcome = f().await.map_err(BreakerError::Execution);
        self.record(&outcome);
        outcome
    }

    fn admit<E>(&self) -> Result<(), BreakerError<E>> {
        if self.ready() {
            return Ok(());
        }
        tracing::debug!(breaker = %self.name, "call rejected, breaker open");
        Err(BreakerError::Open {
            breaker: self.name.clone(),
        })
    }

    fn record<T, E>(&self, outcome: &Result<T, BreakerError<E>>) {
        match outcome {
            Ok(_) => self.success(),
            Err(_) => self.fail(),
        }
    }

    /// Whether a call may go through right now
    ///
    /// While open this consults the retry policy, which may consume a probe.
    pub fn ready(&self) -> bool {
        if self.is_broken() || !self.is_tripped() {
            return true;
        }
        self.retry.should_retry(self)
    }

    /// Record a failed call
    pub fn fail(&self) {
        if self.is_broken() {
            return;
        }

        self.consecutive_successes.store(0, Ordering::Release);
        self.consecutive_failures.fetch_add(1, Ordering::AcqRel);
        self.window.fail();
        let now = self.now_nanos();
        self.last_failure_at.store(now, Ordering::Release);

        let was_tripped = self.is_tripped();
        if !was_tripped && self.trip.should_trip(self) {
            self.open();
        }

        // Stamped last so interval-based resume measures idle time before this call
        self.last_request_at.store(now, Ordering::Release);
        if was_tripped {
            self.retry.reset(self, false);
        }
    }

    /// Record a successful call
    pub fn success(&self) {
        if self.is_broken() {
            return;
        }

        self.consecutive_failures.store(0, Ordering::Release);
        self.consecutive_successes.fetch_add(1, Ordering::AcqRel);
        self.window.success();
        let now = self.now_nanos();
        self.last_success_at.store(now, Ordering::Release);

        let was_tripped = self.is_tripped();
        if was_tripped && self.resume.should_resume(self) {
            self.close();
        }

        self.last_request_at.store(now, Ordering::Release);
        if was_tripped {
            self.retry.reset(self, true);
        }
    }

    /// Clear all counters and timestamps and close the breaker
    pub fn reset(&self) {
        self.window.reset();
        self.consecutive_failures.store(0, Ordering::Release);
        self.consecutive_successes.store(0, Ordering::Release);
        self.last_request_at.store(0, Ordering::Release);
        self.last_success_at.store(0, Ordering::Release);
        self.last_failure_at.store(0, Ordering::Release);
        self.close();
        self.retry.reset(self, true);
    }

    /// Latch the breaker into the broken state
    ///
    /// A broken breaker reports `Open` but admits every call and ignores
    /// outcomes. There is no way back.
    pub fn break_circuit(&self) {
        if self.broken.swap(true, Ordering::AcqRel) {
            return;
        }
        self.tripped.store(true, Ordering::Release);
        tracing::error!(breaker = %self.name, "breaker broken");
        self.callbacks.trigger_break(&self.name);
    }

    fn open(&self) {
        if self
            .tripped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::warn!(
                breaker = %self.name,
                failures = self.failure_count(),
                error_rate = self.error_rate(),
                "breaker opened"
            );
            self.callbacks.trigger_open(&self.name);
        }
    }

    fn close(&self) {
        if self
            .tripped
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::info!(breaker = %self.name, "breaker closed");
            self.callbacks.trigger_close(&self.name);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        if self.is_tripped() {
            BreakerState::Open
        } else {
            BreakerState::Closed
        }
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }

    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Acquire)
    }

    pub fn failure_count(&self) -> u64 {
        self.window.failure_count().max(0) as u64
    }

    pub fn success_count(&self) -> u64 {
        self.window.success_count().max(0) as u64
    }

    pub fn error_rate(&self) -> f64 {
        self.window.error_rate()
    }

    /// Window totals taken under a single lock
    pub fn window_snapshot(&self) -> WindowSnapshot {
        self.window.snapshot()
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    pub fn consecutive_successes(&self) -> u64 {
        self.consecutive_successes.load(Ordering::Acquire)
    }

    /// Nanoseconds since construction of the last recorded outcome, 0 if none
    pub fn last_request_at(&self) -> u64 {
        self.last_request_at.load(Ordering::Acquire)
    }

    pub fn last_success_at(&self) -> u64 {
        self.last_success_at.load(Ordering::Acquire)
    }

    pub fn last_failure_at(&self) -> u64 {
        self.last_failure_at.load(Ordering::Acquire)
    }

    /// Time elapsed since a timestamp read from one of the `last_*_at` accessors
    pub fn elapsed_since(&self, timestamp: u64) -> Duration {
        Duration::from_nanos(self.now_nanos().saturating_sub(timestamp))
    }

    fn now_nanos(&self) -> u64 {
        let nanos = Instant::now().saturating_duration_since(self.epoch).as_nanos();
        u64::try_from(nanos).unwrap_or(u64::MAX).max(1)
    }
}

impl std::fmt::Debug for Breaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Breaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("broken", &self.is_broken())
            .field("window", &self.window)
            .field("trip", &self.trip)
            .field("resume", &self.resume)
            .field("retry", &self.retry)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}
