//! Builder API for breaker configuration

use crate::{
    callbacks::Callbacks,
    circuit::Breaker,
    config::BreakerSettings,
    policy::{RateResume, RateTrip, ResumePolicy, TripPolicy},
    retry::{RetryPolicy, ThresholdRetry},
    window::SlidingWindow,
};
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating breakers with fluent API
///
/// Unset policies fall back to `RateTrip(0.5, 10)`, `RateResume(0.4, 10)` and
/// `ThresholdRetry(5)` with a 100ms..5s backoff, over a 1s x 10 window.
pub struct BreakerBuilder {
    name: String,
    trip: Option<Arc<dyn TripPolicy>>,
    resume: Option<Arc<dyn ResumePolicy>>,
    retry: Option<Arc<dyn RetryPolicy>>,
    window_slide_interval: Duration,
    window_bucket_count: usize,
    callbacks: Callbacks,
}

impl BreakerBuilder {
    /// Create a new builder for a breaker with the given name
    pub fn new(name: impl Into<String>) -> Self {
        let settings = BreakerSettings::default();
        Self {
            name: name.into(),
            trip: None,
            resume: None,
            retry: None,
            window_slide_interval: settings.window_slide_interval(),
            window_bucket_count: settings.window_bucket_count,
            callbacks: Callbacks::new(),
        }
    }

    pub fn trip(mut self, policy: impl TripPolicy + 'static) -> Self {
        self.trip = Some(Arc::new(policy));
        self
    }

    pub fn resume(mut self, policy: impl ResumePolicy + 'static) -> Self {
        self.resume = Some(Arc::new(policy));
        self
    }

    pub fn retry(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry = Some(Arc::new(policy));
        self
    }

    /// Width of one window bucket
    pub fn window_slide_interval(mut self, interval: Duration) -> Self {
        self.window_slide_interval = interval;
        self
    }

    pub fn window_bucket_count(mut self, count: usize) -> Self {
        self.window_bucket_count = count;
        self
    }

    /// Apply window parameters loaded from configuration
    pub fn settings(self, settings: &BreakerSettings) -> Self {
        self.window_slide_interval(settings.window_slide_interval())
            .window_bucket_count(settings.window_bucket_count)
    }

    /// Set callback for when the breaker opens
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_open = Some(Arc::new(f));
        self
    }

    /// Set callback for when the breaker closes
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_close = Some(Arc::new(f));
        self
    }

    /// Set callback for when the breaker is latched broken
    pub fn on_break<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_break = Some(Arc::new(f));
        self
    }

    /// Build the breaker
    pub fn build(self) -> Breaker {
        let trip = self
            .trip
            .unwrap_or_else(|| Arc::new(RateTrip::default()));
        let resume = self
            .resume
            .unwrap_or_else(|| Arc::new(RateResume::default()));
        let retry = self
            .retry
            .unwrap_or_else(|| Arc::new(ThresholdRetry::default()));
        let window = SlidingWindow::new(self.window_slide_interval, self.window_bucket_count);

        Breaker::from_parts(self.name, window, trip, resume, retry, self.callbacks)
    }
}
