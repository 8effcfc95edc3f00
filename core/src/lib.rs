//! Ripcord - resilience primitives for message-driven services
//!
//! This crate provides:
//! - A time-bucketed sliding window of success/failure counters
//! - A circuit breaker with pluggable trip, resume and retry policies
//! - A traffic shaping pipeline with reject and leaky-bucket controllers
//! - Self-healing AMQP sessions with publisher confirms and stream consumers
//!
//! # Example
//!
//! ```rust
//! use ripcord::{Backoff, Breaker, ConsecutiveResume, SingleRetry, ThresholdTrip};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let breaker = Breaker::builder("payments")
//!     .trip(ThresholdTrip::new(3))
//!     .resume(ConsecutiveResume::new(1))
//!     .retry(SingleRetry::new(Backoff::default()))
//!     .on_open(|name| println!("breaker {name} opened"))
//!     .build();
//!
//! let result = breaker
//!     .call(|| async { Ok::<_, String>("charged") }, Duration::ZERO)
//!     .await;
//! assert_eq!(result.unwrap(), "charged");
//!
//! if !breaker.ready() {
//!     println!("breaker open, skipping call");
//! }
//! # });
//! ```

pub mod builder;
pub mod callbacks;
pub mod circuit;
pub mod config;
pub mod errors;
pub mod hook;
pub mod logging;
pub mod policy;
pub mod retry;
pub mod session;
pub mod shaping;
pub mod window;

pub use builder::BreakerBuilder;
pub use callbacks::{Callbacks, StateCallback};
pub use circuit::{Breaker, BreakerState};
pub use config::{
    BreakerSettings, ClientConfig, FieldValue, LogLevel, LogSettings, RipcordConfig, SessionConfig,
};
pub use errors::{BreakerError, ConfigError, SessionError, ShapingError};
pub use hook::{LogEvent, LogHook, TracingHook};
pub use logging::init_logging;
pub use policy::{
    ConsecutiveOrIntervalResume, ConsecutiveResume, ConsecutiveTrip, IntervalResume,
    PredicateResume, PredicateTrip, RateResume, RateTrip, ResumePolicy, ThresholdTrip, TripPolicy,
};
pub use retry::{Backoff, FailBackoffRetry, RateRetry, RetryPolicy, SingleRetry, ThresholdRetry};
pub use session::{Client, Message, PublishOptions, Session, StreamOptions};
pub use shaping::{Behavior, Pipeline, Rule, RuleKind};
pub use window::{Bucket, SlidingWindow, WindowSnapshot};
