//! Admission controllers

use super::Pipeline;
use super::rule::{Behavior, Rule, RuleKind};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// "Never passed": far enough in the past that the first call always passes
const NEVER: i64 = i64::MIN / 2;

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Outcome of checking one rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Pass,
    /// Sleep for the given duration, then continue
    Wait(Duration),
    Reject,
}

pub trait Controller: Send + Sync + std::fmt::Debug {
    fn check(&self, pipeline: &Pipeline, rule: &Rule) -> Admission;
}

/// Rejects calls that would push a signal over its limit
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectController;

impl Controller for RejectController {
    fn check(&self, pipeline: &Pipeline, rule: &Rule) -> Admission {
        if rule.behavior != Behavior::Reject {
            return Admission::Pass;
        }

        let current = match rule.kind {
            RuleKind::Qps => pipeline.qps(),
            RuleKind::Concurrency => pipeline.concurrent_count(),
        };
        if current as f64 + 1.0 > rule.limit {
            Admission::Reject
        } else {
            Admission::Pass
        }
    }
}

/// Leaky bucket: spaces passes at least `1s / limit` apart
#[derive(Debug)]
pub struct WaitingController {
    // Nanoseconds on the pipeline clock
    last_passed_at: AtomicI64,
}

impl WaitingController {
    pub fn new() -> Self {
        Self {
            last_passed_at: AtomicI64::new(NEVER),
        }
    }
}

impl Default for WaitingController {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller for WaitingController {
    fn check(&self, pipeline: &Pipeline, rule: &Rule) -> Admission {
        if rule.behavior != Behavior::Waiting || rule.kind != RuleKind::Qps {
            return Admission::Pass;
        }
        if rule.limit <= 0.0 {
            return Admission::Reject;
        }

        let interval = (NANOS_PER_SEC / rule.limit).ceil() as i64;
        let max_wait = i64::try_from(rule.max_wait().as_nanos()).unwrap_or(i64::MAX);
        let now = pipeline.now_nanos();

        let last = self.last_passed_at.load(Ordering::Acquire);
        if last.saturating_add(interval) <= now {
            self.last_passed_at.store(now, Ordering::Release);
            return Admission::Pass;
        }

        if last + interval - now > max_wait {
            return Admission::Reject;
        }

        // Reserve the next slot, then re-check against racing reservations
        let reserved = self.last_passed_at.fetch_add(interval, Ordering::AcqRel) + interval;
        let wait = reserved - now;
        if wait > max_wait {
            self.last_passed_at.fetch_sub(interval, Ordering::AcqRel);
            return Admission::Reject;
        }

        Admission::Wait(Duration::from_nanos(wait.max(0) as u64))
    }
}
