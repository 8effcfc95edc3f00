//! Shaping rules

use crate::errors::ShapingError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Signal a rule is evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Admitted calls over the last second
    Qps,
    /// Calls currently executing
    Concurrency,
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleKind::Qps => f.write_str("qps"),
            RuleKind::Concurrency => f.write_str("concurrency"),
        }
    }
}

/// What happens to a call over the limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    Reject,
    /// Queue the call behind a leaky bucket, up to `max_wait`
    Waiting,
}

/// A single admission rule
///
/// ```toml
/// [[rules]]
/// type = "qps"
/// behavior = "waiting"
/// limit = 2.0
/// max_wait_ms = 10000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(rename = "type")]
    pub kind: RuleKind,
    pub behavior: Behavior,
    pub limit: f64,
    #[serde(default)]
    pub max_wait_ms: u64,
}

impl Rule {
    pub fn reject(kind: RuleKind, limit: f64) -> Self {
        Self {
            kind,
            behavior: Behavior::Reject,
            limit,
            max_wait_ms: 0,
        }
    }

    /// Leaky-bucket QPS rule
    pub fn waiting(limit: f64, max_wait: Duration) -> Self {
        Self {
            kind: RuleKind::Qps,
            behavior: Behavior::Waiting,
            limit,
            max_wait_ms: max_wait.as_millis() as u64,
        }
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn validate(&self) -> Result<(), ShapingError> {
        if !self.limit.is_finite() || self.limit < 0.0 {
            return Err(ShapingError::InvalidRule(format!(
                "limit must be a finite non-negative number, got {}",
                self.limit
            )));
        }
        if self.max_wait_ms != 0 && self.behavior != Behavior::Waiting {
            return Err(ShapingError::InvalidRule(
                "max_wait requires waiting behavior".to_string(),
            ));
        }
        if self.behavior == Behavior::Waiting {
            if self.kind != RuleKind::Qps {
                return Err(ShapingError::InvalidRule(
                    "waiting behavior applies to qps rules only".to_string(),
                ));
            }
            if self.limit <= 0.0 {
                return Err(ShapingError::InvalidRule(
                    "waiting rule needs a positive limit".to_string(),
                ));
            }
        }
        Ok(())
    }
}
