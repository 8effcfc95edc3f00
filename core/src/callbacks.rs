//! Callback system for breaker state transitions

use std::sync::Arc;

/// Callback invoked with the breaker name
pub type StateCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Callbacks for breaker events
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_open: Option<StateCallback>,
    pub on_close: Option<StateCallback>,
    pub on_break: Option<StateCallback>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger_open(&self, breaker: &str) {
        if let Some(ref callback) = self.on_open {
            callback(breaker);
        }
    }

    pub fn trigger_close(&self, breaker: &str) {
        if let Some(ref callback) = self.on_close {
            callback(breaker);
        }
    }

    pub fn trigger_break(&self, breaker: &str) {
        if let Some(ref callback) = self.on_break {
            callback(breaker);
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_break", &self.on_break.is_some())
            .finish()
    }
}
