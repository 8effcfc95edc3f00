//! In-flight call accounting for the shaping pipeline

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Counter of calls currently executing inside a pipeline
#[derive(Debug, Default)]
pub struct InFlightCounter {
    current: AtomicI64,
}

impl InFlightCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter unconditionally
    pub fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.current.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            counter: Arc::clone(self),
        }
    }

    /// Enter only while fewer than `limit` calls are in flight
    ///
    /// Returns `None` at capacity.
    pub fn try_enter(self: &Arc<Self>, limit: i64) -> Option<InFlightGuard> {
        let mut current = self.current.load(Ordering::Acquire);

        loop {
            if current >= limit {
                return None;
            }

            match self.current.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(InFlightGuard {
                        counter: Arc::clone(self),
                    });
                }
                Err(actual) => current = actual,
            }
        }
    }

    pub fn current(&self) -> i64 {
        self.current.load(Ordering::Acquire)
    }

    fn release(&self) {
        self.current.fetch_sub(1, Ordering::Release);
    }
}

/// Releases its slot when dropped, including on panic or cancellation
#[derive(Debug)]
pub struct InFlightGuard {
    counter: Arc<InFlightCounter>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.release();
    }
}
