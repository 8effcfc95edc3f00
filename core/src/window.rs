//! Fixed-bucket sliding window counters
//!
//! The window is a ring of `N` buckets, each covering `D` of wall time. The
//! head bucket covers `[last_access, last_access + D)`; every access first
//! rotates the head forward by the number of intervals elapsed (at most `N`),
//! zeroing each bucket it passes, so totals always describe roughly the last
//! `N * D`.

use parking_lot::RwLock;
use std::time::Duration;
use tokio::time::Instant;

/// One slot of the ring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bucket {
    pub failure: i64,
    pub success: i64,
    pub count: i64,
}

impl Bucket {
    fn clear(&mut self) {
        *self = Bucket::default();
    }
}

/// Totals across every bucket, read under a single lock
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub failure: i64,
    pub success: i64,
    pub count: i64,
}

impl WindowSnapshot {
    pub fn error_rate(&self) -> f64 {
        let total = self.failure + self.success;
        if total == 0 {
            return 0.0;
        }
        self.failure as f64 / total as f64
    }
}

#[derive(Debug)]
struct Ring {
    buckets: Vec<Bucket>,
    head: usize,
    last_access: Instant,
}

impl Ring {
    fn head_mut(&mut self) -> &mut Bucket {
        &mut self.buckets[self.head]
    }

    fn totals(&self) -> WindowSnapshot {
        self.buckets
            .iter()
            .fold(WindowSnapshot::default(), |acc, b| WindowSnapshot {
                failure: acc.failure + b.failure,
                success: acc.success + b.success,
                count: acc.count + b.count,
            })
    }

    /// Rotate the head forward for the intervals elapsed since the last access.
    fn advance(&mut self, interval: Duration, now: Instant) {
        let mut delta = now.saturating_duration_since(self.last_access);
        if delta <= interval {
            return;
        }

        let len = self.buckets.len();
        let mut rotated = 0;
        while delta > interval && rotated < len {
            self.head = (self.head + 1) % len;
            self.buckets[self.head].clear();
            delta -= interval;
            rotated += 1;
        }
        self.last_access = now;
    }
}

/// Thread-safe sliding window of success/failure/count buckets
#[derive(Debug)]
pub struct SlidingWindow {
    ring: RwLock<Ring>,
    interval: Duration,
}

impl SlidingWindow {
    /// Create a window of `buckets` slots, each `interval` wide.
    ///
    /// A zero bucket count is clamped to 1 and a zero interval to 1ms.
    pub fn new(interval: Duration, buckets: usize) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let buckets = buckets.max(1);

        Self {
            ring: RwLock::new(Ring {
                buckets: vec![Bucket::default(); buckets],
                head: 0,
                last_access: Instant::now(),
            }),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn buckets(&self) -> usize {
        self.ring.read().buckets.len()
    }

    pub fn fail(&self) {
        self.mutate(|b| b.failure += 1);
    }

    pub fn success(&self) {
        self.mutate(|b| b.success += 1);
    }

    pub fn increase(&self) {
        self.mutate(|b| b.count += 1);
    }

    /// Decrement the count bucket. Imbalanced calls may drive it negative.
    pub fn decrease(&self) {
        self.mutate(|b| b.count -= 1);
    }

    pub fn failure_count(&self) -> i64 {
        self.snapshot().failure
    }

    pub fn success_count(&self) -> i64 {
        self.snapshot().success
    }

    pub fn count(&self) -> i64 {
        self.snapshot().count
    }

    /// `failures / (failures + successes)`, or 0.0 on an empty window
    pub fn error_rate(&self) -> f64 {
        self.snapshot().error_rate()
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        self.slide();
        self.ring.read().totals()
    }

    /// Zero every bucket
    pub fn reset(&self) {
        let mut ring = self.ring.write();
        ring.buckets.iter_mut().for_each(Bucket::clear);
        ring.last_access = Instant::now();
    }

    /// Bring the head up to the current time without touching counters
    pub fn slide(&self) {
        let now = Instant::now();
        {
            let ring = self.ring.read();
            if now.saturating_duration_since(ring.last_access) <= self.interval {
                return;
            }
        }
        self.ring.write().advance(self.interval, now);
    }

    fn mutate(&self, f: impl FnOnce(&mut Bucket)) {
        let now = Instant::now();
        let mut ring = self.ring.write();
        ring.advance(self.interval, now);
        f(ring.head_mut());
    }
}
