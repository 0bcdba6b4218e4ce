//! Clock implementations
//!
//! - [`SystemClock`]: tokio-backed, milliseconds since the clock was created
//! - [`ManualClock`]: driven by hand; `sleep` advances time instantly

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{Clock, Timestamp};
use tokio::time::Instant;

/// Production clock
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        // Truncation to u32 is the wrap-around
        Timestamp::from_millis(self.origin.elapsed().as_millis() as u32)
    }

    async fn sleep(&self, ms: u32) {
        tokio::time::sleep(Duration::from_millis(u64::from(ms))).await;
    }
}

/// Deterministic test clock
///
/// Clones share the same time, so a mock transport can schedule deliveries
/// against the clock the node sleeps on.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU32>,
}

impl ManualClock {
    /// Clock starting at t=0
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock starting at `ms`
    pub fn starting_at(ms: u32) -> Self {
        let clock = Self::new();
        clock.set(ms);
        clock
    }

    /// Move time forward, wrapping at `u32::MAX`
    pub fn advance(&self, ms: u32) {
        // fetch_add on atomics wraps
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Jump to an absolute time
    pub fn set(&self, ms: u32) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.now.load(Ordering::SeqCst))
    }

    async fn sleep(&self, ms: u32) {
        self.advance(ms);
        tokio::task::yield_now().await;
    }
}
