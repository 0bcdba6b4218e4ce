//! Clock trait - injected time source
//!
//! The engine never reads wall-clock time directly. Production code uses a
//! tokio-backed clock; tests drive a manual one so every deadline and publish
//! period is deterministic.

use std::fmt;

/// Node-local millisecond timestamp.
///
/// Wraps around after ~49.7 days. Compare timestamps only through
/// [`Timestamp::elapsed_since`], never with `<` / `>`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Timestamp(u32);

impl Timestamp {
    /// Create a timestamp from raw milliseconds
    #[inline]
    pub const fn from_millis(ms: u32) -> Self {
        Self(ms)
    }

    /// Raw milliseconds
    #[inline]
    pub const fn as_millis(self) -> u32 {
        self.0
    }

    /// Milliseconds from `earlier` to `self`, correct across one rollover.
    #[inline]
    pub const fn elapsed_since(self, earlier: Timestamp) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    /// Timestamp `ms` later, wrapping
    #[inline]
    pub const fn add_millis(self, ms: u32) -> Self {
        Self(self.0.wrapping_add(ms))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={}ms", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Time source trait
///
/// `sleep` is the only way the engine yields while it waits; a test clock
/// advances its own time instead of blocking.
#[trait_variant::make(Clock: Send)]
pub trait LocalClock {
    /// Current node time
    fn now(&self) -> Timestamp;

    /// Wait `ms` milliseconds
    async fn sleep(&self, ms: u32);
}
