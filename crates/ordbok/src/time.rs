use std::time::Instant;

/// A trait for time sources used to measure cooldown windows.
///
/// This abstraction allows plugging in a real monotonic clock or a manually
/// driven time source in tests. The unit is **milliseconds** relative to an
/// arbitrary, fixed origin; only differences between readings are meaningful.
///
/// # Example
///
/// ```
/// use ordbok::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn current_millis(&self) -> u64 {
///         1234
///     }
/// }
///
/// assert_eq!(FixedTime.current_millis(), 1234);
/// ```
pub trait TimeSource: Send + Sync {
    /// Returns the current time in milliseconds since the clock's origin.
    fn current_millis(&self) -> u64;
}

/// A monotonic time source that returns elapsed time since construction.
///
/// Immune to wall-clock adjustments (NTP, manual changes), which is what a
/// cooldown window needs.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicClock {
    fn current_millis(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
