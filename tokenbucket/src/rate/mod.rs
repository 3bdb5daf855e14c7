//! Refill rate for the token bucket
//!
//! This module provides the [`Rate`] type, which turns a "tokens per second"
//! setting into the interval between two deposits of the refill task. The
//! same number doubles as the bucket's burst capacity.

use std::time::Duration;


/// Rate defines how many tokens the bucket receives each second
///
/// A rate of zero is coerced to one token per second, so every `Rate` has a
/// finite, non-zero [`period`](Rate::period).
///
/// # Examples
///
/// ```
/// use tokenbucket::Rate;
/// use std::time::Duration;
///
/// // 10 tokens per second, one every 100ms
/// let rate = Rate::per_second(10);
/// assert_eq!(rate.period(), Duration::from_millis(100));
/// assert_eq!(rate.tokens(), 10);
///
/// // Zero is treated as one token per second
/// let rate = Rate::per_second(0);
/// assert_eq!(rate.tokens(), 1);
/// assert_eq!(rate.period(), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    tokens: u32,
}

impl Rate {
    /// Creates a rate of `n` tokens per second
    ///
    /// # Parameters
    ///
    /// - `n`: Number of tokens deposited per second. `0` is treated as `1`.
    ///
    /// # Example
    ///
    /// ```
    /// use tokenbucket::Rate;
    ///
    /// // 100 tokens per second
    /// let rate = Rate::per_second(100);
    /// ```
    pub fn per_second(n: u32) -> Self {
        Rate { tokens: n.max(1) }
    }

    /// Returns the number of tokens per second
    ///
    /// This is also the capacity of the bucket: at most this many tokens can
    /// accumulate while nobody is consuming them.
    pub fn tokens(&self) -> u32 {
        self.tokens
    }

    /// Returns the refill interval (time between two token deposits)
    ///
    /// The interval never drops below one nanosecond, the timer's resolution.
    ///
    /// # Example
    ///
    /// ```
    /// use tokenbucket::Rate;
    /// use std::time::Duration;
    ///
    /// let rate = Rate::per_second(4);
    /// assert_eq!(rate.period(), Duration::from_millis(250));
    /// ```
    pub fn period(&self) -> Duration {
        (Duration::from_secs(1) / self.tokens).max(Duration::from_nanos(1))
    }
}

impl From<u32> for Rate {
    fn from(n: u32) -> Self {
        Rate::per_second(n)
    }
}
