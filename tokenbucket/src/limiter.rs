//! The [`RateLimiter`] trait and its implementations
//!
//! Besides [`TokenBucket`] itself, the trait is implemented for `Arc<L>` so a
//! bucket can be shared between tasks, and for `Option<L>` so an empty handle
//! can stand in for a limiter that was never created.

use crate::{Error, Result, TokenBucket};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Common interface of rate limiters
///
/// # Example
///
/// ```
/// use tokenbucket::{Error, RateLimiter, TokenBucket};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut limiter: Option<TokenBucket> = None;
/// assert_eq!(limiter.rate(), 0);
/// assert_eq!(limiter.stop(), Err(Error::NotInitialized));
///
/// limiter = Some(TokenBucket::new(10));
/// assert_eq!(limiter.rate(), 10);
/// assert_eq!(limiter.stop(), Ok(()));
/// # }
/// ```
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Take one token, waiting at most `timeout` (zero waits forever)
    async fn get_token(&self, timeout: Duration) -> Result<()>;

    /// Returns the configured rate, or `0` for an empty handle
    fn rate(&self) -> u32;

    /// Ask the limiter to stop producing tokens
    fn stop(&self) -> Result<()>;
}

#[async_trait]
impl RateLimiter for TokenBucket {
    async fn get_token(&self, timeout: Duration) -> Result<()> {
        TokenBucket::get_token(self, timeout).await
    }

    fn rate(&self) -> u32 {
        TokenBucket::rate(self)
    }

    fn stop(&self) -> Result<()> {
        TokenBucket::stop(self)
    }
}

#[async_trait]
impl<L: RateLimiter + ?Sized> RateLimiter for Arc<L> {
    async fn get_token(&self, timeout: Duration) -> Result<()> {
        (**self).get_token(timeout).await
    }

    fn rate(&self) -> u32 {
        (**self).rate()
    }

    fn stop(&self) -> Result<()> {
        (**self).stop()
    }
}

#[async_trait]
impl<L: RateLimiter> RateLimiter for Option<L> {
    async fn get_token(&self, timeout: Duration) -> Result<()> {
        match self {
            Some(limiter) => limiter.get_token(timeout).await,
            None => Err(Error::NotInitialized),
        }
    }

    fn rate(&self) -> u32 {
        self.as_ref().map_or(0, |limiter| limiter.rate())
    }

    fn stop(&self) -> Result<()> {
        match self {
            Some(limiter) => limiter.stop(),
            None => Err(Error::NotInitialized),
        }
    }
}
