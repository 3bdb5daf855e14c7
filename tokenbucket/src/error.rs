use thiserror::Error;

/// Errors returned by [`TokenBucket`](crate::TokenBucket) and other
/// [`RateLimiter`](crate::RateLimiter) implementations
///
/// The limiter never retries on its own; what to do with an error is up to
/// the caller.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The handle is empty, or its refill task was never started
    #[error("uninitialized token bucket")]
    NotInitialized,

    /// The timeout elapsed before a token was deposited
    #[error("running out of tokens")]
    NoTokenAvailable,

    /// The bucket has been stopped and will never be refilled
    #[error("token bucket stopped")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, Error>;
