//! # tokenbucket
//!
//! A token bucket rate limiter for tokio applications.
//!
//! ## Overview
//!
//! A [`TokenBucket`] admits up to `rate` operations per second across all of
//! its callers:
//! - **Steady refill**: A background task deposits one token every `1s / rate`
//! - **Bounded bursts**: The bucket holds at most `rate` tokens; deposits into a
//!   full bucket are dropped
//! - **Blocking or bounded waits**: [`get_token`](TokenBucket::get_token) waits
//!   forever with a zero timeout, or gives up after the timeout
//! - **Explicit lifecycle**: [`stop`](TokenBucket::stop) ends the refill task and
//!   releases every waiting consumer
//!
//! ## Quick Start
//!
//! ```
//! use tokenbucket::TokenBucket;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), tokenbucket::Error> {
//! // 50 tokens per second, one every 20ms
//! let bucket = TokenBucket::new(50);
//!
//! // Block until a token is available
//! bucket.get_token(Duration::ZERO).await?;
//!
//! // Or give up after 10ms
//! if let Err(e) = bucket.get_token(Duration::from_millis(10)).await {
//!     println!("Throttled: {e}");
//! }
//!
//! bucket.stop()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Changing the Rate
//!
//! The rate of a bucket is fixed. To change it, build a new bucket and stop
//! the old one:
//!
//! ```
//! use tokenbucket::TokenBucket;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), tokenbucket::Error> {
//! let mut bucket = TokenBucket::new(50);
//!
//! let old = std::mem::replace(&mut bucket, TokenBucket::new(100));
//! old.stop()?;
//!
//! assert_eq!(bucket.rate(), 100);
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! All methods take `&self`. Share a bucket between tasks with an [`Arc`](std::sync::Arc):
//!
//! ```
//! use std::sync::Arc;
//! use tokenbucket::TokenBucket;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bucket = Arc::new(TokenBucket::new(10));
//! let worker = Arc::clone(&bucket);
//! tokio::spawn(async move {
//!     let _ = worker.get_token(std::time::Duration::from_millis(100)).await;
//! });
//! # }
//! ```
//!
//! ## Stopped Buckets
//!
//! Once stopped, a bucket is closed for good. Consumers that are waiting, and
//! any that call [`get_token`](TokenBucket::get_token) later, get
//! [`Error::Stopped`] right away, whatever their timeout. Tokens left in the
//! bucket are discarded.

pub mod bucket;
pub mod error;
pub mod limiter;
pub mod rate;

pub use bucket::{TokenBucket, TokenBucketBuilder};
pub use error::{Error, Result};
pub use limiter::RateLimiter;
pub use rate::Rate;
