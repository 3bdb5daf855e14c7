//! Token bucket refilled by a background task
//!
//! This module provides [`TokenBucket`], the rate limiting primitive itself.
//! A refill task owned by the bucket deposits one token per
//! [`Rate::period`] into a store of capacity [`Rate::tokens`]; consumers take
//! tokens out with [`TokenBucket::get_token`].
//!
//! The store is a fair [`Semaphore`]: its permits are the tokens, the refill
//! task is the only producer and consumers forget the permits they acquire.
//! Deposits into a full store are dropped, so an idle bucket never holds more
//! than one second worth of tokens.

use crate::{Error, Rate, Result};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};


/// A token bucket rate limiter
///
/// Construction starts a refill task on the tokio runtime. The task keeps
/// running until [`stop`](TokenBucket::stop) is called or the bucket is
/// dropped; either way the store is closed and waiting consumers are released
/// with [`Error::Stopped`].
///
/// The bucket starts empty and fills up at the configured rate. Changing the
/// rate means building a new bucket and stopping the old one.
///
/// # Example
///
/// ```
/// use tokenbucket::TokenBucket;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), tokenbucket::Error> {
/// let bucket = TokenBucket::new(100);
///
/// // Wait at most 50ms for a token
/// match bucket.get_token(Duration::from_millis(50)).await {
///     Ok(()) => println!("admitted"),
///     Err(e) => println!("throttled: {e}"),
/// }
///
/// bucket.stop()?;
/// # Ok(())
/// # }
/// ```
pub struct TokenBucket {
    rate: Rate,
    tokens: Arc<Semaphore>,
    refill: Option<Refill>,
}

/// Handles to a running refill task
struct Refill {
    handle: Handle,
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Closes the store when dropped
///
/// Owned by the refill future, so the store is closed however the task ends:
/// a stop signal, a panic, or the runtime dropping the task unpolled.
struct CloseOnDrop(Arc<Semaphore>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

impl TokenBucket {
    /// Create a bucket that receives `rate` tokens per second
    ///
    /// A rate of `0` is treated as `1`. The refill task is spawned on the
    /// current tokio runtime; when called outside of a runtime the bucket is
    /// never refilled and [`get_token`](TokenBucket::get_token) and
    /// [`stop`](TokenBucket::stop) return [`Error::NotInitialized`].
    pub fn new(rate: u32) -> Self {
        Self::builder().rate(rate).build()
    }

    /// Create a builder for configuring a bucket
    ///
    /// # Example
    ///
    /// ```
    /// use tokenbucket::TokenBucket;
    ///
    /// let runtime = tokio::runtime::Runtime::new().unwrap();
    /// let bucket = TokenBucket::builder()
    ///     .rate(20)
    ///     .runtime(runtime.handle().clone())
    ///     .build();
    ///
    /// assert_eq!(bucket.rate(), 20);
    /// ```
    pub fn builder() -> TokenBucketBuilder {
        TokenBucketBuilder::default()
    }

    fn spawn(rate: Rate, runtime: Option<Handle>) -> Self {
        let tokens = Arc::new(Semaphore::new(0));

        let refill = match runtime.or_else(|| Handle::try_current().ok()) {
            Some(handle) => {
                tracing::debug!(
                    rate = rate.tokens(),
                    period = ?rate.period(),
                    "Token bucket ticker duration"
                );

                let (stop_tx, stop_rx) = oneshot::channel();
                let store = CloseOnDrop(Arc::clone(&tokens));
                let task = handle.spawn(refill(store, rate, stop_rx));

                Some(Refill {
                    handle,
                    stop_tx: Mutex::new(Some(stop_tx)),
                    task: Mutex::new(Some(task)),
                })
            }
            None => {
                tracing::warn!(
                    rate = rate.tokens(),
                    "No tokio runtime available, token bucket will never be refilled"
                );
                None
            }
        };

        TokenBucket {
            rate,
            tokens,
            refill,
        }
    }

    /// Take one token from the bucket
    ///
    /// With a zero `timeout` this waits as long as it takes for a token to be
    /// deposited. With a positive `timeout` it gives up after that long.
    ///
    /// # Errors
    ///
    /// - [`Error::NoTokenAvailable`]: The timeout elapsed first. No token was taken.
    /// - [`Error::Stopped`]: The bucket was stopped, before or during the wait.
    /// - [`Error::NotInitialized`]: The refill task was never started.
    ///
    /// The timeout runs on the bucket's runtime, so the returned future can be
    /// polled from any executor.
    pub async fn get_token(&self, timeout: Duration) -> Result<()> {
        let refill = self.refill.as_ref().ok_or(Error::NotInitialized)?;

        if self.tokens.is_closed() {
            return Err(Error::Stopped);
        }

        let acquired = if timeout.is_zero() {
            self.tokens.acquire().await
        } else {
            let wait = {
                let _ctx = refill.handle.enter();
                time::timeout(timeout, self.tokens.acquire())
            };

            match wait.await {
                Ok(acquired) => acquired,
                Err(_) => {
                    tracing::trace!(?timeout, "No token available before timeout");
                    return Err(Error::NoTokenAvailable);
                }
            }
        };

        match acquired {
            Ok(permit) => {
                // Tokens are consumed, not returned to the store
                permit.forget();
                Ok(())
            }
            Err(_) => Err(Error::Stopped),
        }
    }

    /// Returns the number of tokens deposited per second
    pub fn rate(&self) -> u32 {
        self.rate.tokens()
    }

    /// Returns the interval between two deposits
    pub fn period(&self) -> Duration {
        self.rate.period()
    }

    /// Returns the number of tokens currently in the bucket
    ///
    /// Never exceeds [`rate`](TokenBucket::rate). Always `0` once stopped.
    pub fn available(&self) -> usize {
        if self.tokens.is_closed() {
            0
        } else {
            self.tokens.available_permits()
        }
    }

    /// Returns `true` once the refill task has closed the bucket
    pub fn is_stopped(&self) -> bool {
        self.tokens.is_closed()
    }

    /// Close the bucket and ask the refill task to stop
    ///
    /// The bucket is closed before this returns: waiting consumers are
    /// released and no token can be taken afterwards, even one deposited by a
    /// tick that was already running. The refill task exits on its own; use
    /// [`shutdown`](TokenBucket::shutdown) to wait for it. Calling `stop` again
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// - [`Error::NotInitialized`]: The refill task was never started.
    pub fn stop(&self) -> Result<()> {
        let refill = self.refill.as_ref().ok_or(Error::NotInitialized)?;

        if let Some(stop_tx) = refill.stop_tx.lock().take() {
            tracing::debug!(rate = self.rate.tokens(), "Stopping token bucket");
            self.tokens.close();
            // Ignore send errors - the task is already gone
            let _ = stop_tx.send(());
        }

        Ok(())
    }

    /// Stop the refill task and wait for it to exit
    ///
    /// When this returns the bucket is closed: every pending and future
    /// [`get_token`](TokenBucket::get_token) call fails with
    /// [`Error::Stopped`]. If several callers shut down the same bucket, only
    /// the first one waits for the task.
    ///
    /// # Errors
    ///
    /// - [`Error::NotInitialized`]: The refill task was never started.
    pub async fn shutdown(&self) -> Result<()> {
        self.stop()?;

        let task = self
            .refill
            .as_ref()
            .and_then(|refill| refill.task.lock().take());

        let Some(task) = task else {
            return Ok(());
        };

        if let Err(e) = task.await {
            tracing::error!("Token bucket refill task failed: {}", e);
        }

        Ok(())
    }
}

impl fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBucket")
            .field("rate", &self.rate.tokens())
            .field("available", &self.available())
            .field("initialized", &self.refill.is_some())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// The refill task: one deposit attempt per tick until told to stop
///
/// The stop branch also fires when the sender is dropped together with the
/// last handle to the bucket. The ticker and the store guard are dropped on
/// every exit path.
async fn refill(store: CloseOnDrop, rate: Rate, mut stop_rx: oneshot::Receiver<()>) {
    let tokens = &store.0;
    let capacity = rate.tokens() as usize;
    let period = rate.period();

    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = &mut stop_rx => break,
            _ = ticker.tick() => {
                if tokens.is_closed() {
                    break;
                }

                // Single producer: the count can only drop between check and add
                if tokens.available_permits() < capacity {
                    tokens.add_permits(1);
                } else {
                    tracing::trace!(capacity, "Token bucket full, dropping token");
                }
            }
        }
    }

    drop(store);
    tracing::debug!(rate = capacity, "Token bucket refill task exited");
}

/// Builder for [`TokenBucket`]
///
/// # Example
///
/// ```
/// use tokenbucket::TokenBucket;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let bucket = TokenBucket::builder().rate(500).build();
/// assert_eq!(bucket.rate(), 500);
/// # }
/// ```
#[derive(Debug, Default)]
pub struct TokenBucketBuilder {
    rate: u32,
    runtime: Option<Handle>,
}

impl TokenBucketBuilder {
    /// Set the number of tokens per second (default: 1)
    ///
    /// `0` is treated as `1`.
    pub fn rate(mut self, rate: u32) -> Self {
        self.rate = rate;
        self
    }

    /// Spawn the refill task on this runtime instead of the current one
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Build the bucket and start its refill task
    pub fn build(self) -> TokenBucket {
        TokenBucket::spawn(Rate::per_second(self.rate), self.runtime)
    }
}
