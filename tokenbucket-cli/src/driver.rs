//! Load driver
//!
//! Consumer tasks take tokens from a shared limiter until the run ends.
//! Partway through, the limiter can be replaced by one with a different
//! rate: the new bucket is installed first, then the old one is stopped, which
//! releases any consumer still waiting on it.

use crate::config::Config;
use anyhow::{Result, anyhow};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokenbucket::{Error, TokenBucket};
use tokio::task::JoinSet;
use tokio::time::{self, Instant};

/// Admissions of one limiter during its part of the run
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub rate: u32,
    pub elapsed_ms: u64,
    pub admitted: usize,
    pub timed_out: usize,
    pub observed_per_sec: f64,
}

/// Result of a driver run
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub consumers: usize,
    pub phases: Vec<PhaseReport>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Consumers: {}", self.consumers)?;
        writeln!(
            f,
            "{:>6} {:>10} {:>10} {:>10} {:>12}",
            "rate", "elapsed", "admitted", "timed out", "observed/s"
        )?;
        for phase in &self.phases {
            writeln!(
                f,
                "{:>6} {:>8}ms {:>10} {:>10} {:>12.2}",
                phase.rate,
                phase.elapsed_ms,
                phase.admitted,
                phase.timed_out,
                phase.observed_per_sec
            )?;
        }
        Ok(())
    }
}

/// One limiter and the counters of the consumers using it
struct Phase {
    limiter: TokenBucket,
    admitted: AtomicUsize,
    timed_out: AtomicUsize,
    started: Instant,
    ended: Mutex<Option<Instant>>,
}

impl Phase {
    fn new(rate: u32) -> Self {
        Phase {
            limiter: TokenBucket::new(rate),
            admitted: AtomicUsize::new(0),
            timed_out: AtomicUsize::new(0),
            started: Instant::now(),
            ended: Mutex::new(None),
        }
    }

    fn finish(&self) {
        self.ended.lock().get_or_insert_with(Instant::now);
    }

    /// Count a token taken from this phase's limiter
    ///
    /// Tokens taken after [`finish`](Phase::finish) are not counted, so the
    /// admitted total always matches the elapsed time of the report.
    fn record_admission(&self) -> bool {
        let ended = self.ended.lock();
        if ended.is_some() {
            return false;
        }
        self.admitted.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn report(&self) -> PhaseReport {
        let ended = (*self.ended.lock()).unwrap_or_else(Instant::now);
        let elapsed = ended.saturating_duration_since(self.started);
        let admitted = self.admitted.load(Ordering::Relaxed);

        let observed_per_sec = if elapsed.is_zero() {
            0.0
        } else {
            admitted as f64 / elapsed.as_secs_f64()
        };

        PhaseReport {
            rate: self.limiter.rate(),
            elapsed_ms: elapsed.as_millis() as u64,
            admitted,
            timed_out: self.timed_out.load(Ordering::Relaxed),
            observed_per_sec,
        }
    }
}

type Current = Arc<RwLock<Arc<Phase>>>;

/// Run the consumers described by `config` and report what each limiter admitted
pub async fn run(config: &Config) -> Result<Report> {
    let first = Arc::new(Phase::new(config.rate));
    let current: Current = Arc::new(RwLock::new(Arc::clone(&first)));
    let mut phases = vec![first];

    let deadline = Instant::now() + config.duration;
    let mut consumers = JoinSet::new();
    for id in 0..config.consumers {
        consumers.spawn(consume(
            id,
            Arc::clone(&current),
            deadline,
            config.timeout,
            config.backoff,
        ));
    }

    if let Some(swap) = config.swap {
        time::sleep(swap.after).await;

        let next = Arc::new(Phase::new(swap.rate));
        let old = std::mem::replace(&mut *current.write(), Arc::clone(&next));
        tracing::info!(
            from = old.limiter.rate(),
            to = next.limiter.rate(),
            "Changing token bucket rate"
        );

        old.finish();
        old.limiter.stop()?;
        phases.push(next);
    }

    while let Some(result) = consumers.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(e) => return Err(anyhow!("Consumer task panicked: {}", e)),
        }
    }

    let last = current.read().clone();
    last.finish();
    last.limiter.shutdown().await?;
    tracing::info!("Stopped token bucket");

    Ok(Report {
        consumers: config.consumers,
        phases: phases.iter().map(|phase| phase.report()).collect(),
    })
}

async fn consume(
    id: usize,
    current: Current,
    deadline: Instant,
    timeout: Duration,
    backoff: Duration,
) -> Result<()> {
    while Instant::now() < deadline {
        let phase = current.read().clone();

        match time::timeout_at(deadline, phase.limiter.get_token(timeout)).await {
            // Run is over
            Err(_) => break,
            Ok(Ok(())) => {
                if phase.record_admission() {
                    tracing::debug!(consumer = id, "Got token");
                } else {
                    tracing::debug!(consumer = id, "Token from a finished phase, not counted");
                }
            }
            Ok(Err(Error::NoTokenAvailable)) => {
                phase.timed_out.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(consumer = id, "Must wait");
                time::sleep(backoff).await;
            }
            Ok(Err(Error::Stopped)) => {
                tracing::debug!(consumer = id, "Token bucket stopped, switching limiter");
                tokio::task::yield_now().await;
            }
            Ok(Err(e @ Error::NotInitialized)) => {
                return Err(anyhow!("Consumer {} cannot use limiter: {}", id, e));
            }
        }
    }

    Ok(())
}
