//! Exponential backoff for startup retries.
//!
//! A [`BackoffPolicy`] describes how intervals grow and how long a retry
//! sequence may run in total. A [`Backoff`] is the mutable state of one
//! sequence; it is created fresh (or [`Backoff::reset`]) for every new
//! sequence and stops yielding delays once the elapsed-time budget is spent.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use chime_core::{BackoffPolicy, Error, retry_with_backoff};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Error> {
//! let policy = BackoffPolicy::default().max_elapsed_time(Duration::from_secs(30));
//! let cancel = CancellationToken::new();
//!
//! let value = retry_with_backoff(&policy, "connect", &cancel, || async {
//!     Ok::<_, Error>(42)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Configuration for exponential backoff.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub initial_interval: Duration,
    /// Upper bound for a single delay (before randomization).
    pub max_interval: Duration,
    /// Growth factor applied after each failure.
    pub multiplier: f64,
    /// Each delay is drawn uniformly from `d * (1 ± randomization_factor)`.
    pub randomization_factor: f64,
    /// Total time budget for a retry sequence (`None` = retry forever).
    pub max_elapsed_time: Option<Duration>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(60),
            multiplier: 1.5,
            randomization_factor: 0.5,
            max_elapsed_time: Some(Duration::from_secs(15 * 60)),
        }
    }
}

impl BackoffPolicy {
    /// Policy used while connecting to the vendor at startup.
    ///
    /// The appliance may be briefly unreachable when the host boots, so the
    /// poller keeps trying for up to five minutes.
    pub fn for_startup() -> Self {
        Self {
            max_elapsed_time: Some(Duration::from_secs(5 * 60)),
            ..Default::default()
        }
    }

    /// Retry forever.
    pub fn unlimited() -> Self {
        Self {
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    // ==================== Builder Methods ====================

    /// Set the first delay.
    #[must_use]
    pub fn initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Set the maximum single delay.
    #[must_use]
    pub fn max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set the growth factor.
    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the randomization factor (clamped to `0.0..=1.0`).
    #[must_use]
    pub fn randomization_factor(mut self, factor: f64) -> Self {
        self.randomization_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Set the total time budget.
    #[must_use]
    pub fn max_elapsed_time(mut self, max: Duration) -> Self {
        self.max_elapsed_time = Some(max);
        self
    }

    /// Un-randomized delay for a given attempt number, capped at `max_interval`.
    fn interval_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_interval.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(base.min(self.max_interval.as_secs_f64()))
    }

    fn randomize(&self, interval: Duration) -> Duration {
        if self.randomization_factor <= 0.0 {
            return interval;
        }
        let delta = self.randomization_factor * interval.as_secs_f64();
        let low = interval.as_secs_f64() - delta;
        let spread = 2.0 * delta;
        Duration::from_secs_f64(low + rand::rng().random::<f64>() * spread)
    }

    /// Start a new retry sequence.
    pub fn start(&self) -> Backoff {
        Backoff::new(self.clone())
    }
}

/// State of one retry sequence.
#[derive(Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
    started: Instant,
}

impl Backoff {
    /// Create a sequence starting now.
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            started: Instant::now(),
        }
    }

    /// Restart the sequence: first interval again, elapsed time from now.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.started = Instant::now();
    }

    /// Time since the sequence started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// The delay before the next attempt, or `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.policy.max_elapsed_time {
            if self.elapsed() >= max {
                return None;
            }
        }
        let interval = self.policy.interval_for_attempt(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        Some(self.policy.randomize(interval))
    }
}

/// Run `operation` until it succeeds, the backoff budget runs out, or
/// `cancel` fires.
///
/// Every failure except cancellation is retried. An attempt still in
/// flight when `cancel` fires is dropped. When the budget is spent
/// the last failure is returned wrapped in [`Error::RetriesExhausted`].
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &BackoffPolicy,
    operation_name: &str,
    cancel: &CancellationToken,
    operation: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = policy.start();
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        attempt += 1;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = operation() => result,
        };

        let error = match result {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} succeeded after {} attempts", operation_name, attempt);
                }
                return Ok(value);
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => e,
        };

        let Some(delay) = backoff.next_delay() else {
            return Err(Error::RetriesExhausted {
                operation: operation_name.to_string(),
                elapsed: backoff.elapsed(),
                source: Box::new(error),
            });
        };

        warn!(
            "{} failed (attempt {}): {}; retrying in {:?}",
            operation_name, attempt, error, delay
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = sleep(delay) => {}
        }
    }
}
