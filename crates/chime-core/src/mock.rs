//! Test doubles for the trait seams.
//!
//! These let the poller, supervisor and gate be exercised without a vendor
//! appliance or a real network interface.
//!
//! # Features
//!
//! - **Scripted inventories**: [`MockDoorbellSource`] replays a queue of
//!   device sets, repeating the last one once the queue is drained
//! - **Failure injection**: fail authentication a number of times, or fail
//!   every fetch while a flag is set
//! - **Scripted lifecycles**: [`MockService`] fails, exits early, or ignores
//!   cancellation on demand

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use chime_types::{DeviceSet, Doorbell, MacAddress};

use crate::error::{AuthFailure, Error, Result};
use crate::traits::{DoorbellSource, HardwareAddressSource, RingReaction, Service};

/// A scripted [`DoorbellSource`].
///
/// ```
/// use chime_core::mock::MockDoorbellSource;
/// use chime_core::DoorbellSource;
/// use chime_types::Doorbell;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let source = MockDoorbellSource::new()
///         .with_doorbells(vec![Doorbell::new("d1", "Front", 100)])
///         .with_doorbells(vec![Doorbell::new("d1", "Front", 150)]);
///
///     let cancel = CancellationToken::new();
///     assert_eq!(source.doorbells(&cancel).await.unwrap()[0].last_ring, 100);
///     assert_eq!(source.doorbells(&cancel).await.unwrap()[0].last_ring, 150);
///     // the last set repeats
///     assert_eq!(source.doorbells(&cancel).await.unwrap()[0].last_ring, 150);
/// }
/// ```
#[derive(Debug, Default)]
pub struct MockDoorbellSource {
    script: RwLock<VecDeque<DeviceSet>>,
    auth_calls: AtomicU32,
    fetch_calls: AtomicU32,
    remaining_auth_failures: AtomicU32,
    auth_delay_ms: AtomicU64,
    fail_fetch: AtomicBool,
}

impl MockDoorbellSource {
    /// Create a source with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a device set to the script.
    #[must_use]
    pub fn with_doorbells(mut self, doorbells: DeviceSet) -> Self {
        self.script.get_mut().push_back(doorbells);
        self
    }

    /// Append a device set to the script at runtime.
    pub async fn push_doorbells(&self, doorbells: DeviceSet) {
        self.script.write().await.push_back(doorbells);
    }

    /// Fail the next `n` authentication attempts.
    pub fn fail_auth_times(&self, n: u32) {
        self.remaining_auth_failures.store(n, Ordering::SeqCst);
    }

    /// Make every login take `delay`.
    ///
    /// The delay does not watch the cancellation token, like a login stuck
    /// on an unresponsive appliance.
    pub fn set_auth_delay(&self, delay: Duration) {
        self.auth_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Fail every fetch while `fail` is set.
    pub fn set_fetch_failure(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    /// Number of `authenticate` calls so far.
    pub fn auth_calls(&self) -> u32 {
        self.auth_calls.load(Ordering::SeqCst)
    }

    /// Number of `doorbells` calls so far.
    pub fn fetch_calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DoorbellSource for MockDoorbellSource {
    async fn authenticate(&self, _cancel: &CancellationToken) -> Result<()> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.auth_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let remaining = self.remaining_auth_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != u32::MAX {
                self.remaining_auth_failures
                    .store(remaining - 1, Ordering::SeqCst);
            }
            return Err(Error::Auth(AuthFailure::Rejected { status: 401 }));
        }
        Ok(())
    }

    async fn doorbells(&self, cancel: &CancellationToken) -> Result<Vec<Doorbell>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Error::Http {
                status: 503,
                url: "mock://bootstrap".to_string(),
                method: "GET".to_string(),
            });
        }

        let mut script = self.script.write().await;
        if script.len() > 1 {
            Ok(script.pop_front().unwrap_or_default())
        } else {
            Ok(script.front().cloned().unwrap_or_default())
        }
    }
}

/// A [`RingReaction`] that records every doorbell it is called with.
#[derive(Debug, Default)]
pub struct RecordingReaction {
    rings: RwLock<Vec<Doorbell>>,
    should_fail: AtomicBool,
}

impl RecordingReaction {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the call and then fail while `fail` is set.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    /// Doorbells seen so far, in call order.
    pub async fn rings(&self) -> Vec<Doorbell> {
        self.rings.read().await.clone()
    }
}

#[async_trait]
impl RingReaction for RecordingReaction {
    async fn on_ring(&self, doorbell: &Doorbell) -> Result<()> {
        self.rings.write().await.push(doorbell.clone());
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::other("mock reaction failure")));
        }
        Ok(())
    }
}

/// How a [`MockService`] behaves once started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    /// Run until cancelled, then return `Ok(())`.
    RunUntilCancelled,
    /// Fail after the given delay (unless cancelled first).
    FailAfter(Duration),
    /// Return `Ok(())` after the given delay without being cancelled.
    ExitAfter(Duration),
    /// Take the given time to stop after cancellation.
    SlowStop(Duration),
    /// Never return.
    Hang,
}

/// A [`Service`] with a scripted lifecycle.
#[derive(Debug)]
pub struct MockService {
    name: String,
    behavior: MockBehavior,
    starts: AtomicU32,
    clean_stops: AtomicU32,
    started_at: Mutex<Option<Instant>>,
    cancelled_at: Mutex<Option<Instant>>,
}

impl MockService {
    /// Create a service with the given behavior.
    pub fn new(name: impl Into<String>, behavior: MockBehavior) -> Self {
        Self {
            name: name.into(),
            behavior,
            starts: AtomicU32::new(0),
            clean_stops: AtomicU32::new(0),
            started_at: Mutex::new(None),
            cancelled_at: Mutex::new(None),
        }
    }

    /// The error this service fails with.
    pub fn failure(name: &str) -> Error {
        Error::Io(std::io::Error::other(format!("{} failed", name)))
    }

    /// Number of times `start` was called.
    pub fn starts(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }

    /// Number of runs that observed cancellation and returned.
    pub fn clean_stops(&self) -> u32 {
        self.clean_stops.load(Ordering::SeqCst)
    }

    /// Time from the last start until cancellation was observed.
    pub fn time_to_cancel(&self) -> Option<Duration> {
        let started = (*lock(&self.started_at))?;
        let cancelled = (*lock(&self.cancelled_at))?;
        Some(cancelled.duration_since(started))
    }

    async fn observe_cancel(&self, cancel: &CancellationToken) {
        cancel.cancelled().await;
        *lock(&self.cancelled_at) = Some(Instant::now());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Service for MockService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, cancel: CancellationToken) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        *lock(&self.started_at) = Some(Instant::now());
        *lock(&self.cancelled_at) = None;

        match self.behavior {
            MockBehavior::RunUntilCancelled => {
                self.observe_cancel(&cancel).await;
                self.clean_stops.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            MockBehavior::FailAfter(delay) => {
                tokio::select! {
                    _ = self.observe_cancel(&cancel) => {
                        self.clean_stops.fetch_add(1, Ordering::SeqCst);
                        Err(Error::Cancelled)
                    }
                    _ = tokio::time::sleep(delay) => Err(Self::failure(&self.name)),
                }
            }
            MockBehavior::ExitAfter(delay) => {
                tokio::select! {
                    _ = self.observe_cancel(&cancel) => {
                        self.clean_stops.fetch_add(1, Ordering::SeqCst);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                Ok(())
            }
            MockBehavior::SlowStop(linger) => {
                self.observe_cancel(&cancel).await;
                tokio::time::sleep(linger).await;
                self.clean_stops.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            MockBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

/// A [`HardwareAddressSource`] that replays a script of samples.
///
/// `None` in the script means "no network". The last entry repeats.
#[derive(Debug)]
pub struct MockHardwareAddress {
    script: Mutex<VecDeque<Option<MacAddress>>>,
    samples: AtomicU32,
}

impl MockHardwareAddress {
    /// Create a sampler from a script of results.
    pub fn new(script: impl IntoIterator<Item = Option<MacAddress>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            samples: AtomicU32::new(0),
        }
    }

    /// A sampler that always reports `address`.
    pub fn fixed(address: MacAddress) -> Self {
        Self::new([Some(address)])
    }

    /// Number of samples taken so far.
    pub fn samples(&self) -> u32 {
        self.samples.load(Ordering::SeqCst)
    }
}

impl HardwareAddressSource for MockHardwareAddress {
    fn sample(&self) -> Result<MacAddress> {
        self.samples.fetch_add(1, Ordering::SeqCst);

        let mut script = lock(&self.script);
        let next = if script.len() > 1 {
            script.pop_front().flatten()
        } else {
            script.front().copied().flatten()
        };
        next.ok_or_else(|| Error::HardwareAddress("no active interface".to_string()))
    }
}
