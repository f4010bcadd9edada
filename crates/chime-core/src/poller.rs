//! Doorbell poller.
//!
//! The poller connects to a [`DoorbellSource`] with bounded exponential
//! backoff, then fetches the doorbell inventory on a fixed interval and
//! hands every ring edge to a [`RingReaction`].
//!
//! ```text
//! Idle -> Connecting -> Polling -> Stopped
//!              |                     ^
//!              +---------------------+  (cancelled or gave up)
//! ```
//!
//! Polls are strictly sequential. A fetch failure while polling ends the
//! run with that error; the supervisor decides what happens next.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chime_types::{DeviceSet, RingEvent, ring_events};

use crate::error::Result;
use crate::retry::{BackoffPolicy, retry_with_backoff};
use crate::traits::{DoorbellSource, RingReaction, Service};

/// Default interval between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Capacity of the ring event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle state of a [`DoorbellPoller`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// Not started yet.
    Idle,
    /// Authenticating and fetching the initial inventory.
    Connecting,
    /// Fetching on the poll interval.
    Polling,
    /// The last run ended.
    Stopped,
}

impl std::fmt::Display for PollerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Polling => "polling",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Poller tuning.
#[derive(Debug, Clone)]
pub struct PollerOptions {
    /// Interval between polls.
    pub interval: Duration,
    /// Backoff for the connect phase.
    pub connect_backoff: BackoffPolicy,
}

impl Default for PollerOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            connect_backoff: BackoffPolicy::for_startup(),
        }
    }
}

impl PollerOptions {
    /// Set the poll interval.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the connect-phase backoff.
    #[must_use]
    pub fn connect_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.connect_backoff = policy;
        self
    }
}

/// Watches doorbells for ring edges.
pub struct DoorbellPoller {
    source: Arc<dyn DoorbellSource>,
    reaction: Arc<dyn RingReaction>,
    options: PollerOptions,
    state_tx: watch::Sender<PollerState>,
    events_tx: broadcast::Sender<RingEvent>,
}

impl std::fmt::Debug for DoorbellPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DoorbellPoller")
            .field("options", &self.options)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl DoorbellPoller {
    /// Create a poller. Nothing happens until [`DoorbellPoller::run`].
    pub fn new(
        source: Arc<dyn DoorbellSource>,
        reaction: Arc<dyn RingReaction>,
        options: PollerOptions,
    ) -> Self {
        let (state_tx, _) = watch::channel(PollerState::Idle);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            source,
            reaction,
            options,
            state_tx,
            events_tx,
        }
    }

    /// Current state.
    pub fn state(&self) -> PollerState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<PollerState> {
        self.state_tx.subscribe()
    }

    /// Receive every ring edge the poller detects.
    pub fn subscribe(&self) -> broadcast::Receiver<RingEvent> {
        self.events_tx.subscribe()
    }

    fn set_state(&self, state: PollerState) {
        debug!("poller {}", state);
        self.state_tx.send_replace(state);
    }

    /// Connect, then poll until `cancel` fires or a fetch fails.
    ///
    /// Cancellation is a clean stop and returns `Ok(())`.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        self.set_state(PollerState::Connecting);
        let result = self.connect_and_poll(cancel).await;
        self.set_state(PollerState::Stopped);

        match result {
            Err(e) if e.is_cancelled() => {
                debug!("poller cancelled");
                Ok(())
            }
            other => other,
        }
    }

    async fn connect_and_poll(&self, cancel: &CancellationToken) -> Result<()> {
        let initial = self.connect(cancel).await?;
        self.poll(initial, cancel).await
    }

    /// Authenticate and fetch the first inventory, retrying with backoff.
    async fn connect(&self, cancel: &CancellationToken) -> Result<DeviceSet> {
        let source = &self.source;
        let doorbells = retry_with_backoff(&self.options.connect_backoff, "connect", cancel, || async move {
            source.authenticate(cancel).await?;
            source.doorbells(cancel).await
        })
        .await?;

        if doorbells.is_empty() {
            warn!("No doorbells found");
        }
        for doorbell in &doorbells {
            info!("activate {} ID: {}", doorbell.name, doorbell.id);
        }
        Ok(doorbells)
    }

    async fn poll(&self, mut previous: DeviceSet, cancel: &CancellationToken) -> Result<()> {
        let mut ticker = interval(self.options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately; the initial fetch already happened
        ticker.tick().await;

        self.set_state(PollerState::Polling);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }

            let current = self.source.doorbells(cancel).await?;

            for event in ring_events(&previous, &current) {
                info!("{} rang", event.doorbell.name);
                if let Err(e) = self.reaction.on_ring(&event.doorbell).await {
                    warn!("Ring reaction for {} failed: {}", event.doorbell.name, e);
                }
                // no subscribers is fine
                let _ = self.events_tx.send(event);
            }

            previous = current;
        }
    }
}

#[async_trait]
impl Service for DoorbellPoller {
    fn name(&self) -> &str {
        "poller"
    }

    async fn start(&self, cancel: CancellationToken) -> Result<()> {
        self.run(&cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::mock::{MockDoorbellSource, RecordingReaction};
    use chime_types::Doorbell;

    fn quick_options() -> PollerOptions {
        PollerOptions::default()
            .interval(Duration::from_secs(1))
            .connect_backoff(
                BackoffPolicy::default()
                    .initial_interval(Duration::from_millis(100))
                    .randomization_factor(0.0)
                    .max_elapsed_time(Duration::from_secs(10)),
            )
    }

    fn front(ring: u64) -> Vec<Doorbell> {
        vec![Doorbell::new("d1", "Front", ring)]
    }

    #[tokio::test(start_paused = true)]
    async fn test_ring_edge_invokes_reaction_once() {
        let source = Arc::new(
            MockDoorbellSource::new()
                .with_doorbells(front(100))
                .with_doorbells(front(100))
                .with_doorbells(front(150)),
        );
        let reaction = Arc::new(RecordingReaction::new());
        let poller = DoorbellPoller::new(source.clone(), reaction.clone(), quick_options());
        let mut events = poller.subscribe();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5_500)).await;
            trigger.cancel();
        });

        poller.run(&cancel).await.unwrap();

        let rings = reaction.rings().await;
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].name, "Front");
        assert_eq!(rings[0].last_ring, 150);

        let event = events.try_recv().unwrap();
        assert_eq!(event.previous_ring, 100);
        assert!(events.try_recv().is_err());

        assert_eq!(source.auth_calls(), 1);
        assert!(source.fetch_calls() >= 5);
        assert_eq!(poller.state(), PollerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_doorbell_does_not_ring() {
        let source = Arc::new(
            MockDoorbellSource::new()
                .with_doorbells(front(100))
                .with_doorbells(vec![
                    Doorbell::new("d1", "Front", 100),
                    Doorbell::new("d2", "Back", 9_999),
                ]),
        );
        let reaction = Arc::new(RecordingReaction::new());
        let poller = DoorbellPoller::new(source, reaction.clone(), quick_options());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        poller.run(&cancel).await.unwrap();
        assert!(reaction.rings().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_retries_until_auth_succeeds() {
        let source = Arc::new(MockDoorbellSource::new().with_doorbells(front(1)));
        source.fail_auth_times(3);
        let reaction = Arc::new(RecordingReaction::new());
        let poller = DoorbellPoller::new(source.clone(), reaction, quick_options());
        let mut states = poller.subscribe_state();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        poller.run(&cancel).await.unwrap();
        assert_eq!(source.auth_calls(), 4);
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), PollerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_gives_up_after_budget() {
        let source = Arc::new(MockDoorbellSource::new().with_doorbells(front(1)));
        source.fail_auth_times(u32::MAX);
        let reaction = Arc::new(RecordingReaction::new());
        let poller = DoorbellPoller::new(source, reaction, quick_options());

        let err = poller.run(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::RetriesExhausted { .. }));
        assert_eq!(poller.state(), PollerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_slow_login_stops_promptly() {
        let source = Arc::new(MockDoorbellSource::new().with_doorbells(front(1)));
        source.set_auth_delay(Duration::from_secs(30));
        let reaction = Arc::new(RecordingReaction::new());
        let poller = DoorbellPoller::new(source.clone(), reaction, quick_options());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        poller.run(&cancel).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(source.auth_calls(), 1);
        assert_eq!(source.fetch_calls(), 0);
        assert_eq!(poller.state(), PollerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_while_polling_is_fatal() {
        let source = Arc::new(MockDoorbellSource::new().with_doorbells(front(1)));
        let reaction = Arc::new(RecordingReaction::new());
        let poller = Arc::new(DoorbellPoller::new(
            source.clone(),
            reaction,
            quick_options(),
        ));

        let mut states = poller.subscribe_state();
        let task = {
            let poller = Arc::clone(&poller);
            tokio::spawn(async move { poller.run(&CancellationToken::new()).await })
        };

        states
            .wait_for(|s| *s == PollerState::Polling)
            .await
            .unwrap();
        source.set_fetch_failure(true);

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Http { status: 503, .. }));
        // the failing fetch is not retried
        let fetches = source.fetch_calls();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(source.fetch_calls(), fetches);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaction_failure_does_not_stop_polling() {
        let source = Arc::new(
            MockDoorbellSource::new()
                .with_doorbells(front(1))
                .with_doorbells(front(2))
                .with_doorbells(front(3)),
        );
        let reaction = Arc::new(RecordingReaction::new());
        reaction.set_should_fail(true);
        let poller = DoorbellPoller::new(source, reaction.clone(), quick_options());
        let mut events = poller.subscribe();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2_500)).await;
            trigger.cancel();
        });

        poller.run(&cancel).await.unwrap();
        assert_eq!(reaction.rings().await.len(), 2);
        assert_eq!(events.try_recv().unwrap().doorbell.last_ring, 2);
        assert_eq!(events.try_recv().unwrap().doorbell.last_ring, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_is_restartable() {
        let source = Arc::new(MockDoorbellSource::new().with_doorbells(front(1)));
        let reaction = Arc::new(RecordingReaction::new());
        let poller = DoorbellPoller::new(source.clone(), reaction, quick_options());

        for _ in 0..2 {
            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(2)).await;
                trigger.cancel();
            });
            Service::start(&poller, cancel).await.unwrap();
        }
        assert_eq!(source.auth_calls(), 2);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PollerState::Connecting.to_string(), "connecting");
        assert_eq!(PollerState::Stopped.to_string(), "stopped");
    }
}
