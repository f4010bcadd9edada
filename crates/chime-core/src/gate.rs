//! Network-identity gate.
//!
//! The gate holds the supervisor back until the host's active network
//! interface reports a configured hardware address. It is meant for a chime
//! on a laptop that should only ring while docked on the home network.
//!
//! If the supervised services fail, the address is sampled again right
//! away. A host still on the target network has a genuine failure, which is
//! returned. A host that has moved away (or lost its network) goes back to
//! waiting.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chime_types::MacAddress;

use crate::error::{Error, Result};
use crate::supervisor::Supervisor;
use crate::traits::HardwareAddressSource;

/// Default time between samples while waiting.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Starts the supervisor only while the hardware address matches.
#[derive(Debug)]
pub struct IdentityGate<S> {
    sampler: S,
    target: MacAddress,
    interval: Duration,
}

impl<S: HardwareAddressSource> IdentityGate<S> {
    /// Create a gate for `target` with the default check interval.
    pub fn new(sampler: S, target: MacAddress) -> Self {
        Self {
            sampler,
            target,
            interval: DEFAULT_CHECK_INTERVAL,
        }
    }

    /// Set the interval between samples.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// The address the gate waits for.
    pub fn target(&self) -> MacAddress {
        self.target
    }

    /// Sample once. A failed sample counts as "no match".
    pub fn matches(&self) -> bool {
        match self.sampler.sample() {
            Ok(current) if current == self.target => true,
            Ok(current) => {
                debug!("hardware address {} does not match {}", current, self.target);
                false
            }
            Err(e) => {
                debug!("hardware address unavailable: {}", e);
                false
            }
        }
    }

    /// Sample until the address matches. Only returns an error on cancel.
    pub async fn wait_for_match(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            if self.matches() {
                return Ok(());
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// Wait for a match, run the supervisor, and repeat while failures are
    /// explained by the host leaving the target network.
    pub async fn run(&self, supervisor: &Supervisor, cancel: &CancellationToken) -> Result<()> {
        info!("Waiting for hardware address {}", self.target);

        loop {
            match self.wait_for_match(cancel).await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => return Ok(()),
                Err(e) => return Err(e),
            }

            info!("Hardware address {} present, starting services", self.target);

            let err = match supervisor.run(cancel).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            if self.matches() {
                return Err(err);
            }

            warn!(
                "Services stopped after leaving {} ({}), waiting again",
                self.target, err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::mock::{MockBehavior, MockHardwareAddress, MockService};

    fn home() -> MacAddress {
        "aa:bb:cc:00:11:22".parse().unwrap()
    }

    fn elsewhere() -> MacAddress {
        "aa:bb:cc:99:99:99".parse().unwrap()
    }

    fn cancel_after(delay: Duration) -> CancellationToken {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            trigger.cancel();
        });
        cancel
    }

    #[test]
    fn test_matches() {
        let gate = IdentityGate::new(MockHardwareAddress::fixed(home()), home());
        assert!(gate.matches());

        let gate = IdentityGate::new(MockHardwareAddress::fixed(elsewhere()), home());
        assert!(!gate.matches());

        let gate = IdentityGate::new(MockHardwareAddress::new([None]), home());
        assert!(!gate.matches());
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_after_address_appears() {
        let sampler = MockHardwareAddress::new([None, Some(elsewhere()), Some(home())]);
        let gate = IdentityGate::new(sampler, home());
        let service = Arc::new(MockService::new("a", MockBehavior::RunUntilCancelled));
        let supervisor = Supervisor::new(vec![service.clone()]);

        let cancel = cancel_after(Duration::from_secs(200));
        gate.run(&supervisor, &cancel).await.unwrap();

        assert_eq!(service.starts(), 1);
        assert_eq!(gate.sampler.samples(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_on_target_network_propagates() {
        let gate = IdentityGate::new(MockHardwareAddress::fixed(home()), home());
        let service = Arc::new(MockService::new(
            "poller",
            MockBehavior::FailAfter(Duration::from_secs(2)),
        ));
        let supervisor = Supervisor::new(vec![service.clone()]);

        let err = gate
            .run(&supervisor, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("poller"));
        assert_eq!(service.starts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_after_leaving_network_waits_again() {
        let sampler = MockHardwareAddress::new([Some(home()), Some(elsewhere())]);
        let gate = IdentityGate::new(sampler, home());
        let service = Arc::new(MockService::new(
            "poller",
            MockBehavior::FailAfter(Duration::from_secs(2)),
        ));
        let supervisor = Supervisor::new(vec![service.clone()]);

        let cancel = cancel_after(Duration::from_secs(600));
        gate.run(&supervisor, &cancel).await.unwrap();

        assert_eq!(service.starts(), 1);
        assert!(gate.sampler.samples() > 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampling_failure_on_recheck_keeps_waiting() {
        let sampler = MockHardwareAddress::new([Some(home()), None]);
        let gate = IdentityGate::new(sampler, home()).with_interval(Duration::from_secs(10));
        let service = Arc::new(MockService::new(
            "poller",
            MockBehavior::FailAfter(Duration::from_secs(2)),
        ));
        let supervisor = Supervisor::new(vec![service.clone()]);

        let cancel = cancel_after(Duration::from_secs(60));
        gate.run(&supervisor, &cancel).await.unwrap();
        assert_eq!(service.starts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejoining_network_restarts_services() {
        let sampler = MockHardwareAddress::new([
            Some(home()),
            Some(elsewhere()),
            Some(elsewhere()),
            Some(home()),
        ]);
        let gate = IdentityGate::new(sampler, home());
        let service = Arc::new(MockService::new(
            "poller",
            MockBehavior::FailAfter(Duration::from_secs(2)),
        ));
        let supervisor = Supervisor::new(vec![service.clone()]);

        // second run fails on the target network and propagates
        let err = gate
            .run(&supervisor, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ServiceFailed { .. }));
        assert_eq!(service.starts(), 2);
    }
}
