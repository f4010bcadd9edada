//! Trait seams between the chime's components.
//!
//! Each consumer asks for the narrowest capability it needs:
//!
//! - the poller needs a [`DoorbellSource`] and a [`RingReaction`]
//! - the supervisor needs a set of [`Service`]s
//! - the gate needs a [`HardwareAddressSource`] and a supervisor
//!
//! Real implementations live next to the component they wrap; test doubles
//! live in [`crate::mock`].

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use chime_types::{Doorbell, MacAddress};

use crate::error::Result;

/// A long-lived component that can be supervised.
///
/// `start` runs until `cancel` fires (returning `Ok(())` or
/// [`crate::Error::Cancelled`]) or until the service fails. The supervisor
/// may call `start` again after a previous run ended, so implementations
/// must not assume they run only once.
#[async_trait]
pub trait Service: Send + Sync {
    /// Name used in logs and in [`crate::Error::ServiceFailed`].
    fn name(&self) -> &str;

    /// Run the service until cancelled or failed.
    async fn start(&self, cancel: CancellationToken) -> Result<()>;
}

/// Where the poller gets doorbell state from.
#[async_trait]
pub trait DoorbellSource: Send + Sync {
    /// Acquire fresh credentials, giving up with
    /// [`crate::Error::Cancelled`] once `cancel` fires.
    async fn authenticate(&self, cancel: &CancellationToken) -> Result<()>;

    /// Fetch the current doorbell inventory.
    async fn doorbells(&self, cancel: &CancellationToken) -> Result<Vec<Doorbell>>;
}

/// What happens when a doorbell rings.
#[async_trait]
pub trait RingReaction: Send + Sync {
    /// React to one ring edge.
    async fn on_ring(&self, doorbell: &Doorbell) -> Result<()>;
}

/// Samples the hardware address of the host's primary network interface.
pub trait HardwareAddressSource: Send + Sync {
    /// Current address of the first active, non-loopback interface.
    ///
    /// Fails when no such interface exists (no network).
    fn sample(&self) -> Result<MacAddress>;
}
