//! Host hardware address sampling.
//!
//! An interface counts as active when it is up, is not a loopback, has an
//! IPv4 address and a non-zero hardware address. An adapter that exists but
//! is not connected is therefore not sampled, so the gate sees the host
//! leave the network.

use chime_types::MacAddress;

use crate::error::{Error, Result};
use crate::traits::HardwareAddressSource;

/// What the sampler looks at for one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub mac: Option<MacAddress>,
    pub up: bool,
    pub loopback: bool,
    pub has_ipv4: bool,
}

impl InterfaceInfo {
    /// Whether this interface is connected to a network.
    pub fn is_active(&self) -> bool {
        self.up && !self.loopback && self.has_ipv4 && self.usable_mac().is_some()
    }

    fn usable_mac(&self) -> Option<MacAddress> {
        self.mac.filter(|mac| mac.octets() != [0; 6])
    }
}

/// Pick the hardware address to report from `interfaces`, in OS order.
///
/// Without `name` this is the first active interface. With `name` the named
/// interface must exist and be active.
pub fn select_active(interfaces: &[InterfaceInfo], name: Option<&str>) -> Result<MacAddress> {
    let chosen = match name {
        Some(name) => {
            let interface = interfaces
                .iter()
                .find(|i| i.name == name)
                .ok_or_else(|| Error::HardwareAddress(format!("interface {} not found", name)))?;
            if !interface.is_active() {
                return Err(Error::HardwareAddress(format!(
                    "interface {} is not active",
                    name
                )));
            }
            interface
        }
        None => interfaces
            .iter()
            .find(|i| i.is_active())
            .ok_or_else(|| Error::HardwareAddress("no active network interface".to_string()))?,
    };

    chosen
        .usable_mac()
        .ok_or_else(|| Error::HardwareAddress(format!("{} has no hardware address", chosen.name)))
}

/// Reads the hardware address of the active local interface through the OS.
#[derive(Debug, Clone, Default)]
pub struct SystemHardwareAddress {
    interface: Option<String>,
}

impl SystemHardwareAddress {
    /// Sample the first active interface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample a specific interface, e.g. `en0` or `wlan0`.
    pub fn for_interface(name: impl Into<String>) -> Self {
        Self {
            interface: Some(name.into()),
        }
    }

    /// Snapshot of the host's interfaces.
    pub fn interfaces() -> Vec<InterfaceInfo> {
        netdev::get_interfaces()
            .into_iter()
            .map(|i| InterfaceInfo {
                up: i.is_up(),
                loopback: i.is_loopback(),
                has_ipv4: !i.ipv4.is_empty(),
                mac: i.mac_addr.map(|m| MacAddress::new(m.octets())),
                name: i.name,
            })
            .collect()
    }
}

impl HardwareAddressSource for SystemHardwareAddress {
    fn sample(&self) -> Result<MacAddress> {
        select_active(&Self::interfaces(), self.interface.as_deref())
    }
}
