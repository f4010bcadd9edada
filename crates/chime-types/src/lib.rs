//! Platform-agnostic types for UniFi Protect doorbell chimes.
//!
//! This crate provides the data model shared by the session client,
//! the poller and the local HTTP services.
//!
//! # Features
//!
//! - Doorbell snapshots and the ring-edge detector
//! - The vendor device inventory (`serde` feature)
//! - Hardware address parsing for the network-identity gate
//!
//! # Example
//!
//! ```
//! use chime_types::{Doorbell, ring_events};
//!
//! let previous = vec![Doorbell::new("d1", "Front", 100)];
//! let current = vec![Doorbell::new("d1", "Front", 150)];
//!
//! for event in ring_events(&previous, &current) {
//!     println!("{} rang", event.doorbell.name);
//! }
//! ```

#[cfg(feature = "serde")]
pub mod bootstrap;
pub mod error;
pub mod mac;
pub mod types;

#[cfg(feature = "serde")]
pub use bootstrap::{Bootstrap, Camera};
pub use error::{ParseError, ParseResult};
pub use mac::MacAddress;
pub use types::{DOORBELL_MODEL, DeviceSet, Doorbell, RingEvent, ring_events};
