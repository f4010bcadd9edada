//! Core library for UniFi Protect doorbell chimes.
//!
//! This crate talks to the Protect API, watches doorbells for rings and
//! keeps the chime's long-lived components running together.
//!
//! # Features
//!
//! - **Session client**: authenticated requests with transparent, single-flight
//!   re-authentication on `401`
//! - **Doorbell poller**: startup retry with exponential backoff, then ring-edge
//!   detection on a fixed interval
//! - **Supervisor**: run services concurrently, stop them all on the first
//!   failure or on shutdown, with a bounded grace period
//! - **Identity gate**: only start while the host is on a known network
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use chime_core::{
//!     ClientOptions, DoorbellPoller, PollerOptions, Supervisor, UnifiClient,
//!     mock::RecordingReaction,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), chime_core::Error> {
//!     let client = UnifiClient::new(ClientOptions::for_host("192.168.1.1", 7443, "user", "secret"))?;
//!     let poller = DoorbellPoller::new(
//!         Arc::new(client),
//!         Arc::new(RecordingReaction::new()),
//!         PollerOptions::default(),
//!     );
//!
//!     let supervisor = Supervisor::new(vec![Arc::new(poller)]);
//!     supervisor.run(&CancellationToken::new()).await
//! }
//! ```

pub mod client;
pub mod error;
pub mod gate;
pub mod hwaddr;
pub mod mock;
pub mod poller;
pub mod retry;
pub mod supervisor;
pub mod traits;

pub use chime_types::types;

pub use client::{ClientOptions, UnifiClient};
pub use error::{AuthFailure, Error, Result};
pub use gate::IdentityGate;
pub use hwaddr::{InterfaceInfo, SystemHardwareAddress};
pub use poller::{DoorbellPoller, PollerOptions, PollerState};
pub use retry::{Backoff, BackoffPolicy, retry_with_backoff};
pub use supervisor::Supervisor;
pub use traits::{DoorbellSource, HardwareAddressSource, RingReaction, Service};
