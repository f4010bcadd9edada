//! Desktop doorbell chime for UniFi Protect.
//!
//! Runs three services under one [`chime_core::Supervisor`]:
//!
//! - the doorbell poller, which opens the ringing page and posts a
//!   notification when a doorbell rings
//! - the local API (`api`), which proxies snapshots and LCD messages
//! - the frontend server (`frontend`), which serves the browser app
//!
//! When `boot_option.mac_address` is set, the services only run while this
//! machine's hardware address matches it.
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check
//! - `GET /snapshot/{doorbell_id}` - Current camera image
//! - `POST /message/set` - Show a message on the doorbell LCD
//! - `GET /message/templates` - Canned messages
//! - `GET /.well-known/configuration` - API endpoint, served by the frontend
//!
//! # Configuration
//!
//! The service reads configuration from `<config dir>/doorbell-chime/config.toml`.
//! `doorbell-chime init` writes a starting point:
//!
//! ```toml
//! [unifi]
//! host = "192.168.1.1"
//! username = "username"
//! password = "password"
//!
//! [message]
//! templates = ["I'm on my way", "I'm busy now"]
//! ```

pub mod api;
pub mod config;
pub mod frontend;
pub mod reaction;
pub mod server;
pub mod signal;

pub use api::{ApiState, AppError};
pub use config::{
    ApiConfig, BootOptionConfig, Config, ConfigError, LogConfig, MessageConfig,
    NotificationConfig, PollerConfig, UnifiConfig, WebConfig, default_config_path,
};
pub use reaction::{ChimeReaction, Notifier, UrlLauncher};
pub use server::{HttpService, ServeToken, resolve_port};
