//! Chime configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use chime_core::client::{ClientOptions, DEFAULT_PORT};
use chime_core::retry::BackoffPolicy;
use chime_core::PollerOptions;
use chime_types::MacAddress;

/// Commented starting point written by `doorbell-chime init`.
pub const SAMPLE_CONFIG: &str = r#"[log]
level = "info"

[unifi]
host = "192.168.1.1"
port = 7443
username = "username"
password = "password"
skip_tls_verify = true

[web]
# 0 picks a free local port at startup
port = 0

[api]
port = 0

[notification]
enabled = true
open_browser = true

[message]
templates = ["I'm on my way", "I'm busy now"]

# Only run while this machine's network interface has the given address.
#[boot_option]
#mac_address = "00:00:00:00:00:00"
"#;

/// Chime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    /// Protect appliance connection.
    pub unifi: UnifiConfig,
    /// Frontend server.
    pub web: WebConfig,
    /// Local API server.
    pub api: ApiConfig,
    pub poller: PollerConfig,
    pub notification: NotificationConfig,
    /// Canned doorbell messages offered by the frontend.
    pub message: MessageConfig,
    /// Network-identity gate.
    pub boot_option: BootOptionConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Write [`SAMPLE_CONFIG`] to `path`, refusing to replace an existing file.
    pub fn write_sample<P: AsRef<Path>>(path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(path, SAMPLE_CONFIG).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every problem found.
    ///
    /// This checks:
    /// - the log level is a known level
    /// - appliance host and credentials are present
    /// - fixed web and API ports differ
    /// - the poll interval is between 100 ms and 1 hour
    /// - the gate address parses, when set
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.log.validate());
        errors.extend(self.unifi.validate());
        errors.extend(self.poller.validate());
        errors.extend(self.boot_option.validate());

        if self.web.port != 0 && self.web.port == self.api.port {
            errors.push(ValidationError {
                field: "api.port".to_string(),
                message: format!("port {} is already used by web.port", self.api.port),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl LogConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        if LOG_LEVELS.contains(&self.level.to_lowercase().as_str()) {
            Vec::new()
        } else {
            vec![ValidationError {
                field: "log.level".to_string(),
                message: format!(
                    "unknown level '{}': expected one of {}",
                    self.level,
                    LOG_LEVELS.join(", ")
                ),
            }]
        }
    }
}

/// Protect appliance connection.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnifiConfig {
    /// Appliance IP address or hostname.
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Accept the appliance's self-signed certificate.
    pub skip_tls_verify: bool,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for UnifiConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            username: String::new(),
            password: String::new(),
            skip_tls_verify: true,
            request_timeout_secs: 10,
        }
    }
}

impl std::fmt::Debug for UnifiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnifiConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("skip_tls_verify", &self.skip_tls_verify)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl UnifiConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for (field, value) in [
            ("unifi.host", &self.host),
            ("unifi.username", &self.username),
            ("unifi.password", &self.password),
        ] {
            if value.trim().is_empty() {
                errors.push(ValidationError {
                    field: field.to_string(),
                    message: "cannot be empty".to_string(),
                });
            }
        }

        if self.port == 0 {
            errors.push(ValidationError {
                field: "unifi.port".to_string(),
                message: "port cannot be 0".to_string(),
            });
        }

        if self.request_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "unifi.request_timeout_secs".to_string(),
                message: "timeout must be at least 1 second".to_string(),
            });
        }

        errors
    }

    /// Session client options for this appliance.
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions::for_host(
            &self.host,
            self.port,
            self.username.clone(),
            self.password.clone(),
        )
        .accept_invalid_certs(self.skip_tls_verify)
        .request_timeout(Duration::from_secs(self.request_timeout_secs))
    }
}

/// Frontend server settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Listen port; `0` picks a free port at startup.
    pub port: u16,
    /// Directory with the frontend bundle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
}

/// Local API server settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Listen port; `0` picks a free port at startup.
    pub port: u16,
}

/// Minimum poll interval in milliseconds.
pub const MIN_POLL_INTERVAL_MS: u64 = 100;
/// Maximum poll interval in milliseconds (1 hour).
pub const MAX_POLL_INTERVAL_MS: u64 = 60 * 60 * 1000;

/// Doorbell poller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub interval_ms: u64,
    /// How long to keep retrying the appliance at startup.
    pub startup_max_elapsed_secs: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            startup_max_elapsed_secs: 300,
        }
    }
}

impl PollerConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.interval_ms < MIN_POLL_INTERVAL_MS {
            errors.push(ValidationError {
                field: "poller.interval_ms".to_string(),
                message: format!(
                    "poll interval {} is too short (minimum {} ms)",
                    self.interval_ms, MIN_POLL_INTERVAL_MS
                ),
            });
        } else if self.interval_ms > MAX_POLL_INTERVAL_MS {
            errors.push(ValidationError {
                field: "poller.interval_ms".to_string(),
                message: format!(
                    "poll interval {} is too long (maximum {} ms / 1 hour)",
                    self.interval_ms, MAX_POLL_INTERVAL_MS
                ),
            });
        }

        if self.startup_max_elapsed_secs == 0 {
            errors.push(ValidationError {
                field: "poller.startup_max_elapsed_secs".to_string(),
                message: "startup retry budget cannot be 0".to_string(),
            });
        }

        errors
    }

    /// Poller options for these settings.
    pub fn options(&self) -> PollerOptions {
        PollerOptions::default()
            .interval(Duration::from_millis(self.interval_ms))
            .connect_backoff(
                BackoffPolicy::for_startup()
                    .max_elapsed_time(Duration::from_secs(self.startup_max_elapsed_secs)),
            )
    }
}

/// Ring reactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Post a desktop notification on ring.
    pub enabled: bool,
    /// Open the ringing page in the browser on ring.
    pub open_browser: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            open_browser: true,
        }
    }
}

/// Canned messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageConfig {
    pub templates: Vec<String>,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            templates: vec!["I'm on my way".to_string(), "I'm busy now".to_string()],
        }
    }
}

/// Network-identity gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootOptionConfig {
    /// Only run while the host reports this hardware address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    /// Interface to sample; the first active one when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    /// Seconds between samples while waiting.
    pub check_interval_secs: u64,
}

impl Default for BootOptionConfig {
    fn default() -> Self {
        Self {
            mac_address: None,
            interface: None,
            check_interval_secs: 60,
        }
    }
}

impl BootOptionConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Some(mac) = &self.mac_address
            && let Err(e) = mac.parse::<MacAddress>()
        {
            errors.push(ValidationError {
                field: "boot_option.mac_address".to_string(),
                message: e.to_string(),
            });
        }

        if let Some(interface) = &self.interface
            && interface.trim().is_empty()
        {
            errors.push(ValidationError {
                field: "boot_option.interface".to_string(),
                message: "interface cannot be empty string (omit it instead)".to_string(),
            });
        }

        if self.check_interval_secs == 0 {
            errors.push(ValidationError {
                field: "boot_option.check_interval_secs".to_string(),
                message: "check interval cannot be 0".to_string(),
            });
        }

        errors
    }

    /// The gate target, if the gate is enabled and the address is valid.
    pub fn target(&self) -> Option<MacAddress> {
        self.mac_address.as_deref().and_then(|m| m.parse().ok())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Config file {0} already exists")]
    AlreadyExists(PathBuf),
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `unifi.host`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("doorbell-chime")
        .join("config.toml")
}
