//! Error types for chime-core.
//!
//! # Error Classes
//!
//! | Error Type | Strategy | Rationale |
//! |------------|----------|-----------|
//! | [`Error::Transport`] | Retry at caller level | DNS, connect and TLS failures are usually transient |
//! | [`Error::Timeout`] | Retry at caller level | The appliance may be busy |
//! | [`Error::Auth`] | Do not auto-retry | Credentials were rejected after a fresh login |
//! | [`Error::Http`] | Caller decides | 4xx is surfaced to local clients, 5xx is logged |
//! | [`Error::Cancelled`] | Never an error | Treated as a clean stop by the supervisor |
//!
//! The session client recovers exactly one `401 Unauthorized` transparently.
//! Everything else propagates: the poller treats fetch failures as fatal for
//! itself, and the supervisor reports the first service failure to the
//! process boundary.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the session client, poller, supervisor and gate.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Network-level failure: DNS, connect, TLS or a broken body stream.
    #[error("Transport error for {url}: {source}")]
    Transport {
        /// The URL being requested.
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// A request did not complete within its deadline.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Credential acquisition or renewal failed.
    #[error("Authentication failed: {0}")]
    Auth(AuthFailure),

    /// The vendor answered with a non-2xx status.
    #[error("HTTP {status} from {method} {url}")]
    Http {
        /// Response status code.
        status: u16,
        /// The URL that was requested.
        url: String,
        /// The HTTP method used.
        method: String,
    },

    /// A request body could not be serialized.
    #[error("Failed to encode request for {url}: {source}")]
    Encode {
        /// The URL being requested.
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// The response body could not be decoded.
    #[error("Failed to decode response from {url}: {source}")]
    Decode {
        /// The URL that was requested.
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// A retried operation kept failing until the backoff budget ran out.
    #[error("'{operation}' gave up after {elapsed:?}: {source}")]
    RetriesExhausted {
        /// The operation being retried.
        operation: String,
        /// Total time spent retrying.
        elapsed: Duration,
        /// The last failure.
        #[source]
        source: Box<Error>,
    },

    /// A supervised service failed.
    #[error("Service '{service}' failed: {source}")]
    ServiceFailed {
        /// Name of the failing service.
        service: String,
        #[source]
        source: Box<Error>,
    },

    /// A supervised service returned while it was still expected to run.
    #[error("Service '{service}' exited unexpectedly")]
    ServiceExited {
        /// Name of the service.
        service: String,
    },

    /// A supervised service panicked.
    #[error("Service '{service}' panicked")]
    ServicePanicked {
        /// Name of the service.
        service: String,
    },

    /// The local hardware address could not be determined.
    #[error("Hardware address unavailable: {0}")]
    HardwareAddress(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Structured reasons for authentication failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthFailure {
    /// The login endpoint refused the credentials.
    Rejected { status: u16 },
    /// The login succeeded but did not return an `Authorization` header.
    MissingToken,
    /// A request was still unauthorized after re-authenticating once.
    RejectedAfterRetry { url: String },
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected { status } => write!(f, "login rejected with HTTP {}", status),
            Self::MissingToken => write!(f, "login response carried no Authorization header"),
            Self::RejectedAfterRetry { url } => {
                write!(f, "{} still unauthorized after re-authenticating", url)
            }
        }
    }
}

impl Error {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Wrap a failure with the name of the service that produced it.
    pub fn service_failed(service: impl Into<String>, source: Error) -> Self {
        Self::ServiceFailed {
            service: service.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error is a cancellation, possibly wrapped.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::RetriesExhausted { source, .. } | Self::ServiceFailed { source, .. } => {
                source.is_cancelled()
            }
            _ => false,
        }
    }

    /// Whether a caller-level retry is reasonable.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } | Self::Io(_) => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// HTTP status of a vendor error response, if this is one.
    #[must_use]
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Auth(AuthFailure::Rejected { status }) => Some(*status),
            Self::ServiceFailed { source, .. } | Self::RetriesExhausted { source, .. } => {
                source.http_status()
            }
            _ => None,
        }
    }
}

/// Result type alias using chime-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
