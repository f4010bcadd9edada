//! Error types for data parsing in chime-types.

use thiserror::Error;

/// Errors that can occur when parsing doorbell-related values.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A hardware address did not have six octets.
    #[error("Invalid MAC address '{input}': expected 6 octets, got {octets}")]
    MacOctetCount {
        /// The rejected input.
        input: String,
        /// Number of octets found.
        octets: usize,
    },

    /// A hardware address octet was not a two-digit hex number.
    #[error("Invalid MAC address '{input}': bad octet '{octet}'")]
    MacOctet {
        /// The rejected input.
        input: String,
        /// The offending octet text.
        octet: String,
    },
}

/// Result type alias using chime-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
