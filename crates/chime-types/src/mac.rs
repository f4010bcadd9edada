//! Hardware (MAC) addresses.

use std::fmt;
use std::str::FromStr;

use crate::error::{ParseError, ParseResult};

/// A 48-bit hardware address.
///
/// Parsing accepts `:` or `-` separators in either case. Display always
/// renders lowercase, colon-separated octets.
///
/// # Examples
///
/// ```
/// use chime_types::MacAddress;
///
/// let a: MacAddress = "AA-BB-CC-00-11-22".parse().unwrap();
/// let b: MacAddress = "aa:bb:cc:00:11:22".parse().unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "aa:bb:cc:00:11:22");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Create an address from raw octets.
    #[must_use]
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Raw octets.
    #[must_use]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Parse an address, returning a descriptive error on failure.
    pub fn parse(input: &str) -> ParseResult<Self> {
        let trimmed = input.trim();
        let parts: Vec<&str> = trimmed.split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(ParseError::MacOctetCount {
                input: input.to_string(),
                octets: parts.len(),
            });
        }

        let mut octets = [0u8; 6];
        for (slot, part) in octets.iter_mut().zip(&parts) {
            if part.len() != 2 {
                return Err(ParseError::MacOctet {
                    input: input.to_string(),
                    octet: (*part).to_string(),
                });
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| ParseError::MacOctet {
                input: input.to_string(),
                octet: (*part).to_string(),
            })?;
        }

        Ok(Self(octets))
    }
}

impl FromStr for MacAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for MacAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for MacAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
