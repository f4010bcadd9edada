//! Doorbell snapshots and ring-edge detection.

use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Camera model string the vendor reports for the G4 doorbell.
pub const DOORBELL_MODEL: &str = "UVC G4 Doorbell";

/// One observed doorbell as reported by the vendor inventory.
///
/// `name` is the matching key between polls. The vendor does not guarantee
/// names are unique, but they are treated as unique for matching.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Doorbell {
    /// Stable vendor identifier, used in API paths.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Hardware address of the doorbell itself.
    #[cfg_attr(feature = "serde", serde(default))]
    pub mac: String,
    /// Vendor timestamp of the last ring, in milliseconds. `0` if never rung.
    pub last_ring: u64,
}

impl Doorbell {
    /// Create a doorbell snapshot.
    pub fn new(id: impl Into<String>, name: impl Into<String>, last_ring: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mac: String::new(),
            last_ring,
        }
    }

    /// Whether this snapshot shows a ring edge compared with `previous`.
    ///
    /// Only the first entry in `previous` with the same name is considered.
    /// A doorbell with no previous entry never rings.
    ///
    /// ```
    /// use chime_types::Doorbell;
    ///
    /// let before = vec![Doorbell::new("1", "Front", 100)];
    /// assert!(Doorbell::new("1", "Front", 150).rang_since(&before));
    /// assert!(!Doorbell::new("1", "Front", 100).rang_since(&before));
    /// assert!(!Doorbell::new("2", "Back", 900).rang_since(&before));
    /// ```
    #[must_use]
    pub fn rang_since(&self, previous: &[Doorbell]) -> bool {
        previous
            .iter()
            .find(|old| old.name == self.name)
            .is_some_and(|old| self.last_ring > old.last_ring)
    }
}

/// An unordered collection of doorbell snapshots from one poll.
pub type DeviceSet = Vec<Doorbell>;

/// A ring edge: the doorbell's ring timestamp strictly increased between polls.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RingEvent {
    /// The doorbell as seen in the newer poll.
    pub doorbell: Doorbell,
    /// `last_ring` from the older poll.
    pub previous_ring: u64,
}

/// Compute ring edges between two polls.
///
/// An event is produced for every doorbell in `current` whose name also
/// appears in `previous` and whose `last_ring` is strictly greater. Equal
/// timestamps and first sightings never produce an event. Events follow the
/// order of `current`.
///
/// ```
/// use chime_types::{Doorbell, ring_events};
///
/// let prev = vec![Doorbell::new("1", "Front", 100)];
/// let cur = vec![Doorbell::new("1", "Front", 150)];
/// assert_eq!(ring_events(&prev, &cur).len(), 1);
/// assert!(ring_events(&prev, &prev).is_empty());
/// ```
#[must_use]
pub fn ring_events(previous: &[Doorbell], current: &[Doorbell]) -> Vec<RingEvent> {
    let mut baseline: HashMap<&str, u64> = HashMap::with_capacity(previous.len());
    for old in previous {
        baseline.entry(old.name.as_str()).or_insert(old.last_ring);
    }

    current
        .iter()
        .filter_map(|doorbell| {
            let previous_ring = *baseline.get(doorbell.name.as_str())?;
            (doorbell.last_ring > previous_ring).then(|| RingEvent {
                doorbell: doorbell.clone(),
                previous_ring,
            })
        })
        .collect()
}
