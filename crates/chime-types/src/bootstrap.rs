//! The vendor's device inventory (`GET /bootstrap`).
//!
//! Only the fields the chime uses are modelled; everything else in the
//! (large) response is ignored during deserialization.

use serde::{Deserialize, Serialize};

use crate::types::{DOORBELL_MODEL, Doorbell};

/// Full device inventory returned by the vendor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Bootstrap {
    /// ID of the authenticated user.
    pub auth_user_id: String,
    /// All cameras known to the controller, doorbells included.
    pub cameras: Vec<Camera>,
}

/// A camera entry from the inventory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Camera {
    pub id: String,
    pub name: String,
    pub mac: String,
    /// Hardware model, e.g. `"UVC G4 Doorbell"`.
    #[serde(rename = "type")]
    pub model: String,
    /// Whether the camera is adopted by this controller.
    pub is_managed: bool,
    /// Connection state reported by the controller (e.g. `"CONNECTED"`).
    pub state: String,
    /// Last ring timestamp; `null` for cameras that never rang.
    pub last_ring: Option<u64>,
}

impl Camera {
    /// Whether this camera is a doorbell model.
    #[must_use]
    pub fn is_doorbell(&self) -> bool {
        self.model == DOORBELL_MODEL
    }
}

impl From<&Camera> for Doorbell {
    fn from(camera: &Camera) -> Self {
        Doorbell {
            id: camera.id.clone(),
            name: camera.name.clone(),
            mac: camera.mac.clone(),
            last_ring: camera.last_ring.unwrap_or(0),
        }
    }
}

impl Bootstrap {
    /// Managed doorbells in inventory order.
    #[must_use]
    pub fn doorbells(&self) -> Vec<Doorbell> {
        self.cameras
            .iter()
            .filter(|c| c.is_managed && c.is_doorbell())
            .map(Doorbell::from)
            .collect()
    }
}
