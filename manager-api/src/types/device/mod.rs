//! The `Device` entity and the data it reports.

mod value;

pub use value::{FieldType, Value};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// The wildcard property id used to subscribe to every property a
/// device reports.
pub const PROPERTY_ID_WILDCARD: &str = "*";

/// The distinguished property id used by subscriptions that return a
/// whole-device snapshot rather than a single property's value.
pub const PROPERTY_ID_MULTI: &str = "$multi";

/// A device's lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Disconnected,
    Connected,
    Reconnecting,
    Exception,
}

impl Default for DeviceState {
    fn default() -> Self {
        DeviceState::Disconnected
    }
}

/// An instance of a product.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub product_id: String,
    #[serde(default)]
    pub device_status: DeviceState,
    #[serde(default)]
    pub recording: bool,
}

impl Device {
    /// Builds a device with the invariant defaults from spec §4.6's
    /// `CreateDevice`: name defaults to the id, and the initial state
    /// is always `Disconnected`.
    pub fn new(id: impl Into<String>, product_id: impl Into<String>) -> Self {
        let id = id.into();
        Device {
            name: id.clone(),
            id,
            product_id: product_id.into(),
            device_status: DeviceState::Disconnected,
            recording: false,
        }
    }
}

/// A single reading carried for one property.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceData {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub value: Value,
    /// Server-side timestamp, in nanoseconds since the Unix epoch.
    pub ts: i64,
}

impl DeviceData {
    pub fn now(name: impl Into<String>, value: Value) -> Self {
        let field_type = value.field_type();
        DeviceData {
            name: name.into(),
            field_type,
            value,
            ts: now_ns(),
        }
    }
}

pub fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

/// A map from property id to the reading reported for it: the shape
/// every bus message about device properties carries, and the body
/// shape for `PUT /devices/{id}/properties/{pid}` and the methods
/// request/response bodies.
pub type DeviceDataMap = HashMap<String, DeviceData>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_device_defaults_name_to_id_and_state_to_disconnected() {
        let d = Device::new("dev-1", "prod-1");
        assert_eq!(d.name, "dev-1");
        assert_eq!(d.device_status, DeviceState::Disconnected);
        assert!(!d.recording);
    }
}
