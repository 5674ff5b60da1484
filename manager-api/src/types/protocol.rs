use serde::{Deserialize, Serialize};

/// A registered driver. Identity is `id`; a protocol only exists in
/// the coordinator's registry while its driver is sending heartbeats.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Protocol {
    pub id: String,
    pub name: String,
    pub health_check_interval: u64,
}

/// The heartbeat message drivers publish. `hello = true` marks a
/// fresh registration that should trigger initialization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DriverStatus {
    pub protocol: Protocol,
    #[serde(default)]
    pub hello: bool,
    pub state: String,
    #[serde(default)]
    pub state_detail: String,
    pub health_check_interval_second: u64,
}

/// A device state-change notification published by a driver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub device_id: String,
    pub state: super::device::DeviceState,
    #[serde(default)]
    pub state_detail: String,
}
