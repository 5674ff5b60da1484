//! The decoded payloads carried on manager topics.

use manager_api::types::{DeviceDataMap, DeviceStatus, DriverStatus};
use serde::{Deserialize, Serialize};

/// A device-raised event, published on `device-event/...`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceEvent {
    pub name: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Everything a manager topic can carry, tagged so a single decode
/// call can dispatch on the variant without the caller needing to
/// know in advance which topic produced the bytes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BusMessage {
    DriverStatus(DriverStatus),
    DeviceStatus(DeviceStatus),
    Props(DeviceDataMap),
    Event(DeviceEvent),
}

impl BusMessage {
    pub fn encode(&self) -> manager_api::Result<bytes::Bytes> {
        Ok(bytes::Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn decode(bytes: &[u8]) -> manager_api::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manager_api::types::device::DeviceState;

    #[test]
    fn device_status_round_trips_through_json() {
        let msg = BusMessage::DeviceStatus(DeviceStatus {
            device_id: "dev-1".into(),
            state: DeviceState::Connected,
            state_detail: String::new(),
        });
        let encoded = msg.encode().unwrap();
        assert_eq!(BusMessage::decode(&encoded).unwrap(), msg);
    }
}
