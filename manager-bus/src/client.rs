//! `ManagerClient`: the coordinator's request/reply handle onto a
//! driver, generalizing the teacher's `client::RequestChan` (an
//! `mpsc`+`oneshot` pair bound to a single in-process peer) to a
//! request sent over a pluggable [`MessageBus`] and answered by
//! whichever driver owns the target protocol.

use crate::bus::MessageBus;
use crate::topic;
use manager_api::types::{Device, DeviceDataMap, Product, Protocol, Value};
use manager_api::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ClientRequest {
    InitDriver {
        protocol: Protocol,
        products: Vec<Product>,
        online_devices: Vec<Device>,
    },
    UpdateProduct {
        product: Product,
    },
    DeleteProduct {
        product_id: String,
    },
    UpdateDevice {
        device: Device,
    },
    DeleteDevice {
        device_id: String,
    },
    Read {
        device_id: String,
        property_id: String,
    },
    HardRead {
        device_id: String,
        property_id: String,
    },
    Write {
        device_id: String,
        property_id: String,
        value: Value,
    },
    Call {
        device_id: String,
        method: String,
        args: DeviceDataMap,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ClientReply {
    Ack,
    Value(Value),
    Data(DeviceDataMap),
    Err(String),
}

impl ClientReply {
    fn into_ack(self) -> Result<()> {
        match self {
            ClientReply::Ack => Ok(()),
            ClientReply::Err(e) => Err(Error::bus(e)),
            other => Err(Error::bus(format!("unexpected reply to an ack request: {other:?}"))),
        }
    }

    fn into_value(self) -> Result<Value> {
        match self {
            ClientReply::Value(v) => Ok(v),
            ClientReply::Err(e) => Err(Error::bus(e)),
            other => Err(Error::bus(format!("unexpected reply to a value request: {other:?}"))),
        }
    }

    fn into_data(self) -> Result<DeviceDataMap> {
        match self {
            ClientReply::Data(d) => Ok(d),
            ClientReply::Err(e) => Err(Error::bus(e)),
            other => Err(Error::bus(format!("unexpected reply to a data request: {other:?}"))),
        }
    }
}

/// Sends commands to the driver owning `protocol_id` and awaits its
/// reply. One instance is shared across the coordinator; the target
/// driver is selected per-call by `protocol_id`, not bound at
/// construction.
#[derive(Clone)]
pub struct ManagerClient {
    bus: Arc<dyn MessageBus>,
    timeout: Duration,
}

impl ManagerClient {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        ManagerClient {
            bus,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(bus: Arc<dyn MessageBus>, timeout: Duration) -> Self {
        ManagerClient { bus, timeout }
    }

    async fn call(&self, protocol_id: &str, req: &ClientRequest) -> Result<ClientReply> {
        let payload = bytes::Bytes::from(serde_json::to_vec(req)?);
        let reply = self
            .bus
            .request(&topic::driver_cmd(protocol_id), payload, self.timeout)
            .await?;
        Ok(serde_json::from_slice(&reply)?)
    }

    pub async fn init_driver(&self, protocol: Protocol, products: Vec<Product>, online_devices: Vec<Device>) -> Result<()> {
        let protocol_id = protocol.id.clone();
        self.call(
            &protocol_id,
            &ClientRequest::InitDriver {
                protocol,
                products,
                online_devices,
            },
        )
        .await?
        .into_ack()
    }

    pub async fn update_product(&self, protocol_id: &str, product: Product) -> Result<()> {
        self.call(protocol_id, &ClientRequest::UpdateProduct { product })
            .await?
            .into_ack()
    }

    pub async fn delete_product(&self, protocol_id: &str, product_id: &str) -> Result<()> {
        self.call(
            protocol_id,
            &ClientRequest::DeleteProduct {
                product_id: product_id.to_string(),
            },
        )
        .await?
        .into_ack()
    }

    pub async fn update_device(&self, protocol_id: &str, device: Device) -> Result<()> {
        self.call(protocol_id, &ClientRequest::UpdateDevice { device })
            .await?
            .into_ack()
    }

    pub async fn delete_device(&self, protocol_id: &str, device_id: &str) -> Result<()> {
        self.call(
            protocol_id,
            &ClientRequest::DeleteDevice {
                device_id: device_id.to_string(),
            },
        )
        .await?
        .into_ack()
    }

    /// Returns the last value the driver has cached for this
    /// property, without forcing a device round-trip.
    pub async fn read(&self, protocol_id: &str, device_id: &str, property_id: &str) -> Result<Value> {
        self.call(
            protocol_id,
            &ClientRequest::Read {
                device_id: device_id.to_string(),
                property_id: property_id.to_string(),
            },
        )
        .await?
        .into_value()
    }

    /// Forces a device round-trip rather than returning a cached value.
    pub async fn hard_read(&self, protocol_id: &str, device_id: &str, property_id: &str) -> Result<Value> {
        self.call(
            protocol_id,
            &ClientRequest::HardRead {
                device_id: device_id.to_string(),
                property_id: property_id.to_string(),
            },
        )
        .await?
        .into_value()
    }

    pub async fn write(&self, protocol_id: &str, device_id: &str, property_id: &str, value: Value) -> Result<()> {
        self.call(
            protocol_id,
            &ClientRequest::Write {
                device_id: device_id.to_string(),
                property_id: property_id.to_string(),
                value,
            },
        )
        .await?
        .into_ack()
    }

    pub async fn call_method(&self, protocol_id: &str, device_id: &str, method: &str, args: DeviceDataMap) -> Result<DeviceDataMap> {
        self.call(
            protocol_id,
            &ClientRequest::Call {
                device_id: device_id.to_string(),
                method: method.to_string(),
                args,
            },
        )
        .await?
        .into_data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalBus;
    use manager_api::types::device::DeviceState;

    #[tokio::test]
    async fn read_round_trips_a_cached_value() {
        let bus: Arc<dyn MessageBus> = Arc::new(LocalBus::new());
        let client = ManagerClient::new(bus.clone());

        let mut server_sub = bus.subscribe(&topic::driver_cmd("p1")).await.unwrap();
        tokio::spawn(async move {
            let msg = server_sub.recv().await.unwrap();
            let req: ClientRequest = serde_json::from_slice(&msg.payload).unwrap();
            assert!(matches!(req, ClientRequest::Read { .. }));
            let reply = serde_json::to_vec(&ClientReply::Value(Value::Int(42))).unwrap();
            bus.publish(&msg.reply_to.unwrap(), bytes::Bytes::from(reply)).await.unwrap();
        });

        let v = client.read("p1", "dev-1", "temp").await.unwrap();
        assert_eq!(v, Value::Int(42));
    }

    #[tokio::test]
    async fn driver_error_reply_surfaces_as_bus_error() {
        let bus: Arc<dyn MessageBus> = Arc::new(LocalBus::new());
        let client = ManagerClient::with_timeout(bus.clone(), Duration::from_secs(1));

        let mut server_sub = bus.subscribe(&topic::driver_cmd("p1")).await.unwrap();
        tokio::spawn(async move {
            let msg = server_sub.recv().await.unwrap();
            let reply = serde_json::to_vec(&ClientReply::Err("device unreachable".into())).unwrap();
            bus.publish(&msg.reply_to.unwrap(), bytes::Bytes::from(reply)).await.unwrap();
        });

        let err = client
            .update_device(
                "p1",
                Device {
                    id: "dev-1".into(),
                    name: "dev-1".into(),
                    product_id: "prod-1".into(),
                    device_status: DeviceState::Connected,
                    recording: false,
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("device unreachable"));
    }
}
