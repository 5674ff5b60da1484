//! `ManagerService`: typed subscribe wrappers over a [`MessageBus`],
//! generalizing the teacher's broadcast-channel device subscriptions
//! to the bus-wide topic taxonomy.

use crate::bus::MessageBus;
use crate::message::BusMessage;
use crate::topic;
use manager_api::Result;
use std::sync::Arc;

/// A subscription whose payloads are decoded into [`BusMessage`] as
/// they arrive, rather than leaving the caller to call
/// `BusMessage::decode` itself.
pub struct TypedSubscription {
    inner: crate::bus::Subscription,
}

impl TypedSubscription {
    /// Returns the next decoded message, or `None` once the
    /// subscription has been stopped. A message that fails to decode
    /// is itself returned as an error rather than silently dropped,
    /// since a malformed payload on one of these topics means a
    /// producer and consumer have drifted out of sync.
    pub async fn recv(&mut self) -> Option<Result<BusMessage>> {
        let msg = self.inner.recv().await?;
        Some(BusMessage::decode(&msg.payload))
    }

    pub fn stop(self) {
        self.inner.stop();
    }
}

#[derive(Clone)]
pub struct ManagerService {
    bus: Arc<dyn MessageBus>,
}

impl ManagerService {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        ManagerService { bus }
    }

    async fn subscribe(&self, topic: &str) -> Result<TypedSubscription> {
        Ok(TypedSubscription {
            inner: self.bus.subscribe(topic).await?,
        })
    }

    /// Fan-in of every driver's heartbeat.
    pub async fn driver_status(&self) -> Result<TypedSubscription> {
        self.subscribe(&topic::driver_status()).await
    }

    pub async fn device_status(&self, protocol_id: &str) -> Result<TypedSubscription> {
        self.subscribe(&topic::device_status(protocol_id)).await
    }

    /// `property_id` may be [`topic::WILDCARD`] to receive every
    /// property a device reports.
    pub async fn device_props(&self, protocol_id: &str, product_id: &str, device_id: &str, property_id: &str) -> Result<TypedSubscription> {
        self.subscribe(&topic::device_props(protocol_id, product_id, device_id, property_id))
            .await
    }

    pub async fn device_event(&self, protocol_id: &str, product_id: &str, device_id: &str, event: &str) -> Result<TypedSubscription> {
        self.subscribe(&topic::device_event(protocol_id, product_id, device_id, event))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalBus;
    use manager_api::types::{DeviceStatus, device::DeviceState};

    #[tokio::test]
    async fn device_status_subscription_decodes_bus_messages() {
        let bus: Arc<dyn MessageBus> = Arc::new(LocalBus::new());
        let service = ManagerService::new(bus.clone());

        let mut sub = service.device_status("p1").await.unwrap();

        let status = DeviceStatus {
            device_id: "dev-1".into(),
            state: DeviceState::Connected,
            state_detail: String::new(),
        };
        let encoded = BusMessage::DeviceStatus(status.clone()).encode().unwrap();
        bus.publish(&topic::device_status("p1"), encoded).await.unwrap();

        match sub.recv().await {
            Some(Ok(BusMessage::DeviceStatus(got))) => assert_eq!(got, status),
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
