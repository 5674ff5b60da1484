//! The device manager / coordinator (C7): the component binding the
//! driver registry, device-status tracking, and recorder lifecycle
//! together. Grounded in `pkg/manager/device_manager.go` and
//! `pkg/manager/handle_operations_meta.go`.

use crate::recorder::RecorderHandle;
use crate::ttl::TtlCache;
use manager_api::types::device::DeviceState;
use manager_api::types::{Device, DeviceStatus, DriverStatus, Product, Protocol};
use manager_api::{Error, Result};
use manager_bus::bus::MessageBus;
use manager_bus::message::BusMessage;
use manager_bus::{ManagerClient, ManagerService};
use manager_datastore::TimeSeriesStore;
use manager_metastore::MetaStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

/// Device states a driver hello re-arms (spec.md's Open Questions
/// decision): `Disconnected` is excluded because a device that has
/// never been seen online by this driver instance has nothing to
/// reconnect.
fn is_online(state: DeviceState) -> bool {
    matches!(state, DeviceState::Connected | DeviceState::Reconnecting | DeviceState::Exception)
}

pub struct Coordinator {
    metastore: Arc<dyn MetaStore>,
    datastore: Arc<TimeSeriesStore>,
    bus: Arc<dyn MessageBus>,
    client: ManagerClient,
    service: ManagerService,
    protocols: TtlCache<Protocol>,
    recorders: Mutex<HashMap<String, RecorderHandle>>,
    root: CancellationToken,
}

impl Coordinator {
    pub fn new(
        metastore: Arc<dyn MetaStore>,
        datastore: Arc<TimeSeriesStore>,
        bus: Arc<dyn MessageBus>,
        client: ManagerClient,
        service: ManagerService,
        root: CancellationToken,
    ) -> Arc<Self> {
        let protocols = TtlCache::new(Duration::from_secs(1), move |protocol_id, _protocol: Protocol| async move {
            unregister_driver(&protocol_id).await;
        });

        Arc::new(Coordinator {
            metastore,
            datastore,
            bus,
            client,
            service,
            protocols,
            recorders: Mutex::new(HashMap::new()),
            root,
        })
    }

    /// Starts the driver-status monitor. The caller should `tokio::
    /// spawn` the returned future; a subscription failure here is
    /// fatal for the manager (spec §7: no driver discovery means no
    /// value).
    pub async fn run_driver_monitor(self: Arc<Self>) -> Result<()> {
        let mut sub = self
            .service
            .driver_status()
            .await
            .map_err(|e| Error::bus(format!("driver-status subscription failed at startup: {e}")))?;

        loop {
            tokio::select! {
                biased;
                _ = self.root.cancelled() => {
                    sub.stop();
                    return Ok(());
                }
                msg = sub.recv() => {
                    match msg {
                        None => return Ok(()),
                        Some(Err(e)) => {
                            warn!(error = %e, "malformed driver-status payload, ignoring");
                        }
                        Some(Ok(BusMessage::DriverStatus(status))) => {
                            self.clone().handle_driver_status(status).await;
                        }
                        Some(Ok(_other)) => {
                            warn!("unexpected message kind on driver-status, ignoring");
                        }
                    }
                }
            }
        }
    }

    async fn handle_driver_status(self: Arc<Self>, status: DriverStatus) {
        if status.protocol.id.is_empty() {
            warn!("ignoring driver-status with empty protocol id");
            return;
        }

        let ttl = Duration::from_secs(status.health_check_interval_second + 1);

        if status.hello {
            if let Err(e) = self.clone().init_driver(status.protocol.clone()).await {
                error!(protocol = %status.protocol.id, error = %e, "driver initialization failed");
            }
        }

        self.protocols.set(status.protocol.id.clone(), status.protocol, ttl).await;
    }

    /// Enumerates products/devices for `protocol`, activates recorders
    /// for the ones already recording, pushes `InitDriver`, and spawns
    /// the per-protocol device-status monitor.
    async fn init_driver(self: Arc<Self>, protocol: Protocol) -> Result<()> {
        let products = self.metastore.list_products(&protocol.id).await?;

        let mut online_devices = Vec::new();
        for product in &products {
            let devices = self.metastore.list_devices(&product.id).await?;
            for device in devices {
                if is_online(device.device_status) {
                    online_devices.push(device.clone());
                }
                if device.recording {
                    self.clone().activate_recorder(product.clone(), device).await;
                }
            }
        }

        self.client
            .init_driver(protocol.clone(), products, online_devices)
            .await?;

        let protocol_id = protocol.id.clone();
        let this = self.clone();
        tokio::spawn(
            async move { this.run_device_status_monitor(protocol_id).await }.instrument(info_span!("device_status_monitor", protocol = %protocol.id)),
        );

        Ok(())
    }

    async fn run_device_status_monitor(self: Arc<Self>, protocol_id: String) {
        let mut sub = match self.service.device_status(&protocol_id).await {
            Ok(sub) => sub,
            Err(e) => {
                error!(protocol = %protocol_id, error = %e, "device-status subscription failed");
                return;
            }
        };

        loop {
            tokio::select! {
                biased;
                _ = self.root.cancelled() => {
                    sub.stop();
                    return;
                }
                msg = sub.recv() => {
                    match msg {
                        None => return,
                        Some(Err(e)) => {
                            warn!(error = %e, "malformed device-status payload, ignoring");
                        }
                        Some(Ok(BusMessage::DeviceStatus(status))) => {
                            self.clone().handle_device_status(&protocol_id, status).await;
                        }
                        Some(Ok(_other)) => {
                            warn!("unexpected message kind on device-status, ignoring");
                        }
                    }
                }
            }
        }
    }

    async fn handle_device_status(self: Arc<Self>, protocol_id: &str, status: DeviceStatus) {
        let mut device = match self.metastore.get_device(&status.device_id).await {
            Ok(d) => d,
            Err(e) => {
                warn!(device = %status.device_id, error = %e, "device-status for unknown device, ignoring");
                return;
            }
        };

        if device.device_status == status.state {
            return;
        }

        device.device_status = status.state;
        if let Err(e) = self.clone().update_device(protocol_id, device).await {
            error!(device = %status.device_id, error = %e, "failed to apply device-status update");
        }
    }

    // ---- Mutation API -----------------------------------------------

    pub async fn create_product(&self, protocol_id: &str, product_id: &str) -> Result<Product> {
        if self.protocol(protocol_id).await.is_none() {
            return Err(Error::not_found(format!("no protocol registered with id {protocol_id}")));
        }
        if self.metastore.get_product(product_id).await.is_ok() {
            return Err(Error::conflict(format!("product {product_id} already exists")));
        }
        let product = Product::new(product_id, protocol_id);
        self.metastore.create_product(&product).await?;
        Ok(product)
    }

    pub async fn update_product(&self, product: Product) -> Result<()> {
        self.metastore.update_product(&product).await?;
        let protocol_id = product.protocol_id.clone();
        self.client.update_product(&protocol_id, product).await
    }

    /// Deletes the product, tells the driver, then cascade-deletes
    /// every device of this product. The parent deletion stands even
    /// if a child delete fails; per-device failures are logged, not
    /// propagated (spec §7).
    pub async fn delete_product(&self, product_id: &str) -> Result<()> {
        let product = self.metastore.get_product(product_id).await?;
        self.metastore.delete_product(product_id).await?;
        self.client.delete_product(&product.protocol_id, product_id).await?;

        let devices = self.metastore.list_devices(product_id).await.unwrap_or_default();
        for device in devices {
            if let Err(e) = self.delete_device(&product.protocol_id, &device.id).await {
                error!(device = %device.id, error = %e, "cascade delete of device failed, continuing");
            }
        }
        Ok(())
    }

    pub async fn create_device(&self, product_id: &str, device_id: &str) -> Result<Device> {
        if self.metastore.get_device(device_id).await.is_ok() {
            return Err(Error::conflict(format!("device {device_id} already exists")));
        }
        let device = Device::new(device_id, product_id);
        self.metastore.create_device(&device).await?;
        Ok(device)
    }

    /// Persists and notifies the driver, then reconciles recorder
    /// presence with the `recording` flag.
    pub async fn update_device(self: &Arc<Self>, protocol_id: &str, device: Device) -> Result<()> {
        self.metastore.update_device(&device).await?;
        self.client.update_device(protocol_id, device.clone()).await?;

        let product = self.metastore.get_product(&device.product_id).await?;
        if device.recording {
            self.clone().activate_recorder(product, device).await;
        } else {
            self.deactivate_recorder(&device.id).await;
        }
        Ok(())
    }

    pub async fn delete_device(&self, protocol_id: &str, device_id: &str) -> Result<()> {
        self.metastore.delete_device(device_id).await?;
        self.deactivate_recorder(device_id).await;
        self.client.delete_device(protocol_id, device_id).await
    }

    /// Composes two metadata lookups into the `(protocol_id,
    /// product_id)` pair HTTP handlers need to address a device's
    /// driver.
    pub async fn trace(&self, device_id: &str) -> Result<(String, String)> {
        let device = self.metastore.get_device(device_id).await?;
        let product = self.metastore.get_product(&device.product_id).await?;
        Ok((product.protocol_id, product.id))
    }

    // ---- Recorder lifecycle ------------------------------------------

    async fn activate_recorder(self: Arc<Self>, product: Product, device: Device) {
        if !device.recording {
            return;
        }
        let mut recorders = self.recorders.lock().await;
        if recorders.contains_key(&device.id) {
            return;
        }
        let handle = RecorderHandle::start(&self.root, self.service.clone(), self.datastore.clone(), product, device.clone());
        recorders.insert(device.id, handle);
    }

    async fn deactivate_recorder(&self, device_id: &str) {
        let handle = self.recorders.lock().await.remove(device_id);
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    pub fn client(&self) -> &ManagerClient {
        &self.client
    }

    pub fn service(&self) -> &ManagerService {
        &self.service
    }

    pub fn metastore(&self) -> &Arc<dyn MetaStore> {
        &self.metastore
    }

    pub fn datastore(&self) -> &Arc<TimeSeriesStore> {
        &self.datastore
    }

    /// The raw bus, for the one HTTP route (`GET /ms/topic:watch`) that
    /// needs to subscribe to a caller-supplied topic the typed
    /// [`ManagerService`] wrappers have no shape for.
    pub fn bus(&self) -> &Arc<dyn MessageBus> {
        &self.bus
    }

    pub async fn active_protocols(&self) -> Vec<Protocol> {
        self.protocols.snapshot().await
    }

    pub async fn protocol(&self, protocol_id: &str) -> Option<Protocol> {
        self.protocols.get(protocol_id).await
    }

    pub async fn is_recording(&self, device_id: &str) -> bool {
        self.recorders.lock().await.contains_key(device_id)
    }
}

async fn unregister_driver(protocol_id: &str) {
    // TTL expiration is informational: the driver is unreachable, but
    // device records and metadata are retained (spec §4.6).
    info!(protocol = %protocol_id, "driver heartbeat expired, marking unreachable");
}

#[cfg(test)]
mod tests {
    use super::*;
    use manager_bus::bus::MessageBus;
    use manager_bus::client::ClientRequest;
    use manager_bus::local::LocalBus;
    use manager_bus::topic;
    use manager_datastore::{Executor, InfluxDbConfig, InfluxDbExecutor};
    use manager_metastore::FileMetaStore;
    use std::sync::atomic::{AtomicU64, Ordering};

    static SEQ: AtomicU64 = AtomicU64::new(0);

    async fn harness() -> (Arc<Coordinator>, Arc<dyn MessageBus>) {
        let n = SEQ.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("managerd-coordinator-test-{}-{n}", std::process::id()));
        let metastore: Arc<dyn MetaStore> = Arc::new(FileMetaStore::open(dir).await.unwrap());

        let executor = Arc::new(
            InfluxDbExecutor::new(InfluxDbConfig {
                url: "http://127.0.0.1:0".into(),
                database: "manager".into(),
                username: None,
                password: None,
                timeout: Duration::from_millis(1),
            })
            .unwrap(),
        );
        let datastore = Arc::new(TimeSeriesStore::new(executor as Arc<dyn Executor>, 16));

        let bus: Arc<dyn MessageBus> = Arc::new(LocalBus::new());
        let client = ManagerClient::new(bus.clone());
        let service = ManagerService::new(bus.clone());

        let coordinator = Coordinator::new(metastore, datastore, bus.clone(), client, service, CancellationToken::new());
        (coordinator, bus)
    }

    fn protocol(id: &str) -> Protocol {
        Protocol {
            id: id.to_string(),
            name: id.to_string(),
            health_check_interval: 60,
        }
    }

    #[tokio::test]
    async fn driver_hello_activates_recorders_and_initializes_the_driver() {
        let (coordinator, bus) = harness().await;

        let mut product = Product::new("prod-1", "proto-a");
        coordinator.metastore().create_product(&product).await.unwrap();
        let mut device = Device::new("dev-1", "prod-1");
        device.device_status = DeviceState::Connected;
        device.recording = true;
        coordinator.metastore().create_device(&device).await.unwrap();
        product.properties.clear();

        let mut driver_cmds = bus.subscribe(&topic::driver_cmd("proto-a")).await.unwrap();
        let responder = tokio::spawn(async move {
            let msg = driver_cmds.recv().await.unwrap();
            let req: ClientRequest = serde_json::from_slice(&msg.payload).unwrap();
            assert!(matches!(req, ClientRequest::InitDriver { .. }));
            let reply = serde_json::to_vec(&manager_bus::client::ClientReply::Ack).unwrap();
            bus.publish(&msg.reply_to.unwrap(), bytes::Bytes::from(reply)).await.unwrap();
        });

        coordinator.clone().init_driver(protocol("proto-a")).await.unwrap();
        responder.await.unwrap();

        assert!(coordinator.is_recording("dev-1").await);
    }

    #[tokio::test]
    async fn recording_flip_starts_and_stops_a_recorder() {
        let (coordinator, _bus) = harness().await;

        let product = Product::new("prod-1", "proto-a");
        coordinator.metastore().create_product(&product).await.unwrap();
        let mut device = Device::new("dev-1", "prod-1");
        coordinator.metastore().create_device(&device).await.unwrap();

        coordinator.protocols.set("proto-a".to_string(), protocol("proto-a"), Duration::from_secs(60)).await;

        device.recording = true;
        coordinator.update_device("proto-a", device.clone()).await.unwrap();
        assert!(coordinator.is_recording("dev-1").await);

        device.recording = false;
        coordinator.update_device("proto-a", device).await.unwrap();
        assert!(!coordinator.is_recording("dev-1").await);
    }

    #[tokio::test]
    async fn cascade_delete_removes_every_device_of_the_product() {
        let (coordinator, _bus) = harness().await;

        coordinator.protocols.set("proto-a".to_string(), protocol("proto-a"), Duration::from_secs(60)).await;
        let product = Product::new("prod-1", "proto-a");
        coordinator.metastore().create_product(&product).await.unwrap();
        coordinator.metastore().create_device(&Device::new("d1", "prod-1")).await.unwrap();
        coordinator.metastore().create_device(&Device::new("d2", "prod-1")).await.unwrap();

        coordinator.delete_product("prod-1").await.unwrap();

        assert!(coordinator.metastore().get_product("prod-1").await.is_err());
        assert!(coordinator.metastore().get_device("d1").await.is_err());
        assert!(coordinator.metastore().get_device("d2").await.is_err());
    }

    #[tokio::test]
    async fn create_product_rejects_an_unregistered_protocol() {
        let (coordinator, _bus) = harness().await;
        let err = coordinator.create_product("no-such-protocol", "prod-1").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn create_product_conflicts_on_a_duplicate_id() {
        let (coordinator, _bus) = harness().await;
        coordinator.protocols.set("proto-a".to_string(), protocol("proto-a"), Duration::from_secs(60)).await;

        coordinator.create_product("proto-a", "prod-1").await.unwrap();
        let err = coordinator.create_product("proto-a", "prod-1").await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }
}
