use crate::MetaStore;
use async_trait::async_trait;
use manager_api::types::{Device, Product};
use manager_api::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

const PRODUCTS_DIR: &str = "products";
const DEVICES_DIR: &str = "devices";

/// One JSON file per entity under `<root>/products/` and
/// `<root>/devices/`. Writes from this store always produce `.json`;
/// `list`/`get` will also load a `.yaml`/`.yml` file placed there by
/// hand, choosing the deserializer from the file extension.
pub struct FileMetaStore {
    root: PathBuf,
}

impl FileMetaStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let store = FileMetaStore { root };

        tokio::fs::create_dir_all(store.products_dir())
            .await
            .map_err(|e| Error::internal(format!("creating {}: {e}", store.products_dir().display())))?;
        tokio::fs::create_dir_all(store.devices_dir())
            .await
            .map_err(|e| Error::internal(format!("creating {}: {e}", store.devices_dir().display())))?;

        Ok(store)
    }

    fn products_dir(&self) -> PathBuf {
        self.root.join(PRODUCTS_DIR)
    }

    fn devices_dir(&self) -> PathBuf {
        self.root.join(DEVICES_DIR)
    }

    fn product_path(&self, id: &str) -> PathBuf {
        self.products_dir().join(format!("{id}.json"))
    }

    fn device_path(&self, id: &str) -> PathBuf {
        self.devices_dir().join(format!("{id}.json"))
    }

    async fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|_| Error::not_found(format!("no metadata file at {}", path.display())))?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(serde_json::from_slice(&data)?),
            Some("yaml") | Some("yml") => serde_yaml::from_slice(&data)
                .map_err(|e| Error::internal(format!("parsing {}: {e}", path.display()))),
            Some(ext) => Err(Error::internal(format!(
                "unsupported metadata file extension {ext:?} at {}",
                path.display()
            ))),
            None => Err(Error::internal(format!("metadata file has no extension: {}", path.display()))),
        }
    }

    async fn save<T: Serialize + Sync>(path: &Path, value: &T) -> Result<()> {
        let data = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(path, data)
            .await
            .map_err(|e| Error::internal(format!("writing {}: {e}", path.display())))
    }

    async fn remove(path: &Path) -> Result<()> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|_| Error::not_found(format!("no metadata file at {}", path.display())))
    }

    /// Walks `dir`, loading every recognized entity file and keeping
    /// the ones `keep` accepts. A file that fails to load aborts the
    /// whole listing, the same as the original's directory walk.
    async fn list<T: DeserializeOwned>(dir: &Path, keep: impl Fn(&T) -> bool) -> Result<Vec<T>> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| Error::internal(format!("reading {}: {e}", dir.display())))?;

        let mut out = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::internal(format!("reading {}: {e}", dir.display())))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| Error::internal(format!("stat {}: {e}", entry.path().display())))?;
            if !file_type.is_file() {
                continue;
            }

            let value: T = Self::load(&entry.path()).await?;
            if keep(&value) {
                out.push(value);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl MetaStore for FileMetaStore {
    async fn list_products(&self, protocol_id: &str) -> Result<Vec<Product>> {
        Self::list(&self.products_dir(), |p: &Product| p.protocol_id == protocol_id).await
    }

    async fn get_product(&self, product_id: &str) -> Result<Product> {
        Self::load(&self.product_path(product_id)).await
    }

    async fn create_product(&self, product: &Product) -> Result<()> {
        Self::save(&self.product_path(&product.id), product).await
    }

    async fn update_product(&self, product: &Product) -> Result<()> {
        Self::save(&self.product_path(&product.id), product).await
    }

    async fn delete_product(&self, product_id: &str) -> Result<()> {
        Self::remove(&self.product_path(product_id)).await
    }

    async fn list_devices(&self, product_id: &str) -> Result<Vec<Device>> {
        Self::list(&self.devices_dir(), |d: &Device| d.product_id == product_id).await
    }

    async fn get_device(&self, device_id: &str) -> Result<Device> {
        Self::load(&self.device_path(device_id)).await
    }

    async fn create_device(&self, device: &Device) -> Result<()> {
        Self::save(&self.device_path(&device.id), device).await
    }

    async fn update_device(&self, device: &Device) -> Result<()> {
        Self::save(&self.device_path(&device.id), device).await
    }

    async fn delete_device(&self, device_id: &str) -> Result<()> {
        Self::remove(&self.device_path(device_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static SEQ: AtomicU64 = AtomicU64::new(0);

    async fn temp_store() -> FileMetaStore {
        let n = SEQ.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("manager-metastore-test-{}-{n}", std::process::id()));
        FileMetaStore::open(dir).await.unwrap()
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = temp_store().await;
        let product = Product::new("prod-1", "proto-a");
        store.create_product(&product).await.unwrap();
        assert_eq!(store.get_product("prod-1").await.unwrap(), product);
    }

    #[tokio::test]
    async fn get_on_missing_id_fails() {
        let store = temp_store().await;
        assert!(store.get_product("does-not-exist").await.is_err());
    }

    #[tokio::test]
    async fn list_filters_by_protocol_id() {
        let store = temp_store().await;
        store.create_product(&Product::new("p1", "proto-a")).await.unwrap();
        store.create_product(&Product::new("p2", "proto-b")).await.unwrap();

        let listed = store.list_products("proto-a").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "p1");
    }

    #[tokio::test]
    async fn delete_removes_the_file() {
        let store = temp_store().await;
        store.create_device(&Device::new("d1", "p1")).await.unwrap();
        store.delete_device("d1").await.unwrap();
        assert!(store.get_device("d1").await.is_err());
    }

    #[tokio::test]
    async fn list_loads_hand_placed_yaml_files() {
        let store = temp_store().await;
        let product = Product::new("p-yaml", "proto-a");
        let yaml = serde_yaml::to_string(&product).unwrap();
        tokio::fs::write(store.products_dir().join("p-yaml.yaml"), yaml)
            .await
            .unwrap();

        let listed = store.list_products("proto-a").await.unwrap();
        assert_eq!(listed.into_iter().next().unwrap().id, "p-yaml");
    }
}
