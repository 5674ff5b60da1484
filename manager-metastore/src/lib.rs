//! The metadata store (spec §4.3): CRUD over products and devices,
//! with a file-backed reference implementation grounded in the
//! original manager's one-file-per-entity layout.

mod file;

pub use file::FileMetaStore;

use async_trait::async_trait;
use manager_api::types::{Device, Product};
use manager_api::Result;

/// CRUD over the manager's two metadata entities. `create_*` does not
/// check for duplicates — callers enforce uniqueness by calling
/// `get_*` first and treating its absence of error as a conflict, the
/// same division of responsibility the coordinator (C7) uses.
#[async_trait]
pub trait MetaStore: Send + Sync {
    async fn list_products(&self, protocol_id: &str) -> Result<Vec<Product>>;
    async fn get_product(&self, product_id: &str) -> Result<Product>;
    async fn create_product(&self, product: &Product) -> Result<()>;
    async fn update_product(&self, product: &Product) -> Result<()>;
    async fn delete_product(&self, product_id: &str) -> Result<()>;

    async fn list_devices(&self, product_id: &str) -> Result<Vec<Device>>;
    async fn get_device(&self, device_id: &str) -> Result<Device>;
    async fn create_device(&self, device: &Device) -> Result<()>;
    async fn update_device(&self, device: &Device) -> Result<()>;
    async fn delete_device(&self, device_id: &str) -> Result<()>;
}
