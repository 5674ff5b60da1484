//! The back-end contract (spec §4.2): a type that knows how to talk
//! to one concrete time-series database. [`crate::store::TimeSeriesStore`]
//! wraps an `Executor` with the write-batching channel and export
//! format conversion that are the same regardless of back-end.

use async_trait::async_trait;
use manager_api::query::{Request, Response};
use manager_api::types::schema::DeviceDataSchema;
use manager_api::types::DeviceDataRecord;
use manager_api::Result;

#[async_trait]
pub trait Executor: Send + Sync {
    async fn connect(&self) -> Result<()>;
    async fn close(&self) -> Result<()>;
    async fn create_db(&self) -> Result<()>;
    async fn use_db(&self) -> Result<()>;
    async fn create_table(&self, schema: &DeviceDataSchema) -> Result<()>;

    /// Issues one back-end-native batch write. Called by the store's
    /// consumer task with everything it drained from the write
    /// channel in a single wakeup — never called per-record.
    async fn write(&self, records: &[DeviceDataRecord]) -> Result<()>;

    async fn query(&self, req: &Request) -> Result<Response>;
}
