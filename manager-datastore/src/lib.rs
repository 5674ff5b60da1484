pub mod executor;
pub mod export;
pub mod influxdb;
pub mod store;
pub mod tdengine;

pub use executor::Executor;
pub use export::ExportFormat;
pub use influxdb::{InfluxDbConfig, InfluxDbExecutor};
pub use store::TimeSeriesStore;
pub use tdengine::{TDengineConfig, TDengineExecutor};
