//! The fundamental data-model types shared across every crate in the
//! workspace: protocols, products, devices, and the schema/record
//! shapes the datastore consumes.

pub mod device;
pub mod product;
pub mod protocol;
pub mod schema;

pub use device::{Device, DeviceData, DeviceDataMap, DeviceState, FieldType, Value};
pub use product::{Product, Property, ReportMode};
pub use protocol::{DeviceStatus, DriverStatus, Protocol};
pub use schema::{DeviceDataRecord, DeviceDataSchema};
