use super::device::{now_ns, DeviceDataMap};
use super::product::Property;
use std::collections::HashMap;

/// Implicit tags stamped on every telemetry record (spec §3).
pub const TAG_PROTOCOL: &str = "protocol";
pub const TAG_PRODUCT: &str = "product";
pub const TAG_DEVICE: &str = "device";

/// A derivation of a product's schema for one device, used to create
/// back-end tables/measurements.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceDataSchema {
    pub protocol_id: String,
    pub product_id: String,
    pub device_id: String,
    pub properties: Vec<Property>,
}

impl DeviceDataSchema {
    /// The logical grouping of time-series rows for a product across
    /// its devices (InfluxDB measurement / TDengine super-table).
    pub fn aggregated_table_name(&self) -> String {
        format!("{}_{}", self.protocol_id, self.product_id)
    }

    /// Per-device physical storage, for back-ends that support it
    /// (TDengine child table; no InfluxDB equivalent).
    pub fn table_name(&self) -> String {
        format!("{}_{}_{}", self.protocol_id, self.product_id, self.device_id)
    }
}

/// A schema-identified row ready to hand to a back-end executor.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceDataRecord {
    pub protocol_id: String,
    pub product_id: String,
    pub device_id: String,
    pub properties: DeviceDataMap,
}

impl DeviceDataRecord {
    pub fn aggregated_table_name(&self) -> String {
        format!("{}_{}", self.protocol_id, self.product_id)
    }

    pub fn table_name(&self) -> String {
        format!("{}_{}_{}", self.protocol_id, self.product_id, self.device_id)
    }

    pub fn tags(&self) -> HashMap<&'static str, String> {
        let mut tags = HashMap::new();
        tags.insert(TAG_PROTOCOL, self.protocol_id.clone());
        tags.insert(TAG_PRODUCT, self.product_id.clone());
        tags.insert(TAG_DEVICE, self.device_id.clone());
        tags
    }

    pub fn fields(&self) -> HashMap<String, super::device::Value> {
        self.properties
            .values()
            .map(|d| (d.name.clone(), d.value.clone()))
            .collect()
    }

    /// The record's timestamp: the earliest non-zero property
    /// timestamp if one is present, otherwise wall-clock (spec §3).
    pub fn timestamp_ns(&self) -> i64 {
        self.properties
            .values()
            .map(|d| d.ts)
            .filter(|&ts| ts != 0)
            .min()
            .unwrap_or_else(now_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::device::{DeviceData, Value};

    fn record(props: DeviceDataMap) -> DeviceDataRecord {
        DeviceDataRecord {
            protocol_id: "proto-a".into(),
            product_id: "prod-1".into(),
            device_id: "dev-1".into(),
            properties: props,
        }
    }

    #[test]
    fn table_names_derive_from_ids() {
        let r = record(DeviceDataMap::new());
        assert_eq!(r.aggregated_table_name(), "proto-a_prod-1");
        assert_eq!(r.table_name(), "proto-a_prod-1_dev-1");
    }

    #[test]
    fn timestamp_picks_earliest_nonzero_reading() {
        let mut props = DeviceDataMap::new();
        props.insert(
            "a".into(),
            DeviceData {
                name: "a".into(),
                field_type: crate::types::device::FieldType::Int,
                value: Value::Int(1),
                ts: 500,
            },
        );
        props.insert(
            "b".into(),
            DeviceData {
                name: "b".into(),
                field_type: crate::types::device::FieldType::Int,
                value: Value::Int(2),
                ts: 100,
            },
        );
        props.insert(
            "c".into(),
            DeviceData {
                name: "c".into(),
                field_type: crate::types::device::FieldType::Int,
                value: Value::Int(3),
                ts: 0,
            },
        );

        assert_eq!(record(props).timestamp_ns(), 100);
    }

    #[test]
    fn timestamp_falls_back_to_wall_clock_when_all_zero() {
        let mut props = DeviceDataMap::new();
        props.insert(
            "a".into(),
            DeviceData {
                name: "a".into(),
                field_type: crate::types::device::FieldType::Int,
                value: Value::Int(1),
                ts: 0,
            },
        );
        assert!(record(props).timestamp_ns() > 0);
    }
}
