use super::device::FieldType;
use serde::{Deserialize, Serialize};

/// How often a property is expected to report. Purely descriptive —
/// the manager doesn't enforce a cadence, but the datastore and HTTP
/// surface pass it through for downstream tooling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportMode {
    /// The driver pushes a reading whenever the value changes.
    Change,
    /// The driver pushes a reading on a fixed interval.
    Interval,
}

/// One property of a product's schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: String,
    pub name: String,
    pub field_type: FieldType,
    pub report_mode: ReportMode,
}

/// A schema shared by a family of devices, bound to one protocol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub protocol_id: String,
    #[serde(default)]
    pub properties: Vec<Property>,
}

impl Product {
    /// Builds a product with the `name = id` default from spec §4.6's
    /// `CreateProduct`.
    pub fn new(id: impl Into<String>, protocol_id: impl Into<String>) -> Self {
        let id = id.into();
        Product {
            name: id.clone(),
            id,
            protocol_id: protocol_id.into(),
            properties: Vec::new(),
        }
    }

    /// Property ids must be unique within a product (spec §3
    /// invariant). Returns the first duplicate id found, if any.
    pub fn duplicate_property_id(&self) -> Option<&str> {
        let mut seen = std::collections::HashSet::new();
        for p in &self.properties {
            if !seen.insert(p.id.as_str()) {
                return Some(p.id.as_str());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_duplicate_property_ids() {
        let mut product = Product::new("p1", "proto-a");
        product.properties.push(Property {
            id: "temp".into(),
            name: "Temperature".into(),
            field_type: FieldType::Float,
            report_mode: ReportMode::Change,
        });
        product.properties.push(Property {
            id: "temp".into(),
            name: "Temperature (dup)".into(),
            field_type: FieldType::Float,
            report_mode: ReportMode::Change,
        });

        assert_eq!(product.duplicate_property_id(), Some("temp"));
    }
}
