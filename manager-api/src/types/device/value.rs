use crate::Error;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;

/// The field types a product property can declare. Values carried at
/// runtime (`Value`) are tagged with one of these so drivers and the
/// datastore agree on how to interpret a reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Bool,
    Int,
    Uint,
    Float,
    String,
}

/// A value carried by a device property. Drivers report readings in
/// this type; `PUT`/`POST` request bodies deserialize into it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Flt(f64),
    Str(String),
}

impl Value {
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::Bool(_) => FieldType::Bool,
            Value::Int(_) => FieldType::Int,
            Value::Uint(_) => FieldType::Uint,
            Value::Flt(_) => FieldType::Float,
            Value::Str(_) => FieldType::String,
        }
    }

    /// Returns the value as `f64` if it is numeric. Used by the
    /// datastore's field serialization, which treats every numeric
    /// kind uniformly.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Uint(v) => Some(*v as f64),
            Value::Flt(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Uint(v) => write!(f, "{v}"),
            Value::Flt(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "\"{v}\""),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl TryFrom<Value> for bool {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bool(v) => Ok(v),
            _ => Err(Error::bad_request("expected a bool value")),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl TryFrom<Value> for i64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Int(v) => Ok(v),
            _ => Err(Error::bad_request("expected an int value")),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Flt(v)
    }
}

impl TryFrom<Value> for f64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Flt(v) => Ok(v),
            Value::Int(v) => Ok(v as f64),
            Value::Uint(v) => Ok(v as f64),
            _ => Err(Error::bad_request("expected a numeric value")),
        }
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl TryFrom<Value> for String {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Str(v) => Ok(v),
            _ => Err(Error::bad_request("expected a string value")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_strings() {
        assert_eq!(Value::Str("hi".into()).to_string(), "\"hi\"");
        assert_eq!(Value::Bool(true).to_string(), "true");
    }

    #[test]
    fn numeric_coercion_widens_int_and_uint_to_float() {
        assert_eq!(f64::try_from(Value::Int(5)).unwrap(), 5.0);
        assert_eq!(f64::try_from(Value::Uint(5)).unwrap(), 5.0);
        assert!(f64::try_from(Value::Str("x".into())).is_err());
    }
}
