//! Cell values for run records and historical datasets.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single cell of a [`Dataset`](super::Dataset).
///
/// `Missing` stands for an absent observation: a JSON `null`, an empty CSV
/// field, or a column that a run did not expose at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Missing,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Returns true if the cell holds no observation.
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Numeric view of the value. Booleans count as 0/1; text and missing
    /// cells have no numeric value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Value::Missing | Value::Text(_) => None,
        }
    }

    /// Infers a value from a raw CSV field.
    ///
    /// Empty fields are missing; otherwise integer, float and boolean
    /// parses are tried in that order before falling back to text.
    pub fn parse_field(field: &str) -> Self {
        if field.is_empty() {
            return Value::Missing;
        }
        if let Ok(v) = field.parse::<i64>() {
            return Value::Int(v);
        }
        if let Ok(v) = field.parse::<f64>() {
            return Value::Float(v);
        }
        match field {
            "true" | "True" | "TRUE" => Value::Bool(true),
            "false" | "False" | "FALSE" => Value::Bool(false),
            _ => Value::Text(field.to_string()),
        }
    }

    /// Renders the value as a CSV field that [`Value::parse_field`] reads
    /// back as the same variant.
    pub fn to_field(&self) -> String {
        match self {
            Value::Missing => String::new(),
            Value::Bool(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            // Debug keeps the fractional part (`5.0`), so floats stay floats.
            Value::Float(v) => format!("{:?}", v),
            Value::Text(s) => s.clone(),
        }
    }

    /// Converts a JSON scalar into a cell. Arrays and objects are not
    /// scalars and yield `None`.
    pub fn from_json_scalar(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(Value::Missing),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => Some(match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            }),
            serde_json::Value::String(s) => Some(Value::Text(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => write!(f, "-"),
            other => write!(f, "{}", other.to_field()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Missing)
    }
}
