//! Device samples
//!
//! A sample is the untyped key/value reading a device sends. Values are
//! restricted to scalars; anything nested is rejected up front so the
//! encoder never has to guess how to flatten it.

use crate::encoder::{DEVICE_ID_COLUMN, SERVER_TIME_COLUMN};
use crate::error::{Error, Result};
use serde_json::{Number, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Maximum accepted device ID length
const MAX_DEVICE_ID_LEN: usize = 128;

/// Scalar value carried by a sample field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Explicit JSON null, rendered like a missing field
    Null,
    Bool(bool),
    /// Integer or float, kept in its JSON form so rendering is stable
    Number(Number),
    Text(String),
}

impl FieldValue {
    /// Convert a JSON value into a scalar field value
    pub fn from_json(field: &str, value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(FieldValue::Null),
            Value::Bool(b) => Ok(FieldValue::Bool(b)),
            Value::Number(n) => Ok(FieldValue::Number(n)),
            Value::String(s) => Ok(FieldValue::Text(s)),
            Value::Array(_) | Value::Object(_) => Err(Error::InvalidPayload(format!(
                "field '{}' must be a scalar (string, number, boolean or null)",
                field
            ))),
        }
    }

    /// Render the value as CSV cell text
    pub fn render(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value.into())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        // NaN and infinities have no JSON form
        Number::from_f64(value)
            .map(FieldValue::Number)
            .unwrap_or(FieldValue::Null)
    }
}

/// One device reading: field name -> scalar value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    fields: BTreeMap<String, FieldValue>,
}

impl Sample {
    /// Create an empty sample
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field (builder style)
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Parse a JSON object into a sample
    ///
    /// Field names must be non-empty and must not shadow the header columns
    /// the encoder adds itself.
    pub fn from_json(value: Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(Error::InvalidPayload(
                "each sample must be a JSON object".to_string(),
            ));
        };

        let mut fields = BTreeMap::new();
        for (name, value) in map {
            validate_field_name(&name)?;
            let value = FieldValue::from_json(&name, value)?;
            fields.insert(name, value);
        }

        Ok(Self { fields })
    }

    /// Look up a field value
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Field names in lexicographic order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Derive a column schema from a batch: the sorted union of all field names
    pub fn candidate_schema(samples: &[Sample]) -> Vec<String> {
        samples
            .iter()
            .flat_map(|s| s.fields.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

fn validate_field_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidPayload(
            "field names cannot be empty".to_string(),
        ));
    }

    if name == SERVER_TIME_COLUMN || name == DEVICE_ID_COLUMN {
        return Err(Error::InvalidPayload(format!(
            "field name '{}' is reserved",
            name
        )));
    }

    Ok(())
}

/// Validate a device ID so it can be used verbatim as a file name
///
/// Only alphanumeric, dash and underscore are allowed.
pub fn validate_device_id(device_id: &str) -> Result<()> {
    if device_id.is_empty() || device_id.len() > MAX_DEVICE_ID_LEN {
        return Err(Error::InvalidPayload(format!(
            "device_id must be 1-{} characters",
            MAX_DEVICE_ID_LEN
        )));
    }

    if !device_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::InvalidPayload(format!(
            "Invalid device_id '{}': only alphanumeric, dash, and underscore allowed",
            device_id
        )));
    }

    Ok(())
}
