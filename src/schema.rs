//! The schema module builds the record description that drives extraction
//! from a plain list of user-declared field names.

use serde_json::{Map, Value, json};
use std::collections::HashSet;

use crate::constants::{ALL_FIELDS_DESCRIPTION, CONTAINER_KEY, CONTAINER_NAME, RECORD_NAME};
use crate::error::SchemaError;

/// One extracted record, keyed by field name.
pub type Record = Map<String, Value>;

/// Data-driven description of the records to extract.
///
/// Every declared field is optional text. An empty field list means
/// "extract everything" and leaves record keys unconstrained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractionSchema {
    fields: Vec<String>,
}

/// Builds an extraction schema from the user-declared field names.
///
/// Names are trimmed and keep their input order.
///
/// # Errors
///
/// Returns an error if:
/// * A name is empty after trimming
/// * A name is declared twice
pub fn build_schema<I, S>(field_names: I) -> Result<ExtractionSchema, SchemaError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut fields = Vec::new();

    for name in field_names {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return Err(SchemaError::EmptyFieldName);
        }
        if !seen.insert(name.to_string()) {
            return Err(SchemaError::DuplicateField(name.to_string()));
        }
        fields.push(name.to_string());
    }

    Ok(ExtractionSchema { fields })
}

impl ExtractionSchema {
    /// Declared fields in input order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn is_unconstrained(&self) -> bool {
        self.fields.is_empty()
    }

    /// JSON schema of a single record.
    pub fn record_schema(&self) -> Value {
        if self.is_unconstrained() {
            return json!({
                "title": RECORD_NAME,
                "type": "object",
                "additionalProperties": true,
            });
        }

        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|field| (field.clone(), json!({ "type": ["string", "null"] })))
            .collect();

        json!({
            "title": RECORD_NAME,
            "type": "object",
            "properties": properties,
            "required": self.fields,
            "additionalProperties": false,
        })
    }

    /// JSON schema of the container wrapping the ordered record sequence.
    /// This is the target type of every extraction call.
    pub fn container_schema(&self) -> Value {
        json!({
            "title": CONTAINER_NAME,
            "type": "object",
            "properties": {
                CONTAINER_KEY: {
                    "type": "array",
                    "items": self.record_schema(),
                }
            },
            "required": [CONTAINER_KEY],
            "additionalProperties": false,
        })
    }

    /// Human readable field list for prompts.
    pub fn describe_fields(&self) -> String {
        if self.is_unconstrained() {
            ALL_FIELDS_DESCRIPTION.to_string()
        } else {
            self.fields.join(", ")
        }
    }

    /// Wraps records into a container value.
    pub fn container(&self, records: Vec<Record>) -> Value {
        let mut container = Map::new();
        container.insert(
            CONTAINER_KEY.to_string(),
            Value::Array(records.into_iter().map(Value::Object).collect()),
        );
        Value::Object(container)
    }

    /// Projects a raw record onto the schema.
    ///
    /// Constrained schemas keep exactly the declared fields in order: missing
    /// fields become `null`, unknown keys are dropped and every value is coerced
    /// to optional text. Unconstrained schemas keep the record as is.
    ///
    /// Returns `None` if the value is not an object.
    pub fn conform(&self, raw: Value) -> Option<Record> {
        let Value::Object(mut raw) = raw else {
            return None;
        };

        if self.is_unconstrained() {
            return Some(raw);
        }

        Some(
            self.fields
                .iter()
                .map(|field| {
                    let value = raw.remove(field).map(to_text).unwrap_or(Value::Null);
                    (field.clone(), value)
                })
                .collect(),
        )
    }
}

/// Coerces any JSON value to optional text.
fn to_text(value: Value) -> Value {
    match value {
        Value::Null | Value::String(_) => value,
        Value::Bool(flag) => Value::String(flag.to_string()),
        Value::Number(number) => Value::String(number.to_string()),
        nested @ (Value::Array(_) | Value::Object(_)) => Value::String(nested.to_string()),
    }
}
