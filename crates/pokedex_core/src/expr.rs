//! Builders for the store's native filter/update documents.
//!
//! Only the operator set the repository relies on is covered: equality
//! filters, `$set` merges, positional `$set` on a matched array element and
//! `$pull` removals. Anything else is passed through as a raw document.

use crate::connection::{ConnectionError, ConnectionResult};
use crate::store::Document;
use serde_json::Value;

/// `{ field: value }`
pub fn eq(field: &str, value: impl Into<Value>) -> Document {
    let mut filter = Document::new();
    filter.insert(field.to_string(), value.into());
    filter
}

/// Adds another equality condition to `filter`.
pub fn and_eq(mut filter: Document, field: &str, value: impl Into<Value>) -> Document {
    filter.insert(field.to_string(), value.into());
    filter
}

/// `{ "$set": values }`
pub fn set(values: Document) -> Document {
    wrap("$set", Value::Object(values))
}

/// `{ "$set": { "<array_field>.$.<key>": value, ... } }`
///
/// Targets the array element matched by the accompanying filter.
pub fn positional_set(array_field: &str, values: &Document) -> Document {
    let fields = values
        .iter()
        .map(|(key, value)| (format!("{array_field}.$.{key}"), value.clone()))
        .collect();
    set(fields)
}

/// `{ "$pull": { array_field: condition } }`
pub fn pull(array_field: &str, condition: impl Into<Value>) -> Document {
    wrap("$pull", Value::Object(eq(array_field, condition)))
}

/// Parses operator-provided JSON text into a filter/update document.
pub fn parse_document(text: &str) -> ConnectionResult<Document> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Document::new());
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(other) => Err(ConnectionError::InvalidInput(format!(
            "expected a JSON object, got {}",
            value_kind(&other)
        ))),
        Err(err) => Err(ConnectionError::InvalidInput(format!("invalid JSON: {err}"))),
    }
}

/// Human-readable JSON type name used in input errors.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn wrap(operator: &str, operand: Value) -> Document {
    let mut document = Document::new();
    document.insert(operator.to_string(), operand);
    document
}
