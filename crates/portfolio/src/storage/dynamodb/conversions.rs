//! DynamoDB attribute conversion functions.
//!
//! Pure functions for converting between DynamoDB AttributeValue maps and
//! store records. These are testable in isolation without DynamoDB access.

use std::collections::{BTreeMap, HashMap};

use aws_sdk_dynamodb::types::AttributeValue;
use portfolio_core::storage::{keys, Record, RecordKey, RepositoryError, StartKey};
use serde_json::{Map, Number, Value};

pub type Item = HashMap<String, AttributeValue>;

// ============================================================================
// Values
// ============================================================================

/// Convert a JSON value to an AttributeValue.
pub fn to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(values) => AttributeValue::L(values.iter().map(to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(name, value)| (name.clone(), to_attribute(value)))
                .collect(),
        ),
    }
}

/// Convert an AttributeValue to a JSON value.
pub fn from_attribute(attribute: &AttributeValue) -> Result<Value, RepositoryError> {
    Ok(match attribute {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => Value::Number(parse_number(n)?),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::L(values) => Value::Array(
            values
                .iter()
                .map(from_attribute)
                .collect::<Result<_, _>>()?,
        ),
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(name, value)| Ok((name.clone(), from_attribute(value)?)))
                .collect::<Result<Map<_, _>, RepositoryError>>()?,
        ),
        AttributeValue::Ss(values) => {
            Value::Array(values.iter().cloned().map(Value::String).collect())
        }
        AttributeValue::Ns(values) => Value::Array(
            values
                .iter()
                .map(|n| parse_number(n).map(Value::Number))
                .collect::<Result<_, _>>()?,
        ),
        other => {
            return Err(RepositoryError::InvalidData(format!(
                "Unsupported attribute type: {:?}",
                other
            )))
        }
    })
}

fn parse_number(n: &str) -> Result<Number, RepositoryError> {
    if let Ok(int) = n.parse::<i64>() {
        return Ok(Number::from(int));
    }
    n.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| RepositoryError::InvalidData(format!("Invalid number: {n}")))
}

// ============================================================================
// Records
// ============================================================================

/// Convert a record to a DynamoDB item, keys included.
pub fn record_to_item(record: &Record) -> Item {
    let mut item: Item = record
        .attributes
        .iter()
        .map(|(name, value)| (name.clone(), to_attribute(value)))
        .collect();
    item.insert(
        keys::PK.to_string(),
        AttributeValue::S(record.key.pk.clone()),
    );
    item.insert(
        keys::SK.to_string(),
        AttributeValue::S(record.key.sk.clone()),
    );
    item
}

/// Convert a DynamoDB item to a record.
pub fn item_to_record(item: &Item) -> Result<Record, RepositoryError> {
    let key = RecordKey::new(get_string(item, keys::PK)?, get_string(item, keys::SK)?);
    let attributes = item
        .iter()
        .filter(|(name, _)| name.as_str() != keys::PK && name.as_str() != keys::SK)
        .map(|(name, value)| Ok((name.clone(), from_attribute(value)?)))
        .collect::<Result<Map<_, _>, RepositoryError>>()?;
    Ok(Record { key, attributes })
}

/// Convert a record key to a DynamoDB key map.
pub fn key_to_item(key: &RecordKey) -> Item {
    HashMap::from([
        (keys::PK.to_string(), AttributeValue::S(key.pk.clone())),
        (keys::SK.to_string(), AttributeValue::S(key.sk.clone())),
    ])
}

/// Convert a start key to an `ExclusiveStartKey`.
pub fn start_key_to_item(start: &StartKey) -> Item {
    start
        .0
        .iter()
        .map(|(name, value)| (name.clone(), AttributeValue::S(value.clone())))
        .collect()
}

/// Convert a `LastEvaluatedKey` to a start key.
pub fn item_to_start_key(item: &Item) -> Result<StartKey, RepositoryError> {
    item.iter()
        .map(|(name, value)| match value {
            AttributeValue::S(s) => Ok((name.clone(), s.clone())),
            other => Err(RepositoryError::InvalidData(format!(
                "Non-string key attribute {name}: {other:?}"
            ))),
        })
        .collect::<Result<BTreeMap<_, _>, _>>()
        .map(StartKey)
}

// ============================================================================
// Helper functions
// ============================================================================

fn get_string(item: &Item, key: &str) -> Result<String, RepositoryError> {
    item.get(key)
        .and_then(|v| v.as_s().ok())
        .cloned()
        .ok_or_else(|| RepositoryError::InvalidData(format!("Missing or invalid field: {key}")))
}
