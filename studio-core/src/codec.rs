//! Boundary codec for values handed to an expression evaluator.
//!
//! The evaluator may run in an isolated context that only understands plain
//! JSON. Kinds JSON cannot express directly (`undefined`, non-finite numbers,
//! asset references) are written as tagged objects keyed by [`TAG_KEY`]. A
//! map that itself contains [`TAG_KEY`] is wrapped so it is never mistaken
//! for a tagged value.
//!
//! ```text
//! Undefined          -> {"$ws": "undefined"}
//! Number(NaN)        -> {"$ws": "number", "value": "NaN"}
//! Asset{id,name,url} -> {"$ws": "asset", "id": .., "name": .., "url": ..}
//! Map{"$ws": ..}     -> {"$ws": "map", "entries": {..}}
//! ```

use indexmap::IndexMap;
use serde_json::{Map, Number};
use thiserror::Error;

use crate::data_source::DataSourceId;
use crate::value::{AssetRef, Value};

/// Key marking a tagged object in the encoded form.
pub const TAG_KEY: &str = "$ws";

/// Variables keyed by data source id.
pub type VariablesMap = IndexMap<DataSourceId, Value>;

/// Errors decoding an encoded value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A tagged object carried a tag this codec does not know.
    #[error("Unknown value tag: {0}")]
    UnknownTag(String),
    /// A tagged object was missing a field or had the wrong shape.
    #[error("Malformed tagged value: {0}")]
    Malformed(String),
    /// The top level of an encoded variables map was not an object.
    #[error("Expected an object of variables, got {0}")]
    NotAnObject(String),
}

/// Encode a single value.
#[must_use]
pub fn encode_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Undefined => tagged("undefined", Map::new()),
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => match Number::from_f64(*n) {
            Some(number) => serde_json::Value::Number(number),
            None => {
                let mut fields = Map::new();
                fields.insert(
                    "value".to_string(),
                    serde_json::Value::String(non_finite_name(*n).to_string()),
                );
                tagged("number", fields)
            }
        },
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => serde_json::Value::Array(items.iter().map(encode_value).collect()),
        Value::Map(entries) => {
            let encoded: Map<String, serde_json::Value> = entries
                .iter()
                .map(|(k, v)| (k.clone(), encode_value(v)))
                .collect();
            if entries.contains_key(TAG_KEY) {
                let mut fields = Map::new();
                fields.insert("entries".to_string(), serde_json::Value::Object(encoded));
                tagged("map", fields)
            } else {
                serde_json::Value::Object(encoded)
            }
        }
        Value::Asset(asset) => {
            let mut fields = Map::new();
            fields.insert("id".to_string(), serde_json::Value::String(asset.id.clone()));
            fields.insert(
                "name".to_string(),
                serde_json::Value::String(asset.name.clone()),
            );
            if let Some(url) = &asset.url {
                fields.insert("url".to_string(), serde_json::Value::String(url.clone()));
            }
            tagged("asset", fields)
        }
    }
}

/// Decode a single value.
///
/// # Errors
///
/// Returns [`CodecError`] if a tagged object is unknown or malformed.
pub fn decode_value(encoded: &serde_json::Value) -> Result<Value, CodecError> {
    match encoded {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => n
            .as_f64()
            .map(Value::Number)
            .ok_or_else(|| CodecError::Malformed(format!("number {n}"))),
        serde_json::Value::String(s) => Ok(Value::String(s.clone())),
        serde_json::Value::Array(items) => items
            .iter()
            .map(decode_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        serde_json::Value::Object(fields) => match fields.get(TAG_KEY) {
            Some(tag) => decode_tagged(tag, fields),
            None => decode_entries(fields).map(Value::Map),
        },
    }
}

/// Encode a whole variables map into a JSON object.
#[must_use]
pub fn encode_values(values: &VariablesMap) -> serde_json::Value {
    serde_json::Value::Object(
        values
            .iter()
            .map(|(id, value)| (id.clone(), encode_value(value)))
            .collect(),
    )
}

/// Decode a JSON object back into a variables map.
///
/// # Errors
///
/// Returns [`CodecError::NotAnObject`] if `encoded` is not an object, or any
/// error from decoding an individual value.
pub fn decode_values(encoded: &serde_json::Value) -> Result<VariablesMap, CodecError> {
    match encoded {
        serde_json::Value::Object(fields) => decode_entries(fields),
        other => Err(CodecError::NotAnObject(json_kind(other).to_string())),
    }
}

fn decode_entries(fields: &Map<String, serde_json::Value>) -> Result<VariablesMap, CodecError> {
    fields
        .iter()
        .map(|(k, v)| decode_value(v).map(|value| (k.clone(), value)))
        .collect()
}

fn decode_tagged(
    tag: &serde_json::Value,
    fields: &Map<String, serde_json::Value>,
) -> Result<Value, CodecError> {
    let tag = tag
        .as_str()
        .ok_or_else(|| CodecError::Malformed(format!("tag {tag}")))?;
    match tag {
        "undefined" => Ok(Value::Undefined),
        "number" => match string_field(fields, "value")? {
            "NaN" => Ok(Value::Number(f64::NAN)),
            "Infinity" => Ok(Value::Number(f64::INFINITY)),
            "-Infinity" => Ok(Value::Number(f64::NEG_INFINITY)),
            other => Err(CodecError::Malformed(format!("number {other}"))),
        },
        "map" => match fields.get("entries") {
            Some(serde_json::Value::Object(entries)) => decode_entries(entries).map(Value::Map),
            _ => Err(CodecError::Malformed("map without entries".to_string())),
        },
        "asset" => {
            let mut asset = AssetRef::new(string_field(fields, "id")?, string_field(fields, "name")?);
            if let Some(url) = fields.get("url") {
                let url = url
                    .as_str()
                    .ok_or_else(|| CodecError::Malformed("asset url".to_string()))?;
                asset = asset.with_url(url);
            }
            Ok(Value::Asset(asset))
        }
        other => Err(CodecError::UnknownTag(other.to_string())),
    }
}

fn tagged(tag: &str, mut fields: Map<String, serde_json::Value>) -> serde_json::Value {
    fields.insert(TAG_KEY.to_string(), serde_json::Value::String(tag.to_string()));
    serde_json::Value::Object(fields)
}

fn string_field<'a>(
    fields: &'a Map<String, serde_json::Value>,
    name: &str,
) -> Result<&'a str, CodecError> {
    fields
        .get(name)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| CodecError::Malformed(format!("missing string field {name}")))
}

fn non_finite_name(n: f64) -> &'static str {
    if n.is_nan() {
        "NaN"
    } else if n.is_sign_positive() {
        "Infinity"
    } else {
        "-Infinity"
    }
}

/// Short name of a JSON value kind, for diagnostics.
#[must_use]
pub fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
