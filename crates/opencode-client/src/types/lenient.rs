//! Forgiving field decoders for server payloads.
//!
//! Every function here accepts any JSON value and falls back to a default
//! instead of failing, so a payload with an unexpected shape still decodes.
//! Use them with `#[serde(default, deserialize_with = "...")]`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        // Objects and arrays keep their JSON text
        other => Some(other.to_string()),
    }
}

pub(crate) fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|u| i64::try_from(u).unwrap_or(i64::MAX)))
            .or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

pub(crate) fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub(crate) fn value_to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

fn to_count(value: &Value) -> Option<u32> {
    value_to_i64(value).map(|n| n.clamp(0, i64::from(u32::MAX)) as u32)
}

pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(value_to_string(&value).unwrap_or_default())
}

pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(value_to_string(&value))
}

pub fn int<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(value_to_i64(&value).unwrap_or(0))
}

pub fn opt_int<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(value_to_i64(&value))
}

pub fn count<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(to_count(&value).unwrap_or(0))
}

pub fn opt_count<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(to_count(&value))
}

pub fn opt_float<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(value_to_f64(&value))
}

pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(value_to_bool(&value).unwrap_or(false))
}

pub fn opt_flag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(value_to_bool(&value))
}

pub fn object<'de, D: Deserializer<'de>>(d: D) -> Result<Map<String, Value>, D::Error> {
    match Value::deserialize(d)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

pub fn opt_object<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<Map<String, Value>>, D::Error> {
    match Value::deserialize(d)? {
        Value::Object(map) => Ok(Some(map)),
        _ => Ok(None),
    }
}

/// Nested object that is absent, null or malformed becomes `None`
pub fn opt_struct<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(d)?;
    if !value.is_object() {
        return Ok(None);
    }
    Ok(serde_json::from_value(value).ok())
}

/// Nested object that must exist; malformed input falls back to the default
pub fn struct_or_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(d)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Array whose undecodable elements are skipped; a non-array is empty
pub fn list<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(decode_list(Value::deserialize(d)?))
}

pub fn opt_list<'de, D, T>(d: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(d)? {
        value @ Value::Array(_) => Ok(Some(decode_list(value))),
        _ => Ok(None),
    }
}

pub fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    match Value::deserialize(d)? {
        Value::Array(items) => Ok(items.iter().filter_map(value_to_string).collect()),
        _ => Ok(Vec::new()),
    }
}

pub fn opt_string_list<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<Vec<String>>, D::Error> {
    match Value::deserialize(d)? {
        Value::Array(items) => Ok(Some(items.iter().filter_map(value_to_string).collect())),
        _ => Ok(None),
    }
}

pub fn string_map<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<BTreeMap<String, String>, D::Error> {
    match Value::deserialize(d)? {
        Value::Object(map) => Ok(map
            .iter()
            .filter_map(|(k, v)| value_to_string(v).map(|s| (k.clone(), s)))
            .collect()),
        _ => Ok(BTreeMap::new()),
    }
}

/// Decode a list payload, skipping elements that do not decode
pub fn decode_list<T: DeserializeOwned>(value: Value) -> Vec<T> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(decoded) => Some(decoded),
                Err(e) => {
                    tracing::debug!("Skipping undecodable list element: {}", e);
                    None
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Decode an object payload; anything else yields the default
pub fn decode_object<T: DeserializeOwned + Default>(value: Value) -> T {
    if !value.is_object() {
        return T::default();
    }
    serde_json::from_value(value).unwrap_or_else(|e| {
        tracing::debug!("Falling back to defaults for undecodable object: {}", e);
        T::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_coercion() {
        assert_eq!(value_to_string(&json!("a")), Some("a".to_string()));
        assert_eq!(value_to_string(&json!(12)), Some("12".to_string()));
        assert_eq!(value_to_string(&json!(true)), Some("true".to_string()));
        assert_eq!(value_to_string(&json!({"k": 1})), Some(r#"{"k":1}"#.to_string()));
        assert_eq!(value_to_string(&Value::Null), None);
    }

    #[test]
    fn test_int_coercion() {
        assert_eq!(value_to_i64(&json!(42)), Some(42));
        assert_eq!(value_to_i64(&json!(42.9)), Some(42));
        assert_eq!(value_to_i64(&json!(" 17 ")), Some(17));
        assert_eq!(value_to_i64(&json!("nope")), None);
        assert_eq!(value_to_i64(&json!([1])), None);
    }

    #[test]
    fn test_count_clamps_negative() {
        assert_eq!(to_count(&json!(-5)), Some(0));
        assert_eq!(to_count(&json!(7)), Some(7));
    }

    #[test]
    fn test_decode_list_skips_bad_elements() {
        let decoded: Vec<u32> = decode_list(json!([1, "x", 3]));
        assert_eq!(decoded, vec![1, 3]);

        let empty: Vec<u32> = decode_list(json!({"not": "a list"}));
        assert!(empty.is_empty());
    }
}
