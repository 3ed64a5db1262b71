use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single resolved flag value as delivered by the flags endpoint.
///
/// `Null` marks a flag the server knows about but could not resolve; the
/// merge step treats it as "fill in from defaults".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum FlagValue {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    /// Structured values are passed through untouched.
    Json(Value),
    Null,
}

/// Mapping from flag key to value. Ordered so serialization is stable.
pub type FlagSet = BTreeMap<String, FlagValue>;

impl FlagValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FlagValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FlagValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FlagValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FlagValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }
}

impl From<Value> for FlagValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FlagValue::Null,
            Value::Bool(b) => FlagValue::Bool(b),
            Value::Number(n) => FlagValue::Number(n),
            Value::String(s) => FlagValue::String(s),
            other => FlagValue::Json(other),
        }
    }
}

impl From<FlagValue> for Value {
    fn from(value: FlagValue) -> Self {
        match value {
            FlagValue::Null => Value::Null,
            FlagValue::Bool(b) => Value::Bool(b),
            FlagValue::Number(n) => Value::Number(n),
            FlagValue::String(s) => Value::String(s),
            FlagValue::Json(v) => v,
        }
    }
}

impl From<bool> for FlagValue {
    fn from(b: bool) -> Self {
        FlagValue::Bool(b)
    }
}

impl From<&str> for FlagValue {
    fn from(s: &str) -> Self {
        FlagValue::String(s.to_string())
    }
}

impl From<String> for FlagValue {
    fn from(s: String) -> Self {
        FlagValue::String(s)
    }
}

impl From<i64> for FlagValue {
    fn from(n: i64) -> Self {
        FlagValue::Number(n.into())
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::Bool(b) => write!(f, "{}", b),
            FlagValue::Number(n) => write!(f, "{}", n),
            FlagValue::String(s) => write!(f, "{}", s),
            FlagValue::Json(v) => write!(f, "{}", v),
            FlagValue::Null => write!(f, "null"),
        }
    }
}

/// Parses a response body into a flag set. Anything that is not a JSON
/// object yields `None`.
pub fn parse_flag_set(body: &[u8]) -> Option<FlagSet> {
    match serde_json::from_slice::<Value>(body).ok()? {
        Value::Object(map) => Some(
            map.into_iter()
                .map(|(k, v)| (k, FlagValue::from(v)))
                .collect(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_primitive_values() {
        let flags = parse_flag_set(br#"{"dog": true, "size": "large", "limit": 5, "gone": null}"#)
            .unwrap();
        assert_eq!(flags["dog"], FlagValue::Bool(true));
        assert_eq!(flags["size"].as_str(), Some("large"));
        assert_eq!(flags["limit"].as_f64(), Some(5.0));
        assert!(flags["gone"].is_null());
    }

    #[test]
    fn test_parse_structured_value_is_kept() {
        let flags = parse_flag_set(br#"{"cfg": {"timeout": 30}}"#).unwrap();
        assert!(matches!(flags["cfg"], FlagValue::Json(_)));
    }

    #[test]
    fn test_parse_rejects_non_objects() {
        assert!(parse_flag_set(b"[1, 2]").is_none());
        assert!(parse_flag_set(b"null").is_none());
        assert!(parse_flag_set(b"\"dog\"").is_none());
        assert!(parse_flag_set(b"<html>").is_none());
    }

    #[test]
    fn test_serialize_through_json_value() {
        let mut flags = FlagSet::new();
        flags.insert("b".into(), FlagValue::Null);
        flags.insert("a".into(), 3i64.into());
        assert_eq!(serde_json::to_string(&flags).unwrap(), r#"{"a":3,"b":null}"#);
    }
}
