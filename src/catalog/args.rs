//! Typed access to a tool call's JSON arguments
//!
//! Absent keys and explicit `null` are treated alike. A value of the wrong
//! JSON type is an invalid-argument error naming the key.

use serde_json::{Map, Value};

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Default)]
pub struct Args(Map<String, Value>);

impl Args {
    /// Wrap the `arguments` member of a call; `null` means no arguments
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => Ok(Self(map)),
            other => Err(BridgeError::invalid(format!(
                "Arguments must be an object, got {}",
                type_name(&other)
            ))),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn str(&self, key: &str) -> Result<Option<&str>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(wrong_type(key, "a string", other)),
        }
    }

    pub fn required_str(&self, key: &str) -> Result<&str> {
        self.str(key)?.ok_or_else(|| missing(key))
    }

    /// Non-negative integer; numeric strings are accepted
    pub fn u64(&self, key: &str) -> Result<Option<u64>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(Some)
                .ok_or_else(|| {
                    wrong_type(key, "a non-negative integer", &Value::Number(n.clone()))
                }),
            Some(Value::String(s)) => s
                .trim()
                .parse::<u64>()
                .map(Some)
                .map_err(|_| wrong_type(key, "a non-negative integer", &Value::String(s.clone()))),
            Some(other) => Err(wrong_type(key, "a non-negative integer", other)),
        }
    }

    pub fn u32(&self, key: &str) -> Result<Option<u32>> {
        match self.u64(key)? {
            None => Ok(None),
            Some(n) => u32::try_from(n)
                .map(Some)
                .map_err(|_| BridgeError::invalid(format!("'{key}' is out of range: {n}"))),
        }
    }

    pub fn required_u32(&self, key: &str) -> Result<u32> {
        self.u32(key)?.ok_or_else(|| missing(key))
    }

    pub fn object(&self, key: &str) -> Result<Option<&Map<String, Value>>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(other) => Err(wrong_type(key, "an object", other)),
        }
    }

    /// A list of strings; a single comma-separated string is split
    pub fn str_list(&self, key: &str) -> Result<Option<Vec<String>>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(
                s.split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(str::to_string)
                    .collect(),
            )),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(wrong_type(key, "a list of strings", other)),
                })
                .collect::<Result<Vec<_>>>()
                .map(Some),
            Some(other) => Err(wrong_type(key, "a list of strings", other)),
        }
    }

    /// A list of non-negative integers
    pub fn u64_list(&self, key: &str) -> Result<Option<Vec<u64>>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .ok_or_else(|| wrong_type(key, "a list of non-negative integers", item))
                })
                .collect::<Result<Vec<_>>>()
                .map(Some),
            Some(other) => Err(wrong_type(key, "a list of non-negative integers", other)),
        }
    }
}

fn missing(key: &str) -> BridgeError {
    BridgeError::invalid(format!("Missing required argument '{key}'"))
}

fn wrong_type(key: &str, expected: &str, got: &Value) -> BridgeError {
    BridgeError::invalid(format!("'{key}' must be {expected}, got {}", type_name(got)))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_non_object_arguments_rejected() {
        assert!(Args::from_value(json!(null)).is_ok());
        assert!(Args::from_value(json!(["exploit"])).is_err());
    }

    #[test]
    fn test_null_is_absent() {
        let args = Args::from_value(json!({"type": null})).unwrap();
        assert_eq!(args.str("type").unwrap(), None);
        assert!(args.required_str("type").is_err());
    }

    #[test]
    fn test_integers_accept_numeric_strings() {
        let args = Args::from_value(json!({"a": 3, "b": "7", "c": -1, "d": "x", "e": 5_000_000_000u64}))
            .unwrap();
        assert_eq!(args.required_u32("a").unwrap(), 3);
        assert_eq!(args.required_u32("b").unwrap(), 7);
        assert!(args.u32("c").is_err());
        assert!(args.u32("d").is_err());
        assert!(args.u32("e").is_err());
        assert_eq!(args.u64("e").unwrap(), Some(5_000_000_000));
    }

    #[test]
    fn test_string_lists() {
        let args = Args::from_value(json!({
            "a": ["10.0.0.1", "10.0.0.2"],
            "b": "10.0.0.1, 10.0.0.2",
            "c": [1, 2]
        }))
        .unwrap();
        let expected = vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()];
        assert_eq!(args.str_list("a").unwrap(), Some(expected.clone()));
        assert_eq!(args.str_list("b").unwrap(), Some(expected));
        assert!(args.str_list("c").is_err());
        assert_eq!(args.u64_list("c").unwrap(), Some(vec![1, 2]));
    }

    #[test]
    fn test_wrong_type_names_key() {
        let args = Args::from_value(json!({"options": "RHOSTS=1"})).unwrap();
        let err = args.object("options").unwrap_err();
        assert!(err.to_string().contains("'options' must be an object"));
    }
}
