//! Helpers for picking apart service replies
//!
//! Replies are loosely typed maps; these helpers centralise the handful of
//! shapes every handler reads so a missing or mistyped field becomes a
//! `RpcError::Decode` instead of a silent default.

use crate::{Result, RpcError};
use serde_json::Value;

/// Fail unless the reply carries `result: "success"`
pub fn expect_success(reply: &Value, method: &str) -> Result<()> {
    match reply.get("result").and_then(Value::as_str) {
        Some("success") => Ok(()),
        Some(other) => Err(RpcError::remote(format!("{method} returned result '{other}'"))),
        None => Err(RpcError::Decode(format!("{method}: reply has no 'result' field"))),
    }
}

/// Read a required string field
pub fn str_field<'a>(reply: &'a Value, key: &str) -> Result<&'a str> {
    reply
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::Decode(format!("missing string field '{key}'")))
}

/// Read a required unsigned integer field; the service sometimes sends ids as strings
pub fn u32_field(reply: &Value, key: &str) -> Result<u32> {
    let raw = reply
        .get(key)
        .ok_or_else(|| RpcError::Decode(format!("missing field '{key}'")))?;
    as_u32(raw).ok_or_else(|| RpcError::Decode(format!("field '{key}' is not an id: {raw}")))
}

/// Interpret a JSON number or numeric string as u32
pub fn as_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a string list field, tolerating its absence as an empty list
pub fn string_list(reply: &Value, key: &str) -> Vec<String> {
    reply
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
