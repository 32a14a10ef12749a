/*!
 * The uniform result envelope every dispatched operation yields
 */

use serde::de::{self, Unexpected};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{BridgeError, ErrorKind};

/// Either `{"success": true, "payload": ...}` or `{"error": "..."}`
///
/// Failures carry the error kind and, for timeouts, whatever output was
/// captured before the wait gave up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperationResult {
    Success {
        #[serde(deserialize_with = "only_true")]
        success: bool,
        payload: Value,
    },
    Failure {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kind: Option<ErrorKind>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        partial_output: Option<String>,
    },
}

/// `success: false` must not parse as a successful result
fn only_true<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    if bool::deserialize(deserializer)? {
        Ok(true)
    } else {
        Err(de::Error::invalid_value(Unexpected::Bool(false), &"true"))
    }
}

impl OperationResult {
    pub fn success(payload: Value) -> Self {
        OperationResult::Success {
            success: true,
            payload,
        }
    }

    pub fn failure(err: &BridgeError) -> Self {
        OperationResult::Failure {
            error: err.to_string(),
            kind: Some(err.kind()),
            partial_output: err.partial_output().map(str::to_string),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OperationResult::Success { .. })
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            OperationResult::Success { payload, .. } => Some(payload),
            OperationResult::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            OperationResult::Success { .. } => None,
            OperationResult::Failure { error, .. } => Some(error),
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            OperationResult::Success { .. } => None,
            OperationResult::Failure { kind, .. } => *kind,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({ "error": format!("Failed to serialize result: {e}") })
        })
    }
}

impl From<crate::error::Result<Value>> for OperationResult {
    fn from(result: crate::error::Result<Value>) -> Self {
        match result {
            Ok(payload) => OperationResult::success(payload),
            Err(e) => OperationResult::failure(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_shape() {
        let result = OperationResult::success(json!({"job_id": 3}));
        assert!(result.is_success());
        assert_eq!(
            result.to_value(),
            json!({"success": true, "payload": {"job_id": 3}})
        );
    }

    #[test]
    fn test_failure_shape() {
        let result = OperationResult::failure(&BridgeError::remote("Invalid Module"));
        assert!(!result.is_success());
        assert_eq!(
            result.to_value(),
            json!({"error": "Invalid Module", "kind": "remote"})
        );
    }

    #[test]
    fn test_timeout_failure_keeps_partial_output() {
        let err = BridgeError::timeout("Timed out after 5 seconds", Some("uid=0(root)".into()));
        let value = OperationResult::failure(&err).to_value();
        assert_eq!(value["kind"], json!("timeout"));
        assert_eq!(value["partial_output"], json!("uid=0(root)"));
    }

    #[test]
    fn test_auth_expiry_reported_as_connection() {
        let err = BridgeError::AuthExpired("Invalid Authentication Token".into());
        assert_eq!(OperationResult::failure(&err).kind(), Some(ErrorKind::Connection));
    }

    #[test]
    fn test_round_trip_through_json() {
        let text = r#"{"error":"Command is empty","kind":"invalid_argument"}"#;
        let parsed: OperationResult = serde_json::from_str(text).unwrap();
        assert_eq!(parsed.error(), Some("Command is empty"));
        assert_eq!(parsed.kind(), Some(ErrorKind::InvalidArgument));

        let ok: OperationResult =
            serde_json::from_value(json!({"success": true, "payload": {"count": 0}})).unwrap();
        assert_eq!(ok, OperationResult::success(json!({"count": 0})));
    }

    #[test]
    fn test_false_success_flag_is_not_a_success() {
        let parsed =
            serde_json::from_value::<OperationResult>(json!({"success": false, "payload": {}}));
        assert!(parsed.is_err());

        let failed: OperationResult = serde_json::from_value(json!({
            "success": false,
            "error": "Invalid Module",
            "kind": "remote",
        }))
        .unwrap();
        assert!(!failed.is_success());
        assert_eq!(failed.kind(), Some(ErrorKind::Remote));
    }
}
