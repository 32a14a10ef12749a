/*!
 * Error types for the bridge
 *
 * Every failure that can leave an operation maps onto one of four kinds
 * (connection, invalid argument, remote, timeout). Authentication expiry is a
 * fifth variant internally but is resolved by the dispatcher's single
 * reconnect-and-retry and only surfaces, as a connection failure, when that
 * retry also fails.
 */

use msf_connect::ConnectError;
use msf_core_interface::RpcError;
use msf_core_resilience::{ResilienceError, RetryClass};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Error, Debug)]
pub enum BridgeError {
    /// Cannot establish or re-establish a handle, or the transport dropped
    #[error("Connection error: {0}")]
    Connection(String),

    /// The handle's token was rejected
    #[error("Authentication expired: {0}")]
    AuthExpired(String),

    /// The remote call executed and reported failure
    #[error("{0}")]
    Remote(String),

    /// Rejected before reaching the remote service
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A bounded wait ran out of time
    #[error("{message}")]
    Timeout {
        message: String,
        partial_output: Option<String>,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl BridgeError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        BridgeError::InvalidArgument(msg.into())
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        BridgeError::Remote(msg.into())
    }

    pub fn timeout(message: impl Into<String>, partial_output: Option<String>) -> Self {
        BridgeError::Timeout {
            message: message.into(),
            partial_output,
        }
    }

    /// Caller-facing classification
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Connection(_) | BridgeError::AuthExpired(_) | BridgeError::Config(_) => {
                ErrorKind::Connection
            }
            BridgeError::Remote(_) => ErrorKind::Remote,
            BridgeError::InvalidArgument(_) | BridgeError::Io(_) => ErrorKind::InvalidArgument,
            BridgeError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Whether a fresh handle could cure this failure
    pub fn requires_reconnect(&self) -> bool {
        matches!(self, BridgeError::Connection(_) | BridgeError::AuthExpired(_))
    }

    /// Output captured before a timeout, if any
    pub fn partial_output(&self) -> Option<&str> {
        match self {
            BridgeError::Timeout { partial_output, .. } => partial_output.as_deref(),
            _ => None,
        }
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            BridgeError::Config(_) => EXIT_FATAL,
            _ => EXIT_FAILURE,
        }
    }
}

impl RetryClass for BridgeError {
    fn requires_reconnect(&self) -> bool {
        BridgeError::requires_reconnect(self)
    }
}

/// Error kind reported in failure envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    InvalidArgument,
    Remote,
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Connection => write!(f, "connection"),
            ErrorKind::InvalidArgument => write!(f, "invalid_argument"),
            ErrorKind::Remote => write!(f, "remote"),
            ErrorKind::Timeout => write!(f, "timeout"),
        }
    }
}

impl From<RpcError> for BridgeError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::AuthExpired(msg) => BridgeError::AuthExpired(msg),
            RpcError::Transport(msg) => BridgeError::Connection(msg),
            RpcError::Remote { message, .. } => BridgeError::Remote(message),
            RpcError::Decode(msg) => BridgeError::Remote(format!("Malformed response: {msg}")),
        }
    }
}

impl From<ResilienceError> for BridgeError {
    fn from(err: ResilienceError) -> Self {
        match err {
            ResilienceError::ConnectFailed(msg) => {
                BridgeError::Connection(format!("Failed to connect to Metasploit RPC server: {msg}"))
            }
            ResilienceError::AuthExpired(msg) => BridgeError::AuthExpired(msg),
            ResilienceError::Timeout(after) => BridgeError::Timeout {
                message: format!("Timed out after {} seconds", after.as_secs()),
                partial_output: None,
            },
        }
    }
}

impl From<ConnectError> for BridgeError {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::InvalidConfig(msg) => BridgeError::Config(msg),
            other => BridgeError::Connection(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::InvalidArgument(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_rpc_error_mapping() {
        let auth: BridgeError = RpcError::AuthExpired("Invalid Authentication Token".into()).into();
        assert!(matches!(auth, BridgeError::AuthExpired(_)));
        assert!(auth.requires_reconnect());

        let transport: BridgeError = RpcError::Transport("connection reset".into()).into();
        assert_eq!(transport.kind(), ErrorKind::Connection);
        assert!(transport.requires_reconnect());

        let remote: BridgeError = RpcError::remote("Invalid Module").into();
        assert_eq!(remote.kind(), ErrorKind::Remote);
        assert_eq!(remote.to_string(), "Invalid Module");
        assert!(!remote.requires_reconnect());
    }

    #[test]
    fn test_resilience_error_mapping() {
        let err: BridgeError = ResilienceError::ConnectFailed("refused".into()).into();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(err.to_string().contains("refused"));

        let err: BridgeError = ResilienceError::Timeout(Duration::from_secs(30)).into();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_invalid_argument_is_never_retried() {
        let err = BridgeError::invalid("Invalid module type: bogus");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(!err.requires_reconnect());
    }

    #[test]
    fn test_timeout_carries_partial_output() {
        let err = BridgeError::timeout("Command timed out after 5 seconds", Some("partial".into()));
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.partial_output(), Some("partial"));
        assert_eq!(err.to_string(), "Command timed out after 5 seconds");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(BridgeError::Config("bad port".into()).exit_code(), EXIT_FATAL);
        assert_eq!(BridgeError::remote("x").exit_code(), EXIT_FAILURE);
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::InvalidArgument.to_string(), "invalid_argument");
        assert_eq!(
            serde_json::to_value(ErrorKind::Timeout).unwrap(),
            serde_json::json!("timeout")
        );
    }
}
