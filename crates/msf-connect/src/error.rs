//! Error types for the msf-connect crate

use msf_core_interface::RpcError;
use msf_core_resilience::ResilienceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Cannot reach RPC service at {endpoint}: {reason}")]
    Unreachable { endpoint: String, reason: String },

    #[error("Login rejected: {0}")]
    LoginRejected(String),

    #[error("Invalid connection settings: {0}")]
    InvalidConfig(String),

    #[error("HTTP client setup failed: {0}")]
    Client(#[from] reqwest::Error),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

impl From<ConnectError> for ResilienceError {
    fn from(err: ConnectError) -> Self {
        ResilienceError::ConnectFailed(err.to_string())
    }
}
