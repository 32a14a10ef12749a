//! Error types for resilience primitives

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResilienceError {
    /// A handle could not be created
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// The handle exists but the remote side no longer accepts it
    #[error("Authentication expired: {0}")]
    AuthExpired(String),

    /// A bounded wait ran out of time
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Classification an operation error exposes to the reconnect policy
pub trait RetryClass {
    /// True when a fresh handle could cure the failure (auth expiry, transport fault)
    fn requires_reconnect(&self) -> bool;
}

impl RetryClass for ResilienceError {
    fn requires_reconnect(&self) -> bool {
        matches!(self, ResilienceError::AuthExpired(_))
    }
}
