//! MSF Core Interface: the call seam between operation handlers and the remote service
//!
//! This crate defines the `MsfRpc` trait, which abstracts a single authenticated
//! handle to a Metasploit RPC service. Handlers never hold their own handle; they
//! receive one per invocation from the connection manager and talk to the remote
//! service exclusively through this trait.
//!
//! # Architecture
//!
//! - **MsfRpc**: one method call, positional arguments, JSON-shaped reply
//! - **RpcError**: failure taxonomy the retry layer keys off (auth, transport, remote)
//! - **types**: opaque remote references (`SessionId`, `ConsoleId`, `JobId`, `ModuleKey`)
//!   and tagged variants (`ModuleType`, `SessionKind`) whose capabilities are
//!   checked at the type level instead of probed at call time
//!
//! # Example
//!
//! ```rust,no_run
//! use msf_core_interface::{MsfRpc, ModuleType};
//!
//! async fn count_exploits<R: MsfRpc + ?Sized>(rpc: &R) -> msf_core_interface::Result<usize> {
//!     let reply = rpc.call(ModuleType::Exploit.list_method(), vec![]).await?;
//!     Ok(reply["modules"].as_array().map(|m| m.len()).unwrap_or(0))
//! }
//! ```

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub mod response;
pub mod types;

pub use types::{
    ConsoleId, JobId, ModuleKey, ModuleType, ParseModuleTypeError, SessionId, SessionKind,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RpcError {
    /// The handle exists but the service no longer accepts its token
    #[error("Authentication token rejected: {0}")]
    AuthExpired(String),

    /// The request never produced a service reply (refused, reset, TLS, timeout)
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The service executed the call and reported a failure
    #[error("{class}: {message}")]
    Remote {
        class: String,
        message: String,
        code: Option<i64>,
    },

    /// The reply could not be decoded
    #[error("Malformed response: {0}")]
    Decode(String),
}

impl RpcError {
    /// Build a remote failure without an error class or code
    pub fn remote(message: impl Into<String>) -> Self {
        RpcError::Remote {
            class: "Msf::RPC::Exception".to_string(),
            message: message.into(),
            code: None,
        }
    }

    /// Authentication and transport failures are cured by a fresh handle;
    /// everything else is not.
    pub fn is_connection_class(&self) -> bool {
        matches!(self, RpcError::AuthExpired(_) | RpcError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;

/// An authenticated handle to the remote service
///
/// Implementations must be `Send + Sync + 'static`: one handle is shared by every
/// concurrently dispatched operation.
///
/// The token (if any) is owned by the implementation and injected into each call;
/// callers only pass the method's own positional arguments.
#[async_trait]
pub trait MsfRpc: Send + Sync + 'static {
    /// Invoke `method` with positional `args` and return the decoded reply
    ///
    /// # Errors
    ///
    /// - `RpcError::AuthExpired` when the service rejects the handle's token
    /// - `RpcError::Transport` when the service could not be reached
    /// - `RpcError::Remote` when the service reports a failure
    async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value>;

    /// Human-readable location of the service, for logs
    fn endpoint(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_class() {
        assert!(RpcError::AuthExpired("Invalid Authentication Token".into()).is_connection_class());
        assert!(RpcError::Transport("connection refused".into()).is_connection_class());
        assert!(!RpcError::remote("Invalid Job").is_connection_class());
        assert!(!RpcError::Decode("truncated".into()).is_connection_class());
    }

    #[test]
    fn test_remote_display() {
        let err = RpcError::Remote {
            class: "Msf::RPC::Exception".into(),
            message: "Unknown session ID".into(),
            code: Some(500),
        };
        assert_eq!(err.to_string(), "Msf::RPC::Exception: Unknown session ID");
    }

    #[test]
    fn test_trait_is_object_safe() {
        fn assert_dyn(_: Option<&dyn MsfRpc>) {}
        assert_dyn(None);
    }
}
