/*!
 * msf-mcp - a resilient tool bridge to the Metasploit RPC service
 *
 * Exposes framework capabilities as named operations with a uniform result
 * envelope:
 * - A single shared RPC handle, probed before each call and replaced when its
 *   token has expired
 * - At most one reconnect and one retry per operation
 * - Argument validation before anything reaches the service
 * - Bounded waits for console, session and check output, with partial output
 *   on timeout
 * - A newline-delimited JSON-RPC tool server on stdio
 */

pub mod catalog;
pub mod config;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod server;
pub mod validation;

// Re-export commonly used types
pub use catalog::{Catalog, CatalogContext, OperationDescriptor};
pub use config::BridgeConfig;
pub use dispatcher::Dispatcher;
pub use envelope::OperationResult;
pub use error::{BridgeError, ErrorKind, Result};
pub use server::Server;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
