//! MSF Connect: Client-side connectivity to a Metasploit msgpack RPC service
//!
//! This crate turns a credential set into the single authenticated handle the
//! bridge shares between all operations.
//!
//! # Architecture
//!
//! - **Credentials**: explicit > `MSF_RPC_*` environment > config file > defaults
//! - **codec**: msgpack request frames and JSON-normalized replies
//! - **RemoteRpc**: implements `MsfRpc` by posting frames to `/api/` with the session token
//! - **MsfConnector**: handle factory (`auth.login`) and health probe (`core.version`)
//! - **ConnectionManager**: lazy create, probe, unconditional reconnect
//!
//! # Example
//!
//! ```rust,no_run
//! use msf_connect::{ConnectSettings, ConnectionManager, CredentialOverrides, Credentials};
//! use msf_core_interface::MsfRpc;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let credentials = Credentials::resolve(
//!         &CredentialOverrides::default(),
//!         &CredentialOverrides::default(),
//!     )?;
//!     let manager = ConnectionManager::new(credentials, &ConnectSettings::default())?;
//!
//!     let rpc = manager.acquire().await?;
//!     let jobs = rpc.call("job.list", vec![]).await?;
//!     println!("{jobs}");
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod credentials;
pub mod error;
pub mod manager;
pub mod system;

pub use credentials::{CredentialOverrides, Credentials};
pub use error::ConnectError;
pub use manager::{ConnectionManager, MsfConnector, SharedRpc};
pub use system::{ConnectSettings, RemoteRpc};
