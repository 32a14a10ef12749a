//! MSF Core Resilience: Pure-logic connection lifecycle primitives
//!
//! # Overview
//!
//! This crate provides the building blocks the bridge uses to keep a single
//! authenticated handle alive against a remote service that can silently
//! invalidate it:
//!
//! - **Connection Slot**: one lazily-created, shared handle with unconditional replacement
//! - **Reconnect Policy**: probe → reconnect → single retry around one call
//! - **Bounded Poll**: fixed-interval status reads with a deadline, returning partial state on timeout
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - The wire protocol or the remote object model
//! - Credentials and configuration
//! - How results are presented to callers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Dispatcher                      │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Reconnect Policy                  │  ← Self-healing
//! │  (probe, one reconnect, one retry)      │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Connection Slot                   │  ← One shared handle
//! │  (lazy create, last-writer-wins swap)   │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//!         Remote Service
//!               │
//!      Long-running commands:
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Bounded Poll                      │  ← Completion by observation
//! │  (fixed interval, deadline, partial)    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use msf_core_resilience::{
//!     ConnectionFactory, ConnectionSlot, Invocation, ReconnectPolicy, ResilienceError,
//! };
//! use std::sync::Arc;
//!
//! # #[derive(Clone)]
//! # struct MyHandle;
//! # impl MyHandle { async fn ping(&self) -> Result<u32, ResilienceError> { Ok(1) } }
//! struct MyFactory;
//!
//! #[async_trait::async_trait]
//! impl ConnectionFactory<MyHandle> for MyFactory {
//!     async fn create(&self) -> Result<MyHandle, ResilienceError> {
//! #       Ok(MyHandle)
//!     }
//!
//!     async fn is_healthy(&self, _conn: &MyHandle) -> bool {
//!         true
//!     }
//! }
//!
//! # async fn example() -> Result<(), ResilienceError> {
//! let slot = ConnectionSlot::new(Arc::new(MyFactory));
//! let policy = ReconnectPolicy::default();
//!
//! let value = policy
//!     .execute(&slot, Invocation::new("ping", false), |h| async move { h.ping().await })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod poll;
pub mod reconnect;

// Re-export main types for convenience
pub use connection::{ConnectionFactory, ConnectionLifecycle, ConnectionSlot, SlotStats};
pub use error::{ResilienceError, RetryClass};
pub use poll::{BoundedPoll, PollOutcome, PollState, DEFAULT_POLL_INTERVAL};
pub use reconnect::{Invocation, ReconnectPolicy};

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use msf_core_resilience::prelude::*;
/// ```
pub mod prelude {
    pub use super::connection::{ConnectionFactory, ConnectionLifecycle, ConnectionSlot};
    pub use super::error::{ResilienceError, RetryClass};
    pub use super::poll::{BoundedPoll, PollOutcome, PollState};
    pub use super::reconnect::{Invocation, ReconnectPolicy};
}
