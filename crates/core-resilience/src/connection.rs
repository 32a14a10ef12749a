//! Single shared connection handle with lazy creation and unconditional replacement
//!
//! Unlike a pool, a `ConnectionSlot` holds at most one live handle. Every caller
//! clones the same handle out of the slot; `reconnect` builds a replacement and
//! swaps it in, after which the previous handle is closed and never handed out
//! again.

use super::error::ResilienceError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Factory trait for creating and validating connections
#[async_trait::async_trait]
pub trait ConnectionFactory<T: Send + 'static>: Send + Sync {
    /// Create a new connection
    async fn create(&self) -> Result<T, ResilienceError>;

    /// Check if a connection is still healthy
    async fn is_healthy(&self, conn: &T) -> bool;

    /// Close a connection (optional cleanup)
    async fn close(&self, conn: T) {
        drop(conn);
    }
}

/// The three lifecycle operations the reconnect policy drives
///
/// Implemented by `ConnectionSlot` and by anything that wraps one (for example a
/// manager that binds a slot to a concrete remote factory).
#[async_trait::async_trait]
pub trait ConnectionLifecycle: Send + Sync {
    type Conn: Clone + Send + Sync + 'static;

    /// Return the current handle, creating one if none exists
    async fn acquire(&self) -> Result<Self::Conn, ResilienceError>;

    /// Lightweight probe; false on any authentication or transport fault
    async fn health_check(&self, conn: &Self::Conn) -> bool;

    /// Discard the current handle and create a new one. Single attempt.
    async fn reconnect(&self) -> Result<Self::Conn, ResilienceError>;
}

/// Counters describing the slot's history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotStats {
    /// Handles successfully created (initial + reconnects)
    pub created: u64,
    /// Reconnect attempts, successful or not
    pub reconnects: u64,
    /// Generation of the handle currently installed (0 = never connected)
    pub generation: u64,
}

/// Holder for the one process-wide handle
pub struct ConnectionSlot<T> {
    factory: Arc<dyn ConnectionFactory<T>>,
    current: RwLock<Option<T>>,
    generation: AtomicU64,
    created: AtomicU64,
    reconnects: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> ConnectionSlot<T> {
    pub fn new(factory: Arc<dyn ConnectionFactory<T>>) -> Self {
        Self {
            factory,
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
            created: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
        }
    }

    /// Return the installed handle, creating one on first use
    ///
    /// Lazy creation is serialized on the slot's write lock so concurrent first
    /// callers share a single handle instead of each logging in.
    pub async fn acquire(&self) -> Result<T, ResilienceError> {
        if let Some(conn) = self.current.read().await.as_ref() {
            return Ok(conn.clone());
        }

        let mut guard = self.current.write().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self.factory.create().await?;
        self.created.fetch_add(1, Ordering::SeqCst);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, "Connection created");
        *guard = Some(conn.clone());
        Ok(conn)
    }

    pub async fn health_check(&self, conn: &T) -> bool {
        self.factory.is_healthy(conn).await
    }

    /// Build a new handle and install it, closing whatever was there
    ///
    /// The new handle is created before the lock is taken, so two overlapping
    /// reconnects both succeed and the later assignment wins. On failure the
    /// slot is emptied unless another reconnect has installed a newer handle in
    /// the meantime; the next `acquire` then retries creation.
    pub async fn reconnect(&self) -> Result<T, ResilienceError> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        let started_at = self.generation.load(Ordering::SeqCst);

        match self.factory.create().await {
            Ok(conn) => {
                self.created.fetch_add(1, Ordering::SeqCst);
                let previous = {
                    let mut guard = self.current.write().await;
                    guard.replace(conn.clone())
                };
                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                if generation > started_at + 1 {
                    warn!(
                        generation,
                        started_at, "Overlapping reconnect replaced a newer handle"
                    );
                }
                info!(generation, "Reconnected");
                if let Some(old) = previous {
                    self.factory.close(old).await;
                }
                Ok(conn)
            }
            Err(e) => {
                if self.generation.load(Ordering::SeqCst) == started_at {
                    let previous = self.current.write().await.take();
                    if let Some(old) = previous {
                        self.factory.close(old).await;
                    }
                }
                warn!(error = %e, "Reconnect failed");
                Err(e)
            }
        }
    }

    /// Whether a handle is currently installed
    pub async fn is_connected(&self) -> bool {
        self.current.read().await.is_some()
    }

    pub fn stats(&self) -> SlotStats {
        SlotStats {
            created: self.created.load(Ordering::SeqCst),
            reconnects: self.reconnects.load(Ordering::SeqCst),
            generation: self.generation.load(Ordering::SeqCst),
        }
    }
}

#[async_trait::async_trait]
impl<T: Clone + Send + Sync + 'static> ConnectionLifecycle for ConnectionSlot<T> {
    type Conn = T;

    async fn acquire(&self) -> Result<T, ResilienceError> {
        ConnectionSlot::acquire(self).await
    }

    async fn health_check(&self, conn: &T) -> bool {
        ConnectionSlot::health_check(self, conn).await
    }

    async fn reconnect(&self) -> Result<T, ResilienceError> {
        ConnectionSlot::reconnect(self).await
    }
}
