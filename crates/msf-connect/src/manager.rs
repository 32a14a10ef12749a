//! ConnectionManager: owner of the single shared handle to the RPC service

use crate::credentials::Credentials;
use crate::error::ConnectError;
use crate::system::{ConnectSettings, RemoteRpc};
use msf_core_interface::MsfRpc;
use msf_core_resilience::{
    ConnectionFactory, ConnectionLifecycle, ConnectionSlot, ResilienceError, SlotStats,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared handle type handed to operation handlers
pub type SharedRpc = Arc<dyn MsfRpc>;

/// Creates authenticated handles from a fixed credential set and probes them
/// with `core.version`.
pub struct MsfConnector {
    credentials: Credentials,
    client: reqwest::Client,
}

impl MsfConnector {
    pub fn new(credentials: Credentials, settings: &ConnectSettings) -> Result<Self, ConnectError> {
        let client = RemoteRpc::build_client(&credentials, settings)?;
        Ok(Self {
            credentials,
            client,
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}

#[async_trait::async_trait]
impl ConnectionFactory<SharedRpc> for MsfConnector {
    async fn create(&self) -> Result<SharedRpc, ResilienceError> {
        info!(
            host = self.credentials.host(),
            port = self.credentials.port(),
            user = self.credentials.username(),
            ssl = self.credentials.ssl(),
            "Connecting to RPC service"
        );
        let rpc = RemoteRpc::login(self.client.clone(), &self.credentials).await?;
        Ok(Arc::new(rpc))
    }

    async fn is_healthy(&self, conn: &SharedRpc) -> bool {
        match conn.call("core.version", vec![]).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Health probe failed");
                false
            }
        }
    }
}

/// Central owner of the process-wide RPC handle
///
/// Responsibilities:
/// - Create the handle lazily on first `acquire`
/// - Probe it on request
/// - Replace it unconditionally on `reconnect`
///
/// Creation failures are reported, never retried here; retry policy belongs
/// to the caller.
///
/// # Example
///
/// ```rust,no_run
/// use msf_connect::{ConnectSettings, ConnectionManager, Credentials};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = ConnectionManager::new(Credentials::default(), &ConnectSettings::default())?;
///
/// let rpc = manager.acquire().await?;
/// if !manager.health_check(&rpc).await {
///     manager.reconnect().await?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct ConnectionManager {
    slot: ConnectionSlot<SharedRpc>,
    target: String,
}

impl ConnectionManager {
    /// Build a manager that logs in to the service described by `credentials`
    pub fn new(credentials: Credentials, settings: &ConnectSettings) -> Result<Self, ConnectError> {
        let target = credentials.endpoint();
        let connector = MsfConnector::new(credentials, settings)?;
        Ok(Self::with_factory(Arc::new(connector), target))
    }

    /// Build a manager around any handle factory
    pub fn with_factory(
        factory: Arc<dyn ConnectionFactory<SharedRpc>>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            slot: ConnectionSlot::new(factory),
            target: target.into(),
        }
    }

    /// Return the current handle, connecting first if there is none
    pub async fn acquire(&self) -> Result<SharedRpc, ResilienceError> {
        self.slot.acquire().await
    }

    /// Probe a handle; false on any authentication or transport fault
    pub async fn health_check(&self, rpc: &SharedRpc) -> bool {
        self.slot.health_check(rpc).await
    }

    /// Discard the current handle and log in again. Single attempt.
    pub async fn reconnect(&self) -> Result<SharedRpc, ResilienceError> {
        info!("Reconnecting to {}", self.target);
        let result = self.slot.reconnect().await;
        if let Ok(rpc) = &result {
            debug!("Reconnected to {}", rpc.endpoint());
        }
        result
    }

    pub async fn is_connected(&self) -> bool {
        self.slot.is_connected().await
    }

    /// Endpoint this manager connects to
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn stats(&self) -> SlotStats {
        self.slot.stats()
    }
}

#[async_trait::async_trait]
impl ConnectionLifecycle for ConnectionManager {
    type Conn = SharedRpc;

    async fn acquire(&self) -> Result<SharedRpc, ResilienceError> {
        ConnectionManager::acquire(self).await
    }

    async fn health_check(&self, conn: &SharedRpc) -> bool {
        ConnectionManager::health_check(self, conn).await
    }

    async fn reconnect(&self) -> Result<SharedRpc, ResilienceError> {
        ConnectionManager::reconnect(self).await
    }
}
