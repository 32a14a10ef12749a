/*!
 * Dispatch of named operations
 *
 * Every call runs the same pipeline: validation (`Catalog::prepare`), then the
 * probe/reconnect/retry policy around the prepared call, then conversion to an
 * `OperationResult`. Nothing reaches the connection unless validation passed.
 */

use msf_connect::{ConnectionManager, CredentialOverrides, Credentials};
use msf_core_resilience::{Invocation, ReconnectPolicy};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, CatalogContext};
use crate::config::BridgeConfig;
use crate::envelope::OperationResult;
use crate::error::Result;

pub struct Dispatcher {
    catalog: Catalog,
    connections: Arc<ConnectionManager>,
    policy: ReconnectPolicy,
}

impl Dispatcher {
    pub fn new(catalog: Catalog, connections: Arc<ConnectionManager>) -> Self {
        Self {
            catalog,
            connections,
            policy: ReconnectPolicy::default(),
        }
    }

    /// Build a dispatcher from configuration. No connection is made until
    /// the first operation runs.
    pub fn from_config(config: &BridgeConfig, explicit: &CredentialOverrides) -> Result<Self> {
        let credentials = Credentials::resolve(explicit, &config.rpc.overrides())?;
        info!(endpoint = %credentials.endpoint(), "Resolved RPC credentials");
        let manager = ConnectionManager::new(credentials, &config.rpc.connect_settings())?;
        let catalog = Catalog::new(CatalogContext::new(config.polling));
        Ok(Self::new(catalog, Arc::new(manager)))
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// Run one named operation and wrap its outcome
    pub async fn dispatch(&self, name: &str, args: Value) -> OperationResult {
        let started = Instant::now();
        let result = self.run(name, args).await;

        match &result {
            Ok(_) => debug!(
                operation = name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Operation succeeded"
            ),
            Err(e) => warn!(
                operation = name,
                kind = %e.kind(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Operation failed: {}",
                e
            ),
        }
        OperationResult::from(result)
    }

    async fn run(&self, name: &str, args: Value) -> Result<Value> {
        let (descriptor, call) = self.catalog.prepare(name, args)?;
        debug!(
            operation = descriptor.name,
            category = %descriptor.category,
            "Dispatching"
        );

        let invocation = Invocation::new(descriptor.name, descriptor.side_effecting);
        self.policy
            .execute(&*self.connections, invocation, |rpc| call(rpc))
            .await
    }
}
