//! Probe, reconnect and single-retry policy around one remote call
//!
//! Tokens on the remote side can expire between calls with no notification, so
//! every invocation goes through three stages:
//!
//! 1. `acquire` the shared handle and probe it; an unhealthy handle is replaced
//!    once before the call.
//! 2. Run the operation.
//! 3. If the operation fails with an error whose `requires_reconnect()` is true
//!    and no reconnect has happened yet in this invocation, reconnect once and
//!    retry once. Any further failure is returned as-is.
//!
//! An invocation therefore performs at most one reconnect and at most two
//! calls of the operation.

use super::connection::ConnectionLifecycle;
use super::error::{ResilienceError, RetryClass};
use std::future::Future;
use tracing::{debug, warn};

/// Names the invocation for logs and marks whether retrying it repeats a side effect
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub name: &'a str,
    pub side_effecting: bool,
}

impl<'a> Invocation<'a> {
    pub fn new(name: &'a str, side_effecting: bool) -> Self {
        Self {
            name,
            side_effecting,
        }
    }
}

/// Configuration for the reconnect policy
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Probe the handle before every call
    pub probe_before_call: bool,
    /// Allow the post-failure reconnect-and-retry
    pub retry_on_auth_failure: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            probe_before_call: true,
            retry_on_auth_failure: true,
        }
    }
}

impl ReconnectPolicy {
    /// Run `op` against the lifecycle's handle under the probe/reconnect/retry rules
    ///
    /// `op` receives an owned clone of the handle for each attempt.
    pub async fn execute<L, F, Fut, T, E>(
        &self,
        lifecycle: &L,
        invocation: Invocation<'_>,
        op: F,
    ) -> Result<T, E>
    where
        L: ConnectionLifecycle + ?Sized,
        F: Fn(L::Conn) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryClass + From<ResilienceError>,
    {
        let mut conn = lifecycle.acquire().await?;
        let mut reconnected = false;

        if self.probe_before_call && !lifecycle.health_check(&conn).await {
            warn!(operation = invocation.name, "Health probe failed, reconnecting");
            conn = lifecycle.reconnect().await?;
            reconnected = true;
        }

        match op(conn).await {
            Ok(value) => Ok(value),
            Err(e) if e.requires_reconnect() && self.retry_on_auth_failure && !reconnected => {
                if invocation.side_effecting {
                    warn!(
                        operation = invocation.name,
                        "Retrying side-effecting operation after reconnect; the remote action may run twice"
                    );
                } else {
                    warn!(
                        operation = invocation.name,
                        "Call rejected by remote, reconnecting and retrying once"
                    );
                }
                let conn = lifecycle.reconnect().await?;
                op(conn).await
            }
            Err(e) => {
                if e.requires_reconnect() {
                    debug!(
                        operation = invocation.name,
                        "Reconnect budget spent, surfacing failure"
                    );
                }
                Err(e)
            }
        }
    }
}
