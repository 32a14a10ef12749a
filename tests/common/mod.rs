//! Scripted stand-in for the RPC service shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use msf_connect::{ConnectionManager, SharedRpc};
use msf_core_interface::{MsfRpc, RpcError};
use msf_core_resilience::{ConnectionFactory, ResilienceError};
use msf_mcp::catalog::{Catalog, CatalogContext};
use msf_mcp::config::PollingConfig;
use msf_mcp::Dispatcher;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Reply = Result<Value, RpcError>;

/// Fake service: one valid token at a time, scripted replies per method
///
/// A method's replies are consumed in order and the last one repeats.
/// Unscripted methods answer `{}`.
#[derive(Default)]
pub struct FakeMsf {
    valid_token: AtomicUsize,
    logins: AtomicUsize,
    expire_before_next_call: AtomicBool,
    reject_every_call: AtomicBool,
    refuse_logins: AtomicBool,
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
}

impl FakeMsf {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, method: &str, replies: impl IntoIterator<Item = Value>) {
        self.replies
            .lock()
            .unwrap()
            .insert(method.to_string(), replies.into_iter().map(Ok).collect());
    }

    pub fn script_error(&self, method: &str, error: RpcError) {
        self.replies
            .lock()
            .unwrap()
            .insert(method.to_string(), VecDeque::from([Err(error)]));
    }

    /// Revoke the current token right now; the next probe fails
    pub fn revoke_token(&self) {
        self.valid_token.store(usize::MAX, Ordering::SeqCst);
    }

    /// Let the next probe pass, then revoke the token before the call lands
    pub fn expire_before_next_call(&self) {
        self.expire_before_next_call.store(true, Ordering::SeqCst);
    }

    /// Reject every non-probe call as unauthenticated
    pub fn reject_every_call(&self) {
        self.reject_every_call.store(true, Ordering::SeqCst);
    }

    pub fn refuse_logins(&self) {
        self.refuse_logins.store(true, Ordering::SeqCst);
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    /// Every non-probe call in order
    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<Vec<Value>> {
        self.calls()
            .into_iter()
            .filter(|(m, _)| m == method)
            .map(|(_, args)| args)
            .collect()
    }

    fn answer(&self, token: usize, method: &str, args: Vec<Value>) -> Reply {
        let rejected = || Err(RpcError::AuthExpired("Invalid Authentication Token".into()));

        if method == "core.version" {
            if token != self.valid_token.load(Ordering::SeqCst) {
                return rejected();
            }
            return Ok(json!({"version": "6.4.0", "ruby": "3.2.2", "api": "1.0"}));
        }

        self.calls.lock().unwrap().push((method.to_string(), args));
        if self.expire_before_next_call.swap(false, Ordering::SeqCst) {
            self.revoke_token();
        }
        if self.reject_every_call.load(Ordering::SeqCst)
            || token != self.valid_token.load(Ordering::SeqCst)
        {
            return rejected();
        }

        let mut replies = self.replies.lock().unwrap();
        match replies.get_mut(method) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Ok(json!({}))),
            Some(queue) => queue.front().cloned().unwrap_or(Ok(json!({}))),
            None => Ok(json!({})),
        }
    }
}

struct FakeHandle {
    token: usize,
    remote: Arc<FakeMsf>,
}

#[async_trait]
impl MsfRpc for FakeHandle {
    async fn call(&self, method: &str, args: Vec<Value>) -> msf_core_interface::Result<Value> {
        self.remote.answer(self.token, method, args)
    }

    fn endpoint(&self) -> String {
        "fake://msfrpcd".to_string()
    }
}

struct FakeLogin {
    remote: Arc<FakeMsf>,
}

#[async_trait]
impl ConnectionFactory<SharedRpc> for FakeLogin {
    async fn create(&self) -> Result<SharedRpc, ResilienceError> {
        if self.remote.refuse_logins.load(Ordering::SeqCst) {
            return Err(ResilienceError::ConnectFailed("connection refused".into()));
        }
        let token = self.remote.logins.fetch_add(1, Ordering::SeqCst) + 1;
        self.remote.valid_token.store(token, Ordering::SeqCst);
        Ok(Arc::new(FakeHandle {
            token,
            remote: self.remote.clone(),
        }))
    }

    async fn is_healthy(&self, conn: &SharedRpc) -> bool {
        conn.call("core.version", vec![]).await.is_ok()
    }
}

/// Dispatcher wired to `remote`, polling every 100ms
pub fn dispatcher(remote: &Arc<FakeMsf>) -> Dispatcher {
    let polling = PollingConfig {
        interval_ms: 100,
        ..PollingConfig::default()
    };
    let factory = Arc::new(FakeLogin {
        remote: remote.clone(),
    });
    let manager = ConnectionManager::with_factory(factory, "fake://msfrpcd");
    Dispatcher::new(Catalog::new(CatalogContext::new(polling)), Arc::new(manager))
}
