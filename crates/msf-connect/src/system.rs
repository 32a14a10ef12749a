//! RemoteRpc: MsfRpc implementation that talks msgpack over HTTP to the service

use async_trait::async_trait;
use msf_core_interface::{MsfRpc, Result, RpcError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::codec;
use crate::credentials::Credentials;
use crate::error::ConnectError;

/// Default per-request HTTP timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport settings shared by every handle the connector creates
#[derive(Debug, Clone)]
pub struct ConnectSettings {
    pub request_timeout: Duration,
}

impl Default for ConnectSettings {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// An authenticated handle: HTTP client, endpoint and session token.
///
/// Cheap to clone; the reqwest client is reference-counted internally.
///
/// # Example
///
/// ```rust,no_run
/// use msf_connect::{ConnectSettings, Credentials, RemoteRpc};
/// use msf_core_interface::MsfRpc;
///
/// # async fn example() -> Result<(), msf_connect::ConnectError> {
/// let creds = Credentials::default();
/// let client = RemoteRpc::build_client(&creds, &ConnectSettings::default())?;
/// let rpc = RemoteRpc::login(client, &creds).await?;
///
/// let version = rpc.call("core.version", vec![]).await?;
/// println!("{}", version["version"]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RemoteRpc {
    client: reqwest::Client,
    endpoint: Arc<str>,
    token: Arc<str>,
}

impl RemoteRpc {
    /// Build the HTTP client for a credential set
    ///
    /// The service ships with a self-signed certificate, so certificate
    /// verification is disabled when transport security is on.
    pub fn build_client(
        credentials: &Credentials,
        settings: &ConnectSettings,
    ) -> std::result::Result<reqwest::Client, ConnectError> {
        let mut builder = reqwest::Client::builder().timeout(settings.request_timeout);
        if credentials.ssl() {
            builder = builder.danger_accept_invalid_certs(true);
        }
        Ok(builder.build()?)
    }

    /// Authenticate and return a handle carrying the issued token
    pub async fn login(
        client: reqwest::Client,
        credentials: &Credentials,
    ) -> std::result::Result<Self, ConnectError> {
        let endpoint = credentials.endpoint();
        debug!(
            "Logging in to {} as {}",
            endpoint,
            credentials.username()
        );

        let args = [
            Value::String(credentials.username().to_string()),
            Value::String(credentials.password().to_string()),
        ];
        let reply = match post(&client, &endpoint, "auth.login", None, &args).await {
            Ok(reply) => reply,
            Err(RpcError::Transport(reason)) => {
                return Err(ConnectError::Unreachable { endpoint, reason })
            }
            Err(RpcError::AuthExpired(reason)) => return Err(ConnectError::LoginRejected(reason)),
            Err(e) => return Err(ConnectError::Rpc(e)),
        };

        let token = match (
            reply.get("result").and_then(Value::as_str),
            reply.get("token").and_then(Value::as_str),
        ) {
            (Some("success"), Some(token)) if !token.is_empty() => token.to_string(),
            _ => {
                return Err(ConnectError::LoginRejected(format!(
                    "unexpected auth.login reply: {reply}"
                )))
            }
        };

        info!(
            "Authenticated to {} as {}",
            endpoint,
            credentials.username()
        );
        Ok(Self::with_token(client, endpoint, token))
    }

    /// Wrap an already-issued token
    pub fn with_token(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: Arc::from(endpoint.into()),
            token: Arc::from(token.into()),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

async fn post(
    client: &reqwest::Client,
    endpoint: &str,
    method: &str,
    token: Option<&str>,
    args: &[Value],
) -> Result<Value> {
    let body = codec::encode_request(method, token, args)?;

    let response = client
        .post(endpoint)
        .header(reqwest::header::CONTENT_TYPE, codec::CONTENT_TYPE)
        .body(body)
        .send()
        .await
        .map_err(|e| RpcError::Transport(e.to_string()))?;

    let status = response.status().as_u16();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| RpcError::Transport(e.to_string()))?;

    match codec::decode_response(&bytes) {
        Ok(reply) => codec::check_reply(status, reply),
        Err(e) => Err(codec::undecodable_reply(status, e)),
    }
}

#[async_trait]
impl MsfRpc for RemoteRpc {
    async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        debug!(method, "RPC call");
        post(&self.client, &self.endpoint, method, Some(&self.token), &args).await
    }

    fn endpoint(&self) -> String {
        self.endpoint.to_string()
    }
}
