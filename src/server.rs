/*!
 * Tool server over stdio
 *
 * Newline-delimited JSON-RPC 2.0. Requests are read from stdin in order, but
 * each one is answered from its own task, so a long bounded wait does not hold
 * up `tools/list` or another call. All replies funnel through one writer task
 * and reach stdout whole, one per line.
 */

use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::envelope::OperationResult;
use crate::error::Result;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "msf-mcp";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

#[derive(Clone)]
pub struct Server {
    dispatcher: Arc<Dispatcher>,
}

impl Server {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub async fn run_stdio(&self) -> Result<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve requests from `reader` until it is closed, then wait for
    /// in-flight calls to answer
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<Value>();
        let writer_task = tokio::spawn(write_replies(writer, rx));
        let mut tasks = JoinSet::new();
        let mut lines = BufReader::new(reader).lines();

        info!("Tool server listening on stdio");
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let message = match serde_json::from_str::<Value>(line) {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, "Discarding unparseable request");
                    let reply = error_reply(Value::Null, PARSE_ERROR, format!("Parse error: {e}"));
                    let _ = tx.send(reply);
                    continue;
                }
            };

            let server = self.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                if let Some(reply) = server.handle(message).await {
                    let _ = tx.send(reply);
                }
            });

            while let Some(done) = tasks.try_join_next() {
                if let Err(e) = done {
                    error!(error = %e, "Request task failed");
                }
            }
        }

        debug!(in_flight = tasks.len(), "Input closed, draining requests");
        while let Some(done) = tasks.join_next().await {
            if let Err(e) = done {
                error!(error = %e, "Request task failed");
            }
        }
        drop(tx);

        match writer_task.await {
            Ok(result) => result?,
            Err(e) => error!(error = %e, "Writer task failed"),
        }
        info!("Tool server stopped");
        Ok(())
    }

    /// Answer one message. Notifications yield `None`.
    pub async fn handle(&self, message: Value) -> Option<Value> {
        let Value::Object(mut request) = message else {
            return Some(error_reply(
                Value::Null,
                INVALID_REQUEST,
                "Request must be a JSON object",
            ));
        };

        let id = request.remove("id");
        let method = request.get("method").and_then(Value::as_str).map(str::to_string);
        let Some(method) = method else {
            return Some(error_reply(
                id.unwrap_or(Value::Null),
                INVALID_REQUEST,
                "Request has no method",
            ));
        };
        let params = request.remove("params").unwrap_or(Value::Null);
        debug!(method = %method, "Request");

        let outcome = match method.as_str() {
            "initialize" => Ok(self.initialize()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.dispatcher.catalog().tool_listing() })),
            "tools/call" => self.call_tool(&params).await,
            _ if id.is_none() => {
                debug!(method = %method, "Ignoring notification");
                return None;
            }
            other => Err((METHOD_NOT_FOUND, format!("Method not found: {other}"))),
        };

        let id = id?;
        Some(match outcome {
            Ok(result) => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": result,
            }),
            Err((code, message)) => error_reply(id, code, message),
        })
    }

    fn initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {
                "name": SERVER_NAME,
                "version": crate::VERSION,
            },
            "capabilities": {
                "tools": { "listChanged": false },
            },
        })
    }

    async fn call_tool(&self, params: &Value) -> std::result::Result<Value, (i64, String)> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| (INVALID_PARAMS, "tools/call requires a tool name".to_string()))?;
        let arguments = params
            .get("arguments")
            .filter(|args| !args.is_null())
            .cloned()
            .unwrap_or_else(|| json!({}));

        info!(tool = name, "Tool call");
        let result = self.dispatcher.dispatch(name, arguments).await;
        Ok(tool_content(&result))
    }
}

/// `tools/call` result: the envelope as text plus its structured form
fn tool_content(result: &OperationResult) -> Value {
    let structured = result.to_value();
    let text =
        serde_json::to_string_pretty(&structured).unwrap_or_else(|_| structured.to_string());
    json!({
        "content": [{ "type": "text", "text": text }],
        "structuredContent": structured,
        "isError": !result.is_success(),
    })
}

fn error_reply(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message.into(),
        },
    })
}

async fn write_replies<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Value>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(reply) = rx.recv().await {
        let mut line = reply.to_string();
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
