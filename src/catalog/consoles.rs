//! Interactive consoles
//!
//! `console.read` returns only the output produced since the previous read, so
//! a bounded wait accumulates chunks until the console reports it is no longer
//! busy.

use msf_connect::SharedRpc;
use msf_core_interface::response::expect_success;
use msf_core_interface::ConsoleId;
use msf_core_resilience::{BoundedPoll, PollOutcome, PollState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{
    bind, count, timeout_arg, Args, Call, CatalogContext, Category, OperationDescriptor, Param,
    ParamKind,
};
use crate::error::{BridgeError, Result};
use crate::validation;

const CONSOLE_ID: Param = Param::required("console_id", ParamKind::String, "Console id");

/// Longest wait for a fresh console's banner before the command is written
const BANNER_TIMEOUT: Duration = Duration::from_secs(10);

const CONSOLE_WRITE_PARAMS: &[Param] = &[
    CONSOLE_ID,
    Param::required("command", ParamKind::String, "Console command"),
];
const RUN_CONSOLE_COMMAND_PARAMS: &[Param] = &[
    Param::required("command", ParamKind::String, "Console command"),
    Param::optional("console_id", ParamKind::String, "Existing console to use"),
    Param::optional("timeout", ParamKind::Integer, "Seconds to wait (default 30)"),
];

pub(super) fn descriptors() -> Vec<OperationDescriptor> {
    vec![
        OperationDescriptor {
            name: "create_console",
            category: Category::Console,
            description: "Open a new framework console and return its id for the other \
                          console operations.",
            params: &[],
            side_effecting: true,
            prepare: prepare_create,
        },
        OperationDescriptor {
            name: "destroy_console",
            category: Category::Console,
            description: "Close a console and release its resources.",
            params: &[CONSOLE_ID],
            side_effecting: true,
            prepare: prepare_destroy,
        },
        OperationDescriptor {
            name: "list_consoles",
            category: Category::Console,
            description: "List open consoles with their prompt and busy state.",
            params: &[],
            side_effecting: false,
            prepare: prepare_list,
        },
        OperationDescriptor {
            name: "console_write",
            category: Category::Console,
            description: "Write a command line to a console. Fetch the output with \
                          console_read.",
            params: CONSOLE_WRITE_PARAMS,
            side_effecting: true,
            prepare: prepare_write,
        },
        OperationDescriptor {
            name: "console_read",
            category: Category::Console,
            description: "Read output produced by a console since the last read, with its \
                          prompt and busy state.",
            params: &[CONSOLE_ID],
            side_effecting: false,
            prepare: prepare_read,
        },
        OperationDescriptor {
            name: "run_console_command",
            category: Category::Console,
            description: "Run a console command and wait for it to finish. Uses the given \
                          console, or a temporary one that is destroyed afterwards.",
            params: RUN_CONSOLE_COMMAND_PARAMS,
            side_effecting: true,
            prepare: prepare_run,
        },
    ]
}

fn console_id(args: &Args) -> Result<ConsoleId> {
    validation::console_id(args.required_str("console_id")?)
}

fn line(command: &str) -> String {
    if command.ends_with('\n') {
        command.to_string()
    } else {
        format!("{command}\n")
    }
}

/// The service reports unknown consoles as `result: failure` rather than an error
fn check_console(reply: &Value, id: &ConsoleId) -> Result<()> {
    if reply.get("result").and_then(Value::as_str) == Some("failure") {
        return Err(BridgeError::remote(format!("Console {id} not found")));
    }
    Ok(())
}

/// Console ids arrive as strings or numbers depending on the service version
fn id_from(reply: &Value) -> Option<ConsoleId> {
    match reply.get("id")? {
        Value::String(s) => Some(ConsoleId(s.clone())),
        Value::Number(n) => Some(ConsoleId(n.to_string())),
        _ => None,
    }
}

fn prepare_create(_ctx: &CatalogContext, _args: &Args) -> Result<Call> {
    Ok(bind((), create_console))
}

async fn create_console(rpc: SharedRpc, _req: Arc<()>) -> Result<Value> {
    let reply = rpc.call("console.create", vec![]).await?;
    let id = id_from(&reply)
        .ok_or_else(|| BridgeError::remote(format!("console.create returned no id: {reply}")))?;
    Ok(json!({
        "console_id": id,
        "prompt": reply.get("prompt").cloned().unwrap_or_else(|| json!("")),
        "busy": reply.get("busy").and_then(Value::as_bool).unwrap_or(false),
    }))
}

fn prepare_destroy(_ctx: &CatalogContext, args: &Args) -> Result<Call> {
    Ok(bind(console_id(args)?, destroy_console))
}

async fn destroy_console(rpc: SharedRpc, id: Arc<ConsoleId>) -> Result<Value> {
    destroy(&rpc, &id).await?;
    Ok(json!({
        "console_id": *id,
        "destroyed": true,
    }))
}

async fn destroy(rpc: &SharedRpc, id: &ConsoleId) -> Result<()> {
    let reply = rpc.call("console.destroy", vec![json!(id)]).await?;
    check_console(&reply, id)?;
    expect_success(&reply, "console.destroy")?;
    Ok(())
}

fn prepare_list(_ctx: &CatalogContext, _args: &Args) -> Result<Call> {
    Ok(bind((), list_consoles))
}

async fn list_consoles(rpc: SharedRpc, _req: Arc<()>) -> Result<Value> {
    let reply = rpc.call("console.list", vec![]).await?;
    let consoles = reply.get("consoles").cloned().unwrap_or_else(|| json!([]));
    Ok(json!({
        "count": count(&consoles),
        "consoles": consoles,
    }))
}

struct WriteRequest {
    id: ConsoleId,
    command: String,
}

fn prepare_write(_ctx: &CatalogContext, args: &Args) -> Result<Call> {
    let req = WriteRequest {
        id: console_id(args)?,
        command: validation::command(args.required_str("command")?)?,
    };
    Ok(bind(req, console_write))
}

async fn console_write(rpc: SharedRpc, req: Arc<WriteRequest>) -> Result<Value> {
    let wrote = write(&rpc, &req.id, &req.command).await?;
    Ok(json!({
        "console_id": req.id,
        "wrote": wrote,
    }))
}

async fn write(rpc: &SharedRpc, id: &ConsoleId, command: &str) -> Result<u64> {
    let reply = rpc
        .call("console.write", vec![json!(id), json!(line(command))])
        .await?;
    check_console(&reply, id)?;
    Ok(reply.get("wrote").and_then(Value::as_u64).unwrap_or(0))
}

/// One `console.read`
struct Chunk {
    data: String,
    prompt: String,
    busy: bool,
}

async fn read(rpc: &SharedRpc, id: &ConsoleId) -> Result<Chunk> {
    let reply = rpc.call("console.read", vec![json!(id)]).await?;
    check_console(&reply, id)?;
    let text = |key: &str| {
        reply
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Ok(Chunk {
        data: text("data"),
        prompt: text("prompt"),
        busy: reply.get("busy").and_then(Value::as_bool).unwrap_or(false),
    })
}

fn prepare_read(_ctx: &CatalogContext, args: &Args) -> Result<Call> {
    Ok(bind(console_id(args)?, console_read))
}

async fn console_read(rpc: SharedRpc, id: Arc<ConsoleId>) -> Result<Value> {
    let chunk = read(&rpc, &id).await?;
    Ok(json!({
        "console_id": *id,
        "data": chunk.data,
        "prompt": chunk.prompt,
        "busy": chunk.busy,
    }))
}

struct RunRequest {
    command: String,
    console: Option<ConsoleId>,
    poll: BoundedPoll,
}

fn prepare_run(ctx: &CatalogContext, args: &Args) -> Result<Call> {
    let console = args
        .str("console_id")?
        .map(validation::console_id)
        .transpose()?;
    let timeout = timeout_arg(args, "timeout", ctx.polling.console_timeout_secs)?;
    let req = RunRequest {
        command: validation::command(args.required_str("command")?)?,
        console,
        poll: BoundedPoll::new(timeout).with_interval(ctx.polling.interval()),
    };
    Ok(bind(req, run_console_command))
}

async fn run_console_command(rpc: SharedRpc, req: Arc<RunRequest>) -> Result<Value> {
    let Some(id) = &req.console else {
        let reply = rpc.call("console.create", vec![]).await?;
        let id = id_from(&reply).ok_or_else(|| {
            BridgeError::remote(format!("console.create returned no id: {reply}"))
        })?;
        debug!(console = %id, "Created temporary console");

        let result = run_in_temporary(&rpc, &id, &req).await;
        if let Err(e) = destroy(&rpc, &id).await {
            warn!(console = %id, error = %e, "Failed to destroy temporary console");
        }
        return result;
    };

    run_in(&rpc, id, &req, &req.poll).await.map(|mut done| {
        done["console_id"] = json!(id);
        done
    })
}

async fn run_in_temporary(rpc: &SharedRpc, id: &ConsoleId, req: &RunRequest) -> Result<Value> {
    let started = Instant::now();

    // Fresh consoles print a banner first; discard it so it is not mistaken for output
    let drain =
        BoundedPoll::new(BANNER_TIMEOUT.min(req.poll.timeout)).with_interval(req.poll.interval);
    drain
        .run((), |()| {
            let rpc = rpc.clone();
            async move {
                let chunk = read(&rpc, id).await?;
                Ok::<_, BridgeError>(if chunk.busy {
                    PollState::Running(())
                } else {
                    PollState::Completed(())
                })
            }
        })
        .await?;

    let remaining = req.poll.remaining_since(started);
    if remaining.timeout.is_zero() {
        return Err(timed_out(req, String::new()));
    }
    run_in(rpc, id, req, &remaining).await
}

/// Accumulated output of one command
#[derive(Default)]
struct Transcript {
    data: String,
    prompt: String,
}

/// Write the command and poll for its output within `poll`
async fn run_in(
    rpc: &SharedRpc,
    id: &ConsoleId,
    req: &RunRequest,
    poll: &BoundedPoll,
) -> Result<Value> {
    write(rpc, id, &req.command).await?;

    let outcome = poll
        .run(Transcript::default(), |mut transcript| {
            let rpc = rpc.clone();
            async move {
                let chunk = read(&rpc, id).await?;
                transcript.data.push_str(&chunk.data);
                transcript.prompt = chunk.prompt;
                Ok::<_, BridgeError>(if chunk.busy {
                    PollState::Running(transcript)
                } else {
                    PollState::Completed(transcript)
                })
            }
        })
        .await?;

    match outcome {
        PollOutcome::Completed { state, .. } => Ok(json!({
            "data": state.data,
            "prompt": state.prompt,
        })),
        PollOutcome::TimedOut { partial, .. } => Err(timed_out(req, partial.data)),
    }
}

fn timed_out(req: &RunRequest, partial: String) -> BridgeError {
    BridgeError::timeout(
        format!(
            "Command timed out after {} seconds",
            req.poll.timeout.as_secs()
        ),
        Some(partial),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_appends_newline_once() {
        assert_eq!(line("version"), "version\n");
        assert_eq!(line("version\n"), "version\n");
    }

    #[test]
    fn test_id_from_string_or_number() {
        assert_eq!(id_from(&json!({"id": "4"})), Some(ConsoleId("4".into())));
        assert_eq!(id_from(&json!({"id": 4})), Some(ConsoleId("4".into())));
        assert_eq!(id_from(&json!({"prompt": "msf6 > "})), None);
    }

    #[test]
    fn test_failure_result_means_unknown_console() {
        let id = ConsoleId("9".into());
        assert!(check_console(&json!({"result": "failure"}), &id).is_err());
        assert!(check_console(&json!({"data": "", "busy": false}), &id).is_ok());
    }
}
