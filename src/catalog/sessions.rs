//! Live sessions
//!
//! Read and write calls differ between shell and meterpreter sessions. The
//! session's kind is looked up once per call and decides which remote methods
//! are legal, so asking a meterpreter session for shell output fails with a
//! pointer at the right operation instead of an opaque remote error.

use msf_connect::SharedRpc;
use msf_core_interface::{SessionId, SessionKind};
use msf_core_resilience::{BoundedPoll, PollOutcome, PollState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::{
    bind, count, timeout_arg, Args, Call, CatalogContext, Category, OperationDescriptor, Param,
    ParamKind,
};
use crate::error::{BridgeError, Result};
use crate::validation;

const SESSION_ID: Param = Param::required("session_id", ParamKind::Integer, "Session id");
const COMMAND: Param = Param::required("command", ParamKind::String, "Command to send");

const SESSION_RUN_WITH_OUTPUT_PARAMS: &[Param] = &[
    SESSION_ID,
    COMMAND,
    Param::optional(
        "end_strings",
        ParamKind::StringList,
        "Markers that signal the command finished",
    ),
    Param::optional("timeout", ParamKind::Integer, "Seconds to wait (default 310)"),
];

pub(super) fn descriptors() -> Vec<OperationDescriptor> {
    vec![
        OperationDescriptor {
            name: "list_sessions",
            category: Category::Session,
            description: "List live sessions with their type (shell or meterpreter), target \
                          host, tunnel and the exploit that opened them.",
            params: &[],
            side_effecting: false,
            prepare: prepare_list,
        },
        OperationDescriptor {
            name: "session_shell_read",
            category: Category::Session,
            description: "Read pending output from a shell session.",
            params: &[SESSION_ID],
            side_effecting: false,
            prepare: prepare_shell_read,
        },
        OperationDescriptor {
            name: "session_shell_write",
            category: Category::Session,
            description: "Send a command line to a shell session. Read the result with \
                          session_shell_read.",
            params: &[SESSION_ID, COMMAND],
            side_effecting: true,
            prepare: prepare_shell_write,
        },
        OperationDescriptor {
            name: "session_meterpreter_read",
            category: Category::Session,
            description: "Read pending output from a meterpreter session.",
            params: &[SESSION_ID],
            side_effecting: false,
            prepare: prepare_meterpreter_read,
        },
        OperationDescriptor {
            name: "session_meterpreter_write",
            category: Category::Session,
            description: "Send a command (sysinfo, getuid, ps, ...) to a meterpreter session.",
            params: &[SESSION_ID, COMMAND],
            side_effecting: true,
            prepare: prepare_meterpreter_write,
        },
        OperationDescriptor {
            name: "session_run_with_output",
            category: Category::Session,
            description: "Run a command in a session of either kind and wait for its output. \
                          Finishes when one of `end_strings` appears, or when output stops \
                          arriving if none are given.",
            params: SESSION_RUN_WITH_OUTPUT_PARAMS,
            side_effecting: true,
            prepare: prepare_run_with_output,
        },
        OperationDescriptor {
            name: "stop_session",
            category: Category::Session,
            description: "Terminate a session. This closes the connection to the target.",
            params: &[SESSION_ID],
            side_effecting: true,
            prepare: prepare_stop,
        },
    ]
}

fn session_id(args: &Args) -> Result<SessionId> {
    Ok(SessionId(args.required_u32("session_id")?))
}

/// Shells expect a full line; meterpreter takes the bare command
fn terminated(kind: SessionKind, command: &str) -> String {
    match kind {
        SessionKind::Shell if !command.ends_with('\n') => format!("{command}\n"),
        _ => command.to_string(),
    }
}

/// Look up a session and classify it
async fn session_kind(rpc: &SharedRpc, id: SessionId) -> Result<SessionKind> {
    let sessions = rpc.call("session.list", vec![]).await?;
    let entry = sessions
        .get(id.to_string())
        .ok_or_else(|| BridgeError::remote(format!("Session {id} not found")))?;
    let remote_type = entry.get("type").and_then(Value::as_str).unwrap_or_default();
    SessionKind::from_remote_type(remote_type).ok_or_else(|| {
        BridgeError::remote(format!(
            "Session {id} has unsupported type '{remote_type}'"
        ))
    })
}

async fn expect_kind(
    rpc: &SharedRpc,
    id: SessionId,
    expected: SessionKind,
    verb: &str,
) -> Result<()> {
    let actual = session_kind(rpc, id).await?;
    if actual != expected {
        return Err(BridgeError::remote(format!(
            "Session {id} is a {actual} session; use session_{actual}_{verb}"
        )));
    }
    Ok(())
}

fn prepare_list(_ctx: &CatalogContext, _args: &Args) -> Result<Call> {
    Ok(bind((), list_sessions))
}

async fn list_sessions(rpc: SharedRpc, _req: Arc<()>) -> Result<Value> {
    let sessions = rpc.call("session.list", vec![]).await?;
    let sessions = match sessions {
        Value::Object(_) => sessions,
        _ => json!({}),
    };
    Ok(json!({
        "count": count(&sessions),
        "sessions": sessions,
    }))
}

struct ReadRequest {
    id: SessionId,
    kind: SessionKind,
}

fn prepare_shell_read(_ctx: &CatalogContext, args: &Args) -> Result<Call> {
    let req = ReadRequest {
        id: session_id(args)?,
        kind: SessionKind::Shell,
    };
    Ok(bind(req, read_session))
}

fn prepare_meterpreter_read(_ctx: &CatalogContext, args: &Args) -> Result<Call> {
    let req = ReadRequest {
        id: session_id(args)?,
        kind: SessionKind::Meterpreter,
    };
    Ok(bind(req, read_session))
}

async fn read_session(rpc: SharedRpc, req: Arc<ReadRequest>) -> Result<Value> {
    expect_kind(&rpc, req.id, req.kind, "read").await?;
    let reply = rpc.call(req.kind.read_method(), vec![json!(req.id)]).await?;
    Ok(json!({
        "session_id": req.id,
        "data": reply.get("data").and_then(Value::as_str).unwrap_or_default(),
    }))
}

struct WriteRequest {
    id: SessionId,
    kind: SessionKind,
    command: String,
}

fn prepare_shell_write(_ctx: &CatalogContext, args: &Args) -> Result<Call> {
    let req = WriteRequest {
        id: session_id(args)?,
        kind: SessionKind::Shell,
        command: validation::command(args.required_str("command")?)?,
    };
    Ok(bind(req, write_session))
}

fn prepare_meterpreter_write(_ctx: &CatalogContext, args: &Args) -> Result<Call> {
    let req = WriteRequest {
        id: session_id(args)?,
        kind: SessionKind::Meterpreter,
        command: validation::command(args.required_str("command")?)?,
    };
    Ok(bind(req, write_session))
}

async fn write_session(rpc: SharedRpc, req: Arc<WriteRequest>) -> Result<Value> {
    expect_kind(&rpc, req.id, req.kind, "write").await?;
    let line = terminated(req.kind, &req.command);
    rpc.call(req.kind.write_method(), vec![json!(req.id), json!(line)])
        .await?;
    Ok(json!({
        "session_id": req.id,
        "written": true,
    }))
}

struct RunRequest {
    id: SessionId,
    command: String,
    end_strings: Vec<String>,
    poll: BoundedPoll,
}

fn prepare_run_with_output(ctx: &CatalogContext, args: &Args) -> Result<Call> {
    let timeout = timeout_arg(args, "timeout", ctx.polling.session_timeout_secs)?;
    let end_strings = args
        .str_list("end_strings")?
        .unwrap_or_default()
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();
    let req = RunRequest {
        id: session_id(args)?,
        command: validation::command(args.required_str("command")?)?,
        end_strings,
        poll: BoundedPoll::new(timeout).with_interval(ctx.polling.interval()),
    };
    Ok(bind(req, run_with_output))
}

/// Accumulated output and whether any has arrived yet
#[derive(Default)]
struct Captured {
    output: String,
    seen: bool,
}

async fn run_with_output(rpc: SharedRpc, req: Arc<RunRequest>) -> Result<Value> {
    let kind = session_kind(&rpc, req.id).await?;
    let line = terminated(kind, &req.command);
    rpc.call(kind.write_method(), vec![json!(req.id), json!(line)])
        .await?;

    let id = req.id;
    let end_strings = &req.end_strings;
    let outcome = req
        .poll
        .run(Captured::default(), |mut captured| {
            let rpc = rpc.clone();
            async move {
                let reply = rpc.call(kind.read_method(), vec![json!(id)]).await?;
                let chunk = reply.get("data").and_then(Value::as_str).unwrap_or_default();

                captured.output.push_str(chunk);
                let done = if end_strings.is_empty() {
                    chunk.is_empty() && captured.seen
                } else {
                    end_strings.iter().any(|end| captured.output.contains(end.as_str()))
                };
                captured.seen |= !chunk.is_empty();

                Ok::<_, BridgeError>(if done {
                    PollState::Completed(captured)
                } else {
                    PollState::Running(captured)
                })
            }
        })
        .await?;

    match outcome {
        PollOutcome::Completed { state, elapsed } => Ok(json!({
            "session_id": id,
            "session_type": kind,
            "output": state.output,
            "elapsed_secs": secs(elapsed),
        })),
        PollOutcome::TimedOut { partial, .. } => Err(BridgeError::timeout(
            format!(
                "Command timed out after {} seconds in session {id}",
                req.poll.timeout.as_secs()
            ),
            Some(partial.output),
        )),
    }
}

fn secs(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1000.0).round() / 1000.0
}

fn prepare_stop(_ctx: &CatalogContext, args: &Args) -> Result<Call> {
    Ok(bind(session_id(args)?, stop_session))
}

async fn stop_session(rpc: SharedRpc, id: Arc<SessionId>) -> Result<Value> {
    let reply = rpc.call("session.stop", vec![json!(*id)]).await?;
    msf_core_interface::response::expect_success(&reply, "session.stop")?;
    Ok(json!({
        "session_id": *id,
        "stopped": true,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_commands_are_newline_terminated() {
        assert_eq!(terminated(SessionKind::Shell, "id"), "id\n");
        assert_eq!(terminated(SessionKind::Shell, "id\n"), "id\n");
        assert_eq!(terminated(SessionKind::Meterpreter, "sysinfo"), "sysinfo");
    }

    #[test]
    fn test_elapsed_rounding() {
        assert_eq!(secs(Duration::from_millis(1500)), 1.5);
        assert_eq!(secs(Duration::from_micros(2_000_400)), 2.0);
    }
}
