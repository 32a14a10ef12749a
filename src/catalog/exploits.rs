//! Exploit-specific operations: launch, check, payload compatibility, options

use msf_connect::SharedRpc;
use msf_core_interface::response::string_list;
use msf_core_interface::{ModuleKey, ModuleType};
use msf_core_resilience::{BoundedPoll, PollOutcome, PollState};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::execution::{get_options, launch, option_map, ExecuteRequest};
use super::{
    bind, timeout_arg, Args, Call, CatalogContext, Category, OperationDescriptor, Param, ParamKind,
};
use crate::error::{BridgeError, Result};
use crate::validation;

const MODULE_NAME: Param = Param::required(
    "module_name",
    ParamKind::String,
    "Exploit path, e.g. windows/smb/ms17_010_eternalblue",
);
const OPTIONS: Param = Param::required(
    "options",
    ParamKind::Object,
    "Option name to value, e.g. {\"RHOSTS\": \"10.0.0.5\"}",
);

const EXECUTE_EXPLOIT_MODULE_PARAMS: &[Param] = &[
    MODULE_NAME,
    OPTIONS,
    Param::optional("payload", ParamKind::String, "Payload module path"),
    Param::optional(
        "payload_options",
        ParamKind::Object,
        "Payload options, e.g. LHOST",
    ),
    Param::optional(
        "wait_for_session",
        ParamKind::Integer,
        "Seconds to wait for a session (0 = do not wait)",
    ),
];
const CHECK_EXPLOIT_PARAMS: &[Param] = &[
    MODULE_NAME,
    OPTIONS,
    Param::optional("timeout", ParamKind::Integer, "Seconds to wait (default 60)"),
];
const LIST_COMPATIBLE_PAYLOADS_PARAMS: &[Param] = &[
    MODULE_NAME,
    Param::optional("target", ParamKind::Integer, "Target index"),
];

pub(super) fn descriptors() -> Vec<OperationDescriptor> {
    vec![
        OperationDescriptor {
            name: "execute_exploit_module",
            category: Category::Exploit,
            description: "Launch an exploit against a target, optionally choosing the payload \
                          and waiting for a session to open. Returns the job id, uuid and the \
                          new session if one appeared.",
            params: EXECUTE_EXPLOIT_MODULE_PARAMS,
            side_effecting: true,
            prepare: prepare_execute,
        },
        OperationDescriptor {
            name: "check_exploit",
            category: Category::Exploit,
            description: "Ask an exploit whether the target looks vulnerable without \
                          exploiting it.",
            params: CHECK_EXPLOIT_PARAMS,
            side_effecting: false,
            prepare: prepare_check,
        },
        OperationDescriptor {
            name: "list_compatible_payloads",
            category: Category::Exploit,
            description: "List payloads usable with an exploit, optionally for one target index.",
            params: LIST_COMPATIBLE_PAYLOADS_PARAMS,
            side_effecting: false,
            prepare: prepare_payloads,
        },
        OperationDescriptor {
            name: "get_module_options",
            category: Category::Exploit,
            description: "List an exploit's options with descriptions and required flags.",
            params: &[MODULE_NAME],
            side_effecting: false,
            prepare: prepare_options,
        },
    ]
}

fn exploit_key(args: &Args) -> Result<ModuleKey> {
    let name = validation::module_name(args.required_str("module_name")?)?;
    Ok(ModuleKey::new(ModuleType::Exploit, name))
}

struct LaunchRequest {
    execute: ExecuteRequest,
    wait: Option<BoundedPoll>,
}

fn prepare_execute(ctx: &CatalogContext, args: &Args) -> Result<Call> {
    let key = exploit_key(args)?;
    let mut explicit = option_map(args.object("options")?)?;

    if let Some(payload) = args.str("payload")? {
        explicit.insert("PAYLOAD".into(), json!(validation::module_name(payload)?));
    }
    explicit.extend(option_map(args.object("payload_options")?)?);

    let wait = match args.u64("wait_for_session")? {
        None | Some(0) => None,
        Some(secs) => Some(
            BoundedPoll::new(validation::timeout_secs(secs)?)
                .with_interval(ctx.polling.interval()),
        ),
    };

    let options = ctx.staged.merged(&key, explicit);
    Ok(bind(
        LaunchRequest {
            execute: ExecuteRequest { key, options },
            wait,
        },
        execute_exploit,
    ))
}

async fn execute_exploit(rpc: SharedRpc, req: Arc<LaunchRequest>) -> Result<Value> {
    let (job_id, uuid) = launch(&rpc, &req.execute).await?;
    let mut result = json!({
        "job_id": job_id,
        "uuid": uuid,
        "status": "success",
    });

    if let Some(poll) = req.wait {
        result["session"] = wait_for_session(&rpc, &uuid, poll).await?;
    }
    Ok(result)
}

/// Poll the session list for one opened by the run with `uuid`
async fn wait_for_session(rpc: &SharedRpc, uuid: &str, poll: BoundedPoll) -> Result<Value> {
    let outcome = poll
        .run(Value::Null, |_| {
            let rpc = rpc.clone();
            async move {
                let sessions = rpc.call("session.list", vec![]).await?;
                let found = sessions.as_object().and_then(|all| {
                    all.iter().find(|(_, info)| {
                        info.get("exploit_uuid").and_then(Value::as_str) == Some(uuid)
                    })
                });
                Ok::<_, BridgeError>(match found {
                    Some((id, info)) => {
                        let session_id = id.parse::<u32>().map(Value::from);
                        PollState::Completed(json!({
                            "session_id": session_id.unwrap_or_else(|_| json!(id)),
                            "info": info,
                        }))
                    }
                    None => PollState::Running(Value::Null),
                })
            }
        })
        .await?;

    match outcome {
        PollOutcome::Completed { state, .. } => {
            info!(uuid, "Exploit opened a session");
            Ok(state)
        }
        PollOutcome::TimedOut { .. } => {
            warn!(uuid, timeout = ?poll.timeout, "No session opened before the wait ended");
            Ok(Value::Null)
        }
    }
}

struct CheckRequest {
    execute: ExecuteRequest,
    poll: BoundedPoll,
}

fn prepare_check(ctx: &CatalogContext, args: &Args) -> Result<Call> {
    let key = exploit_key(args)?;
    let explicit = option_map(args.object("options")?)?;
    let timeout = timeout_arg(args, "timeout", ctx.polling.check_timeout_secs)?;
    let options = ctx.staged.merged(&key, explicit);
    Ok(bind(
        CheckRequest {
            execute: ExecuteRequest { key, options },
            poll: BoundedPoll::new(timeout).with_interval(ctx.polling.interval()),
        },
        check_exploit,
    ))
}

async fn check_exploit(rpc: SharedRpc, req: Arc<CheckRequest>) -> Result<Value> {
    let key = &req.execute.key;
    let reply = rpc
        .call(
            "module.check",
            vec![
                json!(key.module_type),
                json!(key.name),
                Value::Object(req.execute.options.clone()),
            ],
        )
        .await?;

    // Older services answer synchronously with the check result itself
    let Some(uuid) = reply.get("uuid").and_then(Value::as_str) else {
        return Ok(check_verdict(&reply));
    };

    let outcome = req
        .poll
        .run(Value::Null, |_| {
            let rpc = rpc.clone();
            async move {
                let status = rpc.call("module.results", vec![json!(uuid)]).await?;
                let state = match status.get("status").and_then(Value::as_str) {
                    Some("running") | Some("ready") => PollState::Running(Value::Null),
                    Some("errored") => {
                        let reason = status.get("error").and_then(Value::as_str);
                        return Err(BridgeError::remote(format!(
                            "Check failed: {}",
                            reason.unwrap_or("unknown error")
                        )));
                    }
                    _ => PollState::Completed(status.get("result").cloned().unwrap_or(Value::Null)),
                };
                Ok::<_, BridgeError>(state)
            }
        })
        .await?;

    match outcome {
        PollOutcome::Completed { state, .. } => Ok(check_verdict(&state)),
        PollOutcome::TimedOut { .. } => Err(BridgeError::timeout(
            format!(
                "Check of {} timed out after {} seconds",
                key,
                req.poll.timeout.as_secs()
            ),
            None,
        )),
    }
}

/// Reduce a check result to a verdict. The code is `vulnerable`, `appears`,
/// `detected`, `safe`, `unknown` or `unsupported`.
fn check_verdict(result: &Value) -> Value {
    let code = result
        .get("code")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    json!({
        "vulnerable": code == "vulnerable",
        "code": code,
        "message": result.get("message").cloned().unwrap_or(Value::Null),
        "result": result,
    })
}

struct PayloadRequest {
    key: ModuleKey,
    target: Option<u32>,
}

fn prepare_payloads(_ctx: &CatalogContext, args: &Args) -> Result<Call> {
    let req = PayloadRequest {
        key: exploit_key(args)?,
        target: args.u32("target")?,
    };
    Ok(bind(req, list_compatible_payloads))
}

async fn list_compatible_payloads(rpc: SharedRpc, req: Arc<PayloadRequest>) -> Result<Value> {
    let reply = match req.target {
        Some(target) => {
            rpc.call(
                "module.target_compatible_payloads",
                vec![json!(req.key.name), json!(target)],
            )
            .await?
        }
        None => {
            rpc.call("module.compatible_payloads", vec![json!(req.key.name)])
                .await?
        }
    };
    let payloads = string_list(&reply, "payloads");
    Ok(json!({
        "module": req.key.to_string(),
        "target": req.target,
        "count": payloads.len(),
        "payloads": payloads,
    }))
}

fn prepare_options(_ctx: &CatalogContext, args: &Args) -> Result<Call> {
    Ok(bind(exploit_key(args)?, get_options))
}
