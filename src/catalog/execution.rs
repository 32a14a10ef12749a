//! Module execution: execute, get options, stage one option

use msf_connect::SharedRpc;
use msf_core_interface::ModuleKey;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;

use super::modules::module_key;
use super::{bind, Args, CatalogContext, Category, Call, OperationDescriptor, Param, ParamKind};
use crate::error::{BridgeError, Result};
use crate::validation;

const MODULE_TYPE: Param = Param::required(
    "module_type",
    ParamKind::String,
    "exploit, auxiliary, post, payload, encoder or nop",
);
const MODULE_NAME: Param = Param::required("module_name", ParamKind::String, "Module path");

const EXECUTE_MODULE_PARAMS: &[Param] = &[
    MODULE_TYPE,
    MODULE_NAME,
    Param::optional("options", ParamKind::Object, "Option name to value"),
];
const SET_OPTION_PARAMS: &[Param] = &[
    MODULE_TYPE,
    MODULE_NAME,
    Param::required("option_name", ParamKind::String, "Option name, e.g. RHOSTS"),
    Param::required("option_value", ParamKind::String, "Value to stage"),
];

pub(super) fn descriptors() -> Vec<OperationDescriptor> {
    vec![
        OperationDescriptor {
            name: "execute_module",
            category: Category::Execution,
            description: "Run a module with the given options, e.g. {\"RHOSTS\": \"192.168.1.1\"}. \
                          Options staged with set_option are applied underneath. Returns the \
                          job id and uuid of the launched run.",
            params: EXECUTE_MODULE_PARAMS,
            side_effecting: true,
            prepare: prepare_execute,
        },
        OperationDescriptor {
            name: "get_options",
            category: Category::Execution,
            description: "List a module's options with their type, default, description and \
                          whether they are required.",
            params: &[MODULE_TYPE, MODULE_NAME],
            side_effecting: false,
            prepare: prepare_get_options,
        },
        OperationDescriptor {
            name: "set_option",
            category: Category::Execution,
            description: "Stage one option (e.g. RHOSTS) for a module. The option must exist \
                          on the module; staged values are used by later executions of it.",
            params: SET_OPTION_PARAMS,
            side_effecting: false,
            prepare: prepare_set_option,
        },
    ]
}

/// Validate an option map: alphanumeric names and scalar values
pub(super) fn option_map(raw: Option<&Map<String, Value>>) -> Result<Map<String, Value>> {
    let mut options = Map::new();
    for (name, value) in raw.into_iter().flatten() {
        let name = validation::option_name(name)?;
        match value {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                options.insert(name, value.clone());
            }
            Value::Null => {}
            _ => {
                return Err(BridgeError::invalid(format!(
                    "Option '{name}' must be a string, number or boolean"
                )))
            }
        }
    }
    Ok(options)
}

pub(super) struct ExecuteRequest {
    pub key: ModuleKey,
    pub options: Map<String, Value>,
}

fn prepare_execute(ctx: &CatalogContext, args: &Args) -> Result<Call> {
    let key = module_key(args)?;
    let explicit = option_map(args.object("options")?)?;
    let options = ctx.staged.merged(&key, explicit);
    Ok(bind(ExecuteRequest { key, options }, execute_module))
}

async fn execute_module(rpc: SharedRpc, req: Arc<ExecuteRequest>) -> Result<Value> {
    let (job_id, uuid) = launch(&rpc, &req).await?;
    Ok(json!({
        "job_id": job_id,
        "uuid": uuid,
        "status": "success",
    }))
}

/// Call `module.execute` and pull the job id and run uuid out of the reply
pub(super) async fn launch(rpc: &SharedRpc, req: &ExecuteRequest) -> Result<(Value, String)> {
    info!(module = %req.key, options = req.options.len(), "Executing module");
    let reply = rpc
        .call(
            "module.execute",
            vec![
                json!(req.key.module_type),
                json!(req.key.name),
                Value::Object(req.options.clone()),
            ],
        )
        .await?;

    let uuid = reply.get("uuid").and_then(Value::as_str).map(str::to_string);
    let job_id = reply.get("job_id").filter(|id| !id.is_null()).cloned();
    match (job_id, uuid) {
        (Some(job_id), Some(uuid)) => Ok((job_id, uuid)),
        _ => Err(BridgeError::remote(format!(
            "Execution of {} was not accepted: {}",
            req.key, reply
        ))),
    }
}

fn prepare_get_options(_ctx: &CatalogContext, args: &Args) -> Result<Call> {
    Ok(bind(module_key(args)?, get_options))
}

pub(super) async fn get_options(rpc: SharedRpc, key: Arc<ModuleKey>) -> Result<Value> {
    let options = fetch_options(&rpc, &key).await?;
    Ok(json!({
        "module": key.to_string(),
        "options": options,
    }))
}

async fn fetch_options(rpc: &SharedRpc, key: &ModuleKey) -> Result<Value> {
    Ok(rpc
        .call(
            "module.options",
            vec![json!(key.module_type), json!(key.name)],
        )
        .await?)
}

struct SetOptionRequest {
    key: ModuleKey,
    option: String,
    value: Value,
    ctx: CatalogContext,
}

fn prepare_set_option(ctx: &CatalogContext, args: &Args) -> Result<Call> {
    let key = module_key(args)?;
    let option = validation::option_name(args.required_str("option_name")?)?;
    let value = json!(args.required_str("option_value")?);
    Ok(bind(
        SetOptionRequest {
            key,
            option,
            value,
            ctx: ctx.clone(),
        },
        set_option,
    ))
}

async fn set_option(rpc: SharedRpc, req: Arc<SetOptionRequest>) -> Result<Value> {
    let schema = fetch_options(&rpc, &req.key).await?;

    // Datastore keys are case-insensitive on the remote side
    let canonical = schema
        .as_object()
        .and_then(|opts| opts.keys().find(|k| k.eq_ignore_ascii_case(&req.option)))
        .cloned()
        .ok_or_else(|| {
            BridgeError::remote(format!("{} has no option named {}", req.key, req.option))
        })?;

    req.ctx.staged.stage(&req.key, canonical.clone(), req.value.clone());
    Ok(json!({
        "module": req.key.to_string(),
        "option": canonical,
        "value": req.value,
        "staged": true,
    }))
}
