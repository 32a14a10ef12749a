//! Module introspection: list, info, search

use msf_connect::SharedRpc;
use msf_core_interface::response::string_list;
use msf_core_interface::{ModuleKey, ModuleType};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use super::{bind, Args, CatalogContext, Category, Call, OperationDescriptor, Param, ParamKind};
use crate::error::{BridgeError, Result};
use crate::validation;

const MODULE_TYPE: Param = Param::required(
    "module_type",
    ParamKind::String,
    "exploit, auxiliary, post, payload, encoder or nop",
);
const MODULE_NAME: Param = Param::required(
    "module_name",
    ParamKind::String,
    "Module path, e.g. windows/smb/ms17_010_eternalblue",
);

const LIST_MODULES_PARAMS: &[Param] = &[Param::optional(
    "type",
    ParamKind::String,
    "Restrict the listing to one module kind",
)];
const SEARCH_MODULES_PARAMS: &[Param] =
    &[Param::required("query", ParamKind::String, "Search terms")];

pub(super) fn descriptors() -> Vec<OperationDescriptor> {
    vec![
        OperationDescriptor {
            name: "list_modules",
            category: Category::Module,
            description: "List framework modules. With `type` (exploit, auxiliary, post, \
                          payload, encoder, nop) only that kind is listed; without it every \
                          kind is listed with names qualified as <type>/<name>.",
            params: LIST_MODULES_PARAMS,
            side_effecting: false,
            prepare: prepare_list,
        },
        OperationDescriptor {
            name: "module_info",
            category: Category::Module,
            description: "Describe one module: description, rank, authors, references and \
                          options, plus targets and compatible payloads for exploits.",
            params: &[MODULE_TYPE, MODULE_NAME],
            side_effecting: false,
            prepare: prepare_info,
        },
        OperationDescriptor {
            name: "search_modules",
            category: Category::Module,
            description: "Search modules by keyword, CVE, author, platform or any other \
                          term the framework's search syntax understands.",
            params: SEARCH_MODULES_PARAMS,
            side_effecting: false,
            prepare: prepare_search,
        },
    ]
}

/// Validate the `module_type`/`module_name` pair most operations take
pub(super) fn module_key(args: &Args) -> Result<ModuleKey> {
    let module_type = validation::module_type(args.required_str("module_type")?)?;
    let name = validation::module_name(args.required_str("module_name")?)?;
    Ok(ModuleKey::new(module_type, name))
}

fn prepare_list(_ctx: &CatalogContext, args: &Args) -> Result<Call> {
    let filter = args.str("type")?.map(validation::module_type).transpose()?;
    Ok(bind(filter, list_modules))
}

async fn list_modules(rpc: SharedRpc, filter: Arc<Option<ModuleType>>) -> Result<Value> {
    if let Some(module_type) = *filter {
        let modules = fetch_names(&rpc, module_type).await?;
        return Ok(json!({
            "type": module_type,
            "count": modules.len(),
            "modules": modules,
        }));
    }

    let mut modules = Vec::new();
    let mut counts = Map::new();
    for module_type in ModuleType::ALL {
        let names = fetch_names(&rpc, module_type).await?;
        counts.insert(module_type.as_str().to_string(), json!(names.len()));
        modules.extend(
            names
                .into_iter()
                .map(|name| ModuleKey::new(module_type, name).to_string()),
        );
    }
    Ok(json!({
        "count": modules.len(),
        "counts": counts,
        "modules": modules,
    }))
}

async fn fetch_names(rpc: &SharedRpc, module_type: ModuleType) -> Result<Vec<String>> {
    let reply = rpc.call(module_type.list_method(), vec![]).await?;
    Ok(string_list(&reply, "modules"))
}

fn prepare_info(_ctx: &CatalogContext, args: &Args) -> Result<Call> {
    Ok(bind(module_key(args)?, module_info))
}

async fn module_info(rpc: SharedRpc, key: Arc<ModuleKey>) -> Result<Value> {
    let module_type = json!(key.module_type);
    let name = json!(key.name);

    let info = rpc
        .call("module.info", vec![module_type.clone(), name.clone()])
        .await?;
    let options = rpc.call("module.options", vec![module_type, name.clone()]).await?;

    let targets = if key.module_type.has_targets() {
        info.get("targets").cloned().unwrap_or(Value::Null)
    } else {
        Value::Null
    };
    let payloads = if key.module_type.has_payloads() {
        let reply = rpc.call("module.compatible_payloads", vec![name]).await?;
        json!(string_list(&reply, "payloads"))
    } else {
        Value::Null
    };

    Ok(json!({
        "name": info.get("name").cloned().unwrap_or_else(|| json!(key.name)),
        "fullname": key.to_string(),
        "type": key.module_type,
        "description": info.get("description").cloned().unwrap_or(Value::Null),
        "rank": info.get("rank").cloned().unwrap_or(Value::Null),
        "authors": info.get("authors").cloned().unwrap_or_else(|| json!([])),
        "references": info.get("references").cloned().unwrap_or_else(|| json!([])),
        "options": options,
        "targets": targets,
        "payloads": payloads,
    }))
}

fn prepare_search(_ctx: &CatalogContext, args: &Args) -> Result<Call> {
    let query = args.required_str("query")?.trim().to_string();
    if query.is_empty() {
        return Err(BridgeError::invalid("Search query is empty"));
    }
    Ok(bind(query, search_modules))
}

async fn search_modules(rpc: SharedRpc, query: Arc<String>) -> Result<Value> {
    let reply = rpc.call("module.search", vec![json!(*query)]).await?;
    let modules = match reply {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("modules") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    Ok(json!({
        "query": *query,
        "count": modules.len(),
        "modules": modules,
    }))
}
