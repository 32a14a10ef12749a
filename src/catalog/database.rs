//! Engagement database: workspaces, hosts, services, vulnerabilities, imports

use msf_connect::SharedRpc;
use msf_core_interface::response::expect_success;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use super::{
    bind, count, Args, Call, CatalogContext, Category, OperationDescriptor, Param, ParamKind,
};
use crate::error::{BridgeError, Result};
use crate::validation;

const WORKSPACE_NAME: Param =
    Param::required("workspace_name", ParamKind::String, "Workspace name");
const WORKSPACE: Param = Param::optional(
    "workspace",
    ParamKind::String,
    "Workspace to query (default: current)",
);
const ADDRESSES: Param = Param::optional(
    "addresses",
    ParamKind::StringList,
    "Restrict to these IP addresses, CIDR blocks or hostnames",
);

const CURRENT_WORKSPACE_PARAMS: &[Param] = &[Param::optional(
    "workspace_name",
    ParamKind::String,
    "Workspace to switch to",
)];
const LIST_SERVICES_PARAMS: &[Param] = &[
    WORKSPACE,
    ADDRESSES,
    Param::optional("ports", ParamKind::IntegerList, "Restrict to these ports"),
    Param::optional("protocol", ParamKind::String, "tcp or udp"),
];
const IMPORT_SCAN_PARAMS: &[Param] = &[
    Param::optional("data", ParamKind::String, "Scan output to import"),
    Param::optional("file_path", ParamKind::String, "Local file to import"),
    WORKSPACE,
];

pub(super) fn descriptors() -> Vec<OperationDescriptor> {
    vec![
        OperationDescriptor {
            name: "list_workspaces",
            category: Category::Database,
            description: "List database workspaces. Each workspace holds the hosts, services \
                          and findings of one engagement.",
            params: &[],
            side_effecting: false,
            prepare: prepare_list_workspaces,
        },
        OperationDescriptor {
            name: "create_workspace",
            category: Category::Database,
            description: "Create a workspace.",
            params: &[WORKSPACE_NAME],
            side_effecting: true,
            prepare: prepare_create,
        },
        OperationDescriptor {
            name: "delete_workspace",
            category: Category::Database,
            description: "Delete a workspace together with all of its data. This cannot be \
                          undone.",
            params: &[WORKSPACE_NAME],
            side_effecting: true,
            prepare: prepare_delete,
        },
        OperationDescriptor {
            name: "current_workspace",
            category: Category::Database,
            description: "Report the current workspace, or switch to `workspace_name` when \
                          it is given.",
            params: CURRENT_WORKSPACE_PARAMS,
            side_effecting: false,
            prepare: prepare_current,
        },
        OperationDescriptor {
            name: "list_hosts",
            category: Category::Database,
            description: "List discovered hosts with address, OS and other details.",
            params: &[WORKSPACE, ADDRESSES],
            side_effecting: false,
            prepare: prepare_hosts,
        },
        OperationDescriptor {
            name: "list_services",
            category: Category::Database,
            description: "List discovered services with host, port, protocol, name and state.",
            params: LIST_SERVICES_PARAMS,
            side_effecting: false,
            prepare: prepare_services,
        },
        OperationDescriptor {
            name: "list_vulns",
            category: Category::Database,
            description: "List recorded vulnerabilities with affected host and references.",
            params: &[WORKSPACE, ADDRESSES],
            side_effecting: false,
            prepare: prepare_vulns,
        },
        OperationDescriptor {
            name: "import_scan",
            category: Category::Database,
            description: "Import scanner output (nmap XML, Nessus, ...) into a workspace. \
                          Pass the content as `data` or a local file as `file_path`.",
            params: IMPORT_SCAN_PARAMS,
            side_effecting: true,
            prepare: prepare_import,
        },
    ]
}

fn workspace(args: &Args, key: &str) -> Result<Option<String>> {
    args.str(key)?.map(validation::workspace_name).transpose()
}

fn addresses(args: &Args) -> Result<Option<Vec<String>>> {
    args.str_list("addresses")?
        .map(|list| {
            list.iter()
                .map(|a| validation::address(a))
                .collect::<Result<Vec<_>>>()
        })
        .transpose()
}

fn prepare_list_workspaces(_ctx: &CatalogContext, _args: &Args) -> Result<Call> {
    Ok(bind((), list_workspaces))
}

async fn list_workspaces(rpc: SharedRpc, _req: Arc<()>) -> Result<Value> {
    let reply = rpc.call("db.workspaces", vec![]).await?;
    let workspaces = reply.get("workspaces").cloned().unwrap_or_else(|| json!([]));
    Ok(json!({
        "count": count(&workspaces),
        "workspaces": workspaces,
    }))
}

fn prepare_create(_ctx: &CatalogContext, args: &Args) -> Result<Call> {
    let name = validation::workspace_name(args.required_str("workspace_name")?)?;
    Ok(bind(name, create_workspace))
}

async fn create_workspace(rpc: SharedRpc, name: Arc<String>) -> Result<Value> {
    let reply = rpc.call("db.add_workspace", vec![json!(*name)]).await?;
    expect_success(&reply, "db.add_workspace")?;
    Ok(json!({
        "workspace": *name,
        "created": true,
    }))
}

fn prepare_delete(_ctx: &CatalogContext, args: &Args) -> Result<Call> {
    let name = validation::workspace_name(args.required_str("workspace_name")?)?;
    Ok(bind(name, delete_workspace))
}

async fn delete_workspace(rpc: SharedRpc, name: Arc<String>) -> Result<Value> {
    let reply = rpc.call("db.del_workspace", vec![json!(*name)]).await?;
    expect_success(&reply, "db.del_workspace")?;
    Ok(json!({
        "workspace": *name,
        "deleted": true,
    }))
}

fn prepare_current(_ctx: &CatalogContext, args: &Args) -> Result<Call> {
    Ok(bind(workspace(args, "workspace_name")?, current_workspace))
}

async fn current_workspace(rpc: SharedRpc, switch_to: Arc<Option<String>>) -> Result<Value> {
    if let Some(name) = switch_to.as_ref() {
        let reply = rpc.call("db.set_workspace", vec![json!(name)]).await?;
        expect_success(&reply, "db.set_workspace")?;
        return Ok(json!({
            "workspace": name,
            "switched": true,
        }));
    }

    let reply = rpc.call("db.current_workspace", vec![]).await?;
    Ok(json!({
        "workspace": reply.get("workspace").cloned().unwrap_or(Value::Null),
        "workspace_id": reply.get("workspace_id").cloned().unwrap_or(Value::Null),
    }))
}

/// Filters for the host/service/vuln queries, sent as the option hash
#[derive(Debug, Default, PartialEq)]
struct Query {
    workspace: Option<String>,
    addresses: Option<Vec<String>>,
    ports: Option<String>,
    protocol: Option<String>,
}

impl Query {
    fn from_args(args: &Args) -> Result<Self> {
        Ok(Self {
            workspace: workspace(args, "workspace")?,
            addresses: addresses(args)?,
            ..Default::default()
        })
    }

    fn options(&self) -> Value {
        let mut opts = Map::new();
        if let Some(workspace) = &self.workspace {
            opts.insert("workspace".into(), json!(workspace));
        }
        if let Some(addresses) = &self.addresses {
            opts.insert("addresses".into(), json!(addresses));
        }
        if let Some(ports) = &self.ports {
            opts.insert("ports".into(), json!(ports));
        }
        if let Some(protocol) = &self.protocol {
            opts.insert("proto".into(), json!(protocol));
        }
        Value::Object(opts)
    }
}

/// Run a `db.*` listing and return `{<member>, count}`
async fn listing(rpc: &SharedRpc, method: &str, member: &str, query: &Query) -> Result<Value> {
    let reply = rpc.call(method, vec![query.options()]).await?;
    let items = reply.get(member).cloned().unwrap_or_else(|| json!([]));
    let mut result = Map::new();
    result.insert("count".into(), json!(count(&items)));
    result.insert(member.into(), items);
    if let Some(workspace) = &query.workspace {
        result.insert("workspace".into(), json!(workspace));
    }
    Ok(Value::Object(result))
}

fn prepare_hosts(_ctx: &CatalogContext, args: &Args) -> Result<Call> {
    Ok(bind(Query::from_args(args)?, list_hosts))
}

async fn list_hosts(rpc: SharedRpc, query: Arc<Query>) -> Result<Value> {
    listing(&rpc, "db.hosts", "hosts", &query).await
}

fn prepare_services(_ctx: &CatalogContext, args: &Args) -> Result<Call> {
    let mut query = Query::from_args(args)?;
    if let Some(ports) = args.u64_list("ports")? {
        for port in &ports {
            if *port == 0 || *port > u64::from(u16::MAX) {
                return Err(BridgeError::invalid(format!("Invalid port: {port}")));
            }
        }
        if !ports.is_empty() {
            let joined: Vec<String> = ports.iter().map(u64::to_string).collect();
            query.ports = Some(joined.join(","));
        }
    }
    query.protocol = args.str("protocol")?.map(validation::protocol).transpose()?;
    Ok(bind(query, list_services))
}

async fn list_services(rpc: SharedRpc, query: Arc<Query>) -> Result<Value> {
    listing(&rpc, "db.services", "services", &query).await
}

fn prepare_vulns(_ctx: &CatalogContext, args: &Args) -> Result<Call> {
    Ok(bind(Query::from_args(args)?, list_vulns))
}

async fn list_vulns(rpc: SharedRpc, query: Arc<Query>) -> Result<Value> {
    listing(&rpc, "db.vulns", "vulns", &query).await
}

enum ImportSource {
    Inline(String),
    File(PathBuf),
}

struct ImportRequest {
    source: ImportSource,
    workspace: Option<String>,
}

fn prepare_import(_ctx: &CatalogContext, args: &Args) -> Result<Call> {
    let source = match (args.str("data")?, args.str("file_path")?) {
        (Some(data), None) if !data.trim().is_empty() => ImportSource::Inline(data.to_string()),
        (Some(_), None) => return Err(BridgeError::invalid("Import data is empty")),
        (None, Some(path)) => ImportSource::File(PathBuf::from(path)),
        (Some(_), Some(_)) => {
            return Err(BridgeError::invalid(
                "Pass either 'data' or 'file_path', not both",
            ))
        }
        (None, None) => {
            return Err(BridgeError::invalid(
                "One of 'data' or 'file_path' is required",
            ))
        }
    };
    let req = ImportRequest {
        source,
        workspace: workspace(args, "workspace")?,
    };
    Ok(bind(req, import_scan))
}

async fn import_scan(rpc: SharedRpc, req: Arc<ImportRequest>) -> Result<Value> {
    let data = match &req.source {
        ImportSource::Inline(data) => data.clone(),
        ImportSource::File(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
            BridgeError::invalid(format!("Cannot read scan file {}: {e}", path.display()))
        })?,
    };

    let mut opts = Map::new();
    opts.insert("data".into(), json!(data));
    if let Some(workspace) = &req.workspace {
        opts.insert("workspace".into(), json!(workspace));
    }

    info!(bytes = data.len(), workspace = ?req.workspace, "Importing scan data");
    let reply = rpc.call("db.import_data", vec![Value::Object(opts)]).await?;
    expect_success(&reply, "db.import_data")?;
    Ok(json!({
        "imported": true,
        "bytes": data.len(),
        "workspace": req.workspace,
    }))
}
