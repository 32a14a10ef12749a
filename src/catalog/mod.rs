/*!
 * The operation catalog
 *
 * Each operation is an `OperationDescriptor`: a name, a category, a parameter
 * list rendered as JSON Schema, and a `prepare` function. Preparing an
 * operation is the validation stage. It turns raw JSON arguments into a typed
 * request, or rejects them, without touching the connection. The result is a
 * `Call`, a re-invocable closure over that request which the dispatcher runs
 * against whatever handle the reconnect policy hands it.
 */

pub mod args;
mod consoles;
mod database;
mod execution;
mod exploits;
mod jobs;
mod modules;
mod sessions;
pub mod staging;

use futures::future::BoxFuture;
use msf_connect::SharedRpc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::config::PollingConfig;
use crate::error::{BridgeError, Result};

pub use args::Args;
pub use staging::StagedOptions;

/// One prepared remote interaction, callable again for the single retry
pub type Call = Box<dyn Fn(SharedRpc) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Validation stage of an operation
pub type Prepare = fn(&CatalogContext, &Args) -> Result<Call>;

/// Bind a validated request to its handler
///
/// The request is shared between attempts, so a retried call sees exactly the
/// arguments the first attempt saw.
pub fn bind<R, F, Fut>(request: R, handler: F) -> Call
where
    R: Send + Sync + 'static,
    F: Fn(SharedRpc, Arc<R>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    let request = Arc::new(request);
    Box::new(move |rpc| Box::pin(handler(rpc, request.clone())))
}

/// State operations share beyond their own arguments
#[derive(Debug, Clone, Default)]
pub struct CatalogContext {
    pub polling: PollingConfig,
    pub staged: Arc<StagedOptions>,
}

impl CatalogContext {
    pub fn new(polling: PollingConfig) -> Self {
        Self {
            polling,
            staged: Arc::new(StagedOptions::new()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Module,
    Execution,
    Session,
    Console,
    Job,
    Exploit,
    Database,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Module => "module",
            Category::Execution => "execution",
            Category::Session => "session",
            Category::Console => "console",
            Category::Job => "job",
            Category::Exploit => "exploit",
            Category::Database => "database",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON type of a declared parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Boolean,
    Object,
    StringList,
    IntegerList,
}

impl ParamKind {
    fn schema(&self) -> Value {
        match self {
            ParamKind::String => json!({"type": "string"}),
            ParamKind::Integer => json!({"type": "integer", "minimum": 0}),
            ParamKind::Boolean => json!({"type": "boolean"}),
            ParamKind::Object => json!({"type": "object"}),
            ParamKind::StringList => json!({"type": "array", "items": {"type": "string"}}),
            ParamKind::IntegerList => {
                json!({"type": "array", "items": {"type": "integer", "minimum": 0}})
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Param {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
    pub required: bool,
}

impl Param {
    pub const fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: false,
        }
    }
}

/// Static description of one named operation
pub struct OperationDescriptor {
    pub name: &'static str,
    pub category: Category,
    pub description: &'static str,
    pub params: &'static [Param],
    /// Retrying this operation repeats an action on the remote side
    pub side_effecting: bool,
    pub prepare: Prepare,
}

impl fmt::Debug for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationDescriptor")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("side_effecting", &self.side_effecting)
            .finish()
    }
}

impl OperationDescriptor {
    /// JSON Schema for the declared parameters
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in self.params {
            let mut schema = param.kind.schema();
            if !param.description.is_empty() {
                schema["description"] = Value::String(param.description.to_string());
            }
            properties.insert(param.name.to_string(), schema);
            if param.required {
                required.push(Value::String(param.name.to_string()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Entry for a `tools/list` reply
    pub fn tool_entry(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema(),
        })
    }
}

/// Every operation the bridge exposes, in listing order
pub struct Catalog {
    operations: Vec<OperationDescriptor>,
    index: HashMap<&'static str, usize>,
    context: CatalogContext,
}

impl Catalog {
    pub fn new(context: CatalogContext) -> Self {
        let operations: Vec<OperationDescriptor> = [
            modules::descriptors(),
            execution::descriptors(),
            sessions::descriptors(),
            consoles::descriptors(),
            jobs::descriptors(),
            exploits::descriptors(),
            database::descriptors(),
        ]
        .into_iter()
        .flatten()
        .collect();

        let index = operations
            .iter()
            .enumerate()
            .map(|(i, op)| (op.name, i))
            .collect();

        Self {
            operations,
            index,
            context,
        }
    }

    pub fn get(&self, name: &str) -> Option<&OperationDescriptor> {
        self.index.get(name).map(|&i| &self.operations[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &OperationDescriptor> {
        self.operations.iter()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn context(&self) -> &CatalogContext {
        &self.context
    }

    /// Look up `name` and run its validation stage over `args`
    pub fn prepare(&self, name: &str, args: Value) -> Result<(&OperationDescriptor, Call)> {
        let descriptor = self
            .get(name)
            .ok_or_else(|| BridgeError::invalid(format!("Unknown operation: {name}")))?;
        let args = Args::from_value(args)?;
        reject_unknown(descriptor, &args)?;
        let call = (descriptor.prepare)(&self.context, &args)?;
        Ok((descriptor, call))
    }

    /// The `tools/list` payload
    pub fn tool_listing(&self) -> Value {
        Value::Array(self.operations.iter().map(OperationDescriptor::tool_entry).collect())
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(CatalogContext::default())
    }
}

fn reject_unknown(descriptor: &OperationDescriptor, args: &Args) -> Result<()> {
    for key in args.keys() {
        if !descriptor.params.iter().any(|p| p.name == key) {
            return Err(BridgeError::invalid(format!(
                "Unknown argument '{key}' for {}",
                descriptor.name
            )));
        }
    }
    Ok(())
}

/// Length of a list or map reply member, 0 when absent
pub(crate) fn count(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        _ => 0,
    }
}

/// Optional timeout argument, falling back to a configured default
pub(crate) fn timeout_arg(
    args: &Args,
    key: &str,
    default_secs: u64,
) -> Result<std::time::Duration> {
    crate::validation::timeout_secs(args.u64(key)?.unwrap_or(default_secs))
}
