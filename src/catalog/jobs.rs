//! Background jobs

use msf_connect::SharedRpc;
use msf_core_interface::response::expect_success;
use msf_core_interface::JobId;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{
    bind, count, Args, Call, CatalogContext, Category, OperationDescriptor, Param, ParamKind,
};
use crate::error::Result;

const JOB_ID: Param = Param::required("job_id", ParamKind::Integer, "Job id");

pub(super) fn descriptors() -> Vec<OperationDescriptor> {
    vec![
        OperationDescriptor {
            name: "list_jobs",
            category: Category::Job,
            description: "List running jobs such as handlers and background module runs.",
            params: &[],
            side_effecting: false,
            prepare: prepare_list,
        },
        OperationDescriptor {
            name: "job_info",
            category: Category::Job,
            description: "Describe one job: name, start time and datastore.",
            params: &[JOB_ID],
            side_effecting: false,
            prepare: prepare_info,
        },
        OperationDescriptor {
            name: "stop_job",
            category: Category::Job,
            description: "Stop a running job immediately.",
            params: &[JOB_ID],
            side_effecting: true,
            prepare: prepare_stop,
        },
    ]
}

fn job_id(args: &Args) -> Result<JobId> {
    Ok(JobId(args.required_u32("job_id")?))
}

fn prepare_list(_ctx: &CatalogContext, _args: &Args) -> Result<Call> {
    Ok(bind((), list_jobs))
}

async fn list_jobs(rpc: SharedRpc, _req: Arc<()>) -> Result<Value> {
    let jobs = rpc.call("job.list", vec![]).await?;
    let jobs = match jobs {
        Value::Object(_) => jobs,
        _ => json!({}),
    };
    Ok(json!({
        "count": count(&jobs),
        "jobs": jobs,
    }))
}

fn prepare_info(_ctx: &CatalogContext, args: &Args) -> Result<Call> {
    Ok(bind(job_id(args)?, job_info))
}

async fn job_info(rpc: SharedRpc, id: Arc<JobId>) -> Result<Value> {
    let info = rpc.call("job.info", vec![json!(id.to_string())]).await?;
    Ok(json!({
        "job_id": *id,
        "info": info,
    }))
}

fn prepare_stop(_ctx: &CatalogContext, args: &Args) -> Result<Call> {
    Ok(bind(job_id(args)?, stop_job))
}

async fn stop_job(rpc: SharedRpc, id: Arc<JobId>) -> Result<Value> {
    let reply = rpc.call("job.stop", vec![json!(id.to_string())]).await?;
    expect_success(&reply, "job.stop")?;
    Ok(json!({
        "job_id": *id,
        "stopped": true,
    }))
}
