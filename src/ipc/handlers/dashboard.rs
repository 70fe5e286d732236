use crate::bundle;
use crate::dashboard::{write_dashboard_json, Dashboard};
use crate::db;
use crate::error::PipelineError;
use crate::ipc::error::{err, ok, pipeline_err};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

/// The session's latest run, else the latest run persisted in the workspace. Either is
/// rendered with the config it was computed with.
fn current_dashboard(state: &AppState) -> Result<(String, Dashboard), PipelineError> {
    if let Some(run) = state.last_run.as_ref() {
        return Ok((run.run_id.clone(), run.dashboard()));
    }
    let Some(conn) = state.db.as_ref() else {
        return Err(PipelineError::NoAnalysis);
    };
    let stored = db::load_analysis(conn)
        .map_err(|e| PipelineError::Storage(e.to_string()))?
        .ok_or(PipelineError::NoAnalysis)?;
    let dashboard = stored.dashboard();
    Ok((stored.run_id, dashboard))
}

fn required_path(req: &Request, key: &str) -> Result<PathBuf, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn handle_dashboard_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (run_id, dashboard) = match current_dashboard(state) {
        Ok(v) => v,
        Err(e) => return pipeline_err(&req.id, &e),
    };
    match serde_json::to_value(&dashboard) {
        Ok(v) => ok(&req.id, json!({ "runId": run_id, "dashboard": v })),
        Err(e) => err(&req.id, "export_failed", e.to_string(), None),
    }
}

fn handle_dashboard_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out_path = match required_path(req, "outPath") {
        Ok(p) => p,
        Err(e) => return e,
    };
    let (run_id, dashboard) = match current_dashboard(state) {
        Ok(v) => v,
        Err(e) => return pipeline_err(&req.id, &e),
    };
    if let Err(e) = write_dashboard_json(&dashboard, &out_path) {
        return pipeline_err(&req.id, &PipelineError::Export(format!("{e:#}")));
    }
    ok(
        &req.id,
        json!({
            "runId": run_id,
            "path": out_path.to_string_lossy(),
            "students": dashboard.students.len(),
        }),
    )
}

fn handle_dashboard_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out_path = match required_path(req, "outPath") {
        Ok(p) => p,
        Err(e) => return e,
    };
    let (run_id, dashboard) = match current_dashboard(state) {
        Ok(v) => v,
        Err(e) => return pipeline_err(&req.id, &e),
    };
    match bundle::export_dashboard_bundle(&dashboard, &run_id, state.workspace.as_deref(), &out_path) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "runId": run_id,
                "path": out_path.to_string_lossy(),
                "bundleFormat": summary.bundle_format,
                "entryCount": summary.entry_count,
                "dataSha256": summary.data_sha256,
            }),
        ),
        Err(e) => pipeline_err(&req.id, &PipelineError::Export(format!("{e:#}"))),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.get" => Some(handle_dashboard_get(state, req)),
        "dashboard.export" => Some(handle_dashboard_export(state, req)),
        "dashboard.bundle" => Some(handle_dashboard_bundle(state, req)),
        _ => None,
    }
}
