use crate::db;
use crate::ipc::error::{err, ok, pipeline_err};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_config_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "config": state.config }))
}

fn handle_config_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let mut next = state.config.clone();
    if let Err(e) = next.apply_update(&req.params) {
        return pipeline_err(&req.id, &e);
    }
    // Without a workspace the change lives for this session only.
    if let Some(conn) = state.db.as_ref() {
        if let Err(e) = db::save_config(conn, &next) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }
    state.config = next;
    ok(
        &req.id,
        json!({ "config": state.config, "persisted": state.db.is_some() }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "config.get" => Some(handle_config_get(state, req)),
        "config.update" => Some(handle_config_update(state, req)),
        _ => None,
    }
}
