use crate::db;
use crate::ipc::helpers::{db_conn, flush_writes, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn health(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
        "pendingWrites": state.writes.pending_len()
    }))
}

/// Opens (or creates) the workspace database. Anything staged for the
/// previous workspace was flushed by the router before we got here.
fn select_workspace(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let path = PathBuf::from(required_str(params, "path")?);
    let conn = db::open_db(&path).map_err(|e| {
        HandlerErr::new("io_failed", format!("{e:#}"))
            .with_details(json!({ "path": path.to_string_lossy() }))
    })?;
    state.workspace = Some(path.clone());
    state.db = Some(conn);
    tracing::info!(workspace = %path.to_string_lossy(), "workspace opened");
    Ok(json!({ "workspacePath": path.to_string_lossy() }))
}

fn flush(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    db_conn(state)?;
    let outcome = flush_writes(state);
    match outcome.error {
        None => Ok(json!({ "written": outcome.written, "attempts": outcome.attempts })),
        Some(message) => Err(HandlerErr::new("persist_failed", message).with_details(json!({
            "pending": state.writes.pending_len(),
            "attempts": outcome.attempts
        }))),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => health(state),
        "workspace.select" => select_workspace(state, &req.params),
        "workspace.flush" => flush(state),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
