use crate::analytics;
use crate::ipc::helpers::{
    db_conn, ensure_rubric, load_records, query_failed, require_classroom, required_str, respond,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteStore;
use serde_json::json;

fn analytics_class(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let classroom_id = required_str(params, "classroomId")?;
    let classroom = require_classroom(db_conn(state)?, &classroom_id)?;
    let activities = ensure_rubric(state, &classroom)?;
    let records = load_records(state, &classroom_id)?;
    let directory = SqliteStore::new(db_conn(state)?);
    let rollup =
        analytics::class_analytics(&directory, &activities, &records).map_err(query_failed)?;
    Ok(json!({
        "classroomId": classroom_id,
        "analytics": rollup,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "analytics.class" => analytics_class(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
