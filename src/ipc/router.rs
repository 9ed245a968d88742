use super::handlers;
use super::helpers::ensure_flushed;
use super::types::{AppState, Request};
use crate::ipc::error::err;
use std::time::Instant;

enum Preflush {
    /// Never touches staged grade data.
    Skip,
    /// Drains only once the idle window has elapsed.
    WhenDue,
    Always,
}

fn preflush_policy(method: &str) -> Preflush {
    match method {
        "health" | "workspace.flush" => Preflush::Skip,
        "students.list" | "students.create" | "students.update" | "students.delete" => Preflush::Skip,
        "classrooms.list" | "classrooms.create" | "classrooms.update" => Preflush::Skip,
        "grades.set" => Preflush::WhenDue,
        _ => Preflush::Always,
    }
}

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    tracing::debug!(id = %req.id, method = %req.method, "dispatch");

    let preflush = match preflush_policy(&req.method) {
        Preflush::Skip => false,
        Preflush::WhenDue => state.writes.is_due(Instant::now()),
        Preflush::Always => !state.writes.is_empty(),
    };
    if preflush {
        if let Err(e) = ensure_flushed(state) {
            return e.response(&req.id);
        }
    }

    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::classrooms::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::students::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::roster::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::activities::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::grades::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::groups::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::analytics::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::exchange::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
