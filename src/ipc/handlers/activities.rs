use crate::calc;
use crate::ipc::helpers::{
    db_conn, ensure_rubric, install_rubric, query_failed, require_classroom, required_str,
    respond, scheme_for, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Activity, ActivityBlock, ClassType};
use crate::presets;
use crate::store::{self, RecordStore, SqliteStore};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityInput {
    #[serde(default)]
    id: Option<String>,
    name: String,
    max_score: f64,
    group: ActivityBlock,
    #[serde(default)]
    order: Option<i64>,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

fn parse_activities(params: &serde_json::Value) -> Result<Vec<Activity>, HandlerErr> {
    let Some(raw) = params.get("activities") else {
        return Err(HandlerErr::new("bad_params", "missing activities"));
    };
    let inputs: Vec<ActivityInput> = serde_json::from_value(raw.clone())
        .map_err(|e| HandlerErr::new("bad_params", format!("invalid activities: {}", e)))?;

    let mut out = Vec::with_capacity(inputs.len());
    for (i, a) in inputs.into_iter().enumerate() {
        let name = a.name.trim().to_string();
        if name.is_empty() {
            return Err(HandlerErr::new("bad_params", "activity name must not be empty")
                .with_details(json!({ "index": i })));
        }
        if !a.max_score.is_finite() || a.max_score < 0.0 {
            return Err(HandlerErr::new("bad_params", "maxScore must be a non-negative number")
                .with_details(json!({ "index": i })));
        }
        out.push(Activity {
            id: a
                .id
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            name,
            max_score: a.max_score,
            group: a.group,
            order: a.order.unwrap_or(i as i64),
            active: a.active,
        });
    }
    Ok(out)
}

fn rubric_view(activities: &[Activity]) -> serde_json::Value {
    match calc::validate_rubric(activities) {
        Ok(()) => serde_json::Value::Null,
        Err(issue) => json!({ "code": issue.code(), "message": issue.to_string() }),
    }
}

fn activities_list(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let classroom_id = required_str(params, "classroomId")?;
    let classroom = require_classroom(db_conn(state)?, &classroom_id)?;
    let activities = ensure_rubric(state, &classroom)?;
    Ok(json!({
        "activities": activities,
        "scoringScheme": scheme_for(&classroom, &activities),
        "rubricIssue": rubric_view(&activities),
    }))
}

fn activities_apply_preset(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let classroom_id = required_str(params, "classroomId")?;
    let confirm = params
        .get("confirm")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let conn = db_conn(state)?;
    let classroom = require_classroom(conn, &classroom_id)?;
    let requested = match params.get("classType").and_then(|v| v.as_str()) {
        Some(s) => Some(ClassType::parse(s).ok_or_else(|| {
            HandlerErr::new("bad_params", "classType must be Integradora or Modular")
        })?),
        None => None,
    };
    let Some(class_type) = requested.or(classroom.class_type) else {
        return Err(HandlerErr::new(
            "bad_params",
            "classroom has no classType; pass params.classType",
        ));
    };

    let existing = store::load_activities(conn, &classroom_id).map_err(query_failed)?;
    let activities = presets::plan_preset(&existing, class_type, confirm)?;
    if classroom.class_type != Some(class_type) {
        conn.execute(
            "UPDATE classrooms SET class_type = ? WHERE id = ?",
            (class_type.as_str(), &classroom_id),
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    }

    let records = install_rubric(state, &classroom_id, &activities)?;
    tracing::info!(
        classroom_id = %classroom_id,
        class_type = class_type.as_str(),
        replaced = existing.len(),
        records,
        "preset applied"
    );
    Ok(json!({
        "activities": activities,
        "replaced": existing.len(),
        "recordsSeeded": records,
    }))
}

fn activities_toggle(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let classroom_id = required_str(params, "classroomId")?;
    let activity_id = required_str(params, "activityId")?;
    let Some(active) = params.get("active").and_then(|v| v.as_bool()) else {
        return Err(HandlerErr::new("bad_params", "missing active"));
    };
    let conn = db_conn(state)?;
    require_classroom(conn, &classroom_id)?;
    let mut activities = store::load_activities(conn, &classroom_id).map_err(query_failed)?;
    if !presets::toggle_activity(&mut activities, &activity_id, active) {
        return Err(HandlerErr::new("not_found", "activity not found")
            .with_details(json!({ "activityId": activity_id })));
    }

    if active {
        install_rubric(state, &classroom_id, &activities)?;
    } else {
        // Entries stay put so re-activation restores them.
        SqliteStore::new(conn)
            .write_activities(&classroom_id, &activities)
            .map_err(|e| HandlerErr::new("db_update_failed", format!("{e:#}")))?;
    }
    Ok(json!({ "activities": activities }))
}

fn activities_replace(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let classroom_id = required_str(params, "classroomId")?;
    require_classroom(db_conn(state)?, &classroom_id)?;
    let activities = parse_activities(params)?;
    calc::validate_rubric(&activities)?;

    let records = install_rubric(state, &classroom_id, &activities)?;
    tracing::info!(
        classroom_id = %classroom_id,
        activities = activities.len(),
        records,
        "rubric replaced"
    );
    Ok(json!({ "activities": activities }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "activities.list" => activities_list(state, &req.params),
        "activities.applyPreset" => activities_apply_preset(state, &req.params),
        "activities.toggle" => activities_toggle(state, &req.params),
        "activities.replace" => activities_replace(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
