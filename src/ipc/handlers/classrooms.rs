use crate::ipc::helpers::{
    db_conn, ensure_rubric, query_failed, require_classroom, required_str, respond, scheme_for,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{ClassType, Classroom, ScoringScheme};
use crate::store;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn parse_class_type(params: &serde_json::Value) -> Result<Option<ClassType>, HandlerErr> {
    match params.get("classType") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_str()
            .and_then(ClassType::parse)
            .map(Some)
            .ok_or_else(|| {
                HandlerErr::new("bad_params", "classType must be Integradora or Modular")
            }),
    }
}

fn parse_scheme(params: &serde_json::Value) -> Result<Option<ScoringScheme>, HandlerErr> {
    match params.get("scoringScheme") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_str()
            .and_then(ScoringScheme::parse)
            .map(Some)
            .ok_or_else(|| {
                HandlerErr::new(
                    "bad_params",
                    "scoringScheme must be twoBlockCapped or openSubtotals",
                )
            }),
    }
}

fn count_records(conn: &Connection, classroom_id: &str) -> Result<i64, HandlerErr> {
    conn.query_row(
        "SELECT COUNT(*) FROM classroom_students WHERE classroom_id = ?",
        [classroom_id],
        |r| r.get(0),
    )
    .map_err(query_failed)
}

fn classrooms_list(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let classrooms = store::list_classrooms(conn).map_err(query_failed)?;
    let mut out = Vec::with_capacity(classrooms.len());
    for c in classrooms {
        let student_count = count_records(conn, &c.id)?;
        let activities = store::load_activities(conn, &c.id).map_err(query_failed)?;
        out.push(json!({
            "id": c.id,
            "name": c.name,
            "classType": c.class_type,
            "scoringScheme": scheme_for(&c, &activities),
            "studentCount": student_count,
            "activityCount": activities.len(),
            "createdAt": c.created_at,
        }));
    }
    Ok(json!({ "classrooms": out }))
}

fn classrooms_create(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = required_str(params, "name")?;
    let class_type = parse_class_type(params)?;
    let scoring_scheme = parse_scheme(params)?;
    let classroom = Classroom {
        id: Uuid::new_v4().to_string(),
        name,
        class_type,
        scoring_scheme,
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    let conn = db_conn(state)?;
    conn.execute(
        "INSERT INTO classrooms(id, name, class_type, scoring_scheme, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (
            &classroom.id,
            &classroom.name,
            classroom.class_type.map(|t| t.as_str()),
            classroom.scoring_scheme.map(|s| s.as_str()),
            &classroom.created_at,
        ),
    )
    .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;
    tracing::info!(classroom_id = %classroom.id, "classroom created");

    let activities = ensure_rubric(state, &classroom)?;
    Ok(json!({
        "classroom": classroom,
        "activities": activities,
    }))
}

fn classrooms_update(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let classroom_id = required_str(params, "classroomId")?;
    let conn = db_conn(state)?;
    let mut classroom = require_classroom(conn, &classroom_id)?;

    if params.get("name").is_some() {
        classroom.name = required_str(params, "name")?;
    }
    if params.get("classType").is_some() {
        classroom.class_type = parse_class_type(params)?;
    }
    if params.get("scoringScheme").is_some() {
        classroom.scoring_scheme = parse_scheme(params)?;
    }

    conn.execute(
        "UPDATE classrooms SET name = ?, class_type = ?, scoring_scheme = ? WHERE id = ?",
        (
            &classroom.name,
            classroom.class_type.map(|t| t.as_str()),
            classroom.scoring_scheme.map(|s| s.as_str()),
            &classroom.id,
        ),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "classroom": classroom }))
}

fn classrooms_delete(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let classroom_id = required_str(params, "classroomId")?;
    let conn = db_conn(state)?;
    require_classroom(conn, &classroom_id)?;

    let mut stmt = conn
        .prepare("SELECT id FROM classroom_students WHERE classroom_id = ?")
        .map_err(query_failed)?;
    let record_ids: Vec<String> = stmt
        .query_map([&classroom_id], |r| r.get(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_failed)?;
    drop(stmt);

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let delete_err = |e: rusqlite::Error| HandlerErr::new("db_delete_failed", e.to_string());
    tx.execute(
        "DELETE FROM grade_entries
         WHERE record_id IN (SELECT id FROM classroom_students WHERE classroom_id = ?)",
        [&classroom_id],
    )
    .map_err(delete_err)?;
    tx.execute(
        "DELETE FROM classroom_students WHERE classroom_id = ?",
        [&classroom_id],
    )
    .map_err(delete_err)?;
    tx.execute("DELETE FROM activities WHERE classroom_id = ?", [&classroom_id])
        .map_err(delete_err)?;
    tx.execute("DELETE FROM classrooms WHERE id = ?", [&classroom_id])
        .map_err(delete_err)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    for id in &record_ids {
        state.writes.discard(id);
    }
    tracing::info!(classroom_id = %classroom_id, records = record_ids.len(), "classroom deleted");
    Ok(json!({ "ok": true, "removedRecords": record_ids.len() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "classrooms.list" => classrooms_list(state),
        "classrooms.create" => classrooms_create(state, &req.params),
        "classrooms.update" => classrooms_update(state, &req.params),
        "classrooms.delete" => classrooms_delete(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
