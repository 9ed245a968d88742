use crate::ipc::helpers::{
    db_conn, ensure_rubric, load_records, query_failed, require_classroom,
    required_str, respond, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::ClassroomStudentRecord;
use crate::roster;
use crate::store::{self, SqliteStore, StudentDirectory};
use serde_json::json;

fn roster_list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let classroom_id = required_str(params, "classroomId")?;
    let conn = db_conn(state)?;
    require_classroom(conn, &classroom_id)?;
    let records = load_records(state, &classroom_id)?;
    let directory = SqliteStore::new(conn);

    let mut rows = Vec::with_capacity(records.len());
    for r in records {
        let student = directory.resolve(&r.student_id).map_err(query_failed)?;
        rows.push(json!({
            "recordId": r.id,
            "studentId": r.student_id,
            "name": student.as_ref().map(|s| s.name.clone()),
            "email": student.as_ref().map(|s| s.email.clone()),
            "registrationId": student.as_ref().and_then(|s| s.registration_id.clone()),
            "groupId": r.group_id,
            "grades": r.grades,
        }));
    }
    Ok(json!({ "records": rows }))
}

fn roster_enroll(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let classroom_id = required_str(params, "classroomId")?;
    let student_id = required_str(params, "studentId")?;
    let classroom = require_classroom(db_conn(state)?, &classroom_id)?;
    let activities = ensure_rubric(state, &classroom)?;
    let conn = db_conn(state)?;
    if SqliteStore::new(conn)
        .resolve(&student_id)
        .map_err(query_failed)?
        .is_none()
    {
        return Err(HandlerErr::new("not_found", "student not found")
            .with_details(json!({ "studentId": student_id })));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let Some(record) = store::enroll_seeded(&tx, &classroom_id, &student_id, &activities)
        .map_err(|e| HandlerErr::new("db_insert_failed", format!("{e:#}")))?
    else {
        return Ok(json!({ "alreadyEnrolled": true }));
    };
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    tracing::info!(classroom_id = %classroom_id, record_id = %record.id, "student enrolled");
    Ok(json!({ "alreadyEnrolled": false, "record": record }))
}

fn roster_remove(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let classroom_id = required_str(params, "classroomId")?;
    let record_id = required_str(params, "recordId")?;
    let conn = db_conn(state)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let delete_err = |e: rusqlite::Error| HandlerErr::new("db_delete_failed", e.to_string());
    tx.execute(
        "DELETE FROM grade_entries
         WHERE record_id IN (SELECT id FROM classroom_students WHERE id = ? AND classroom_id = ?)",
        (&record_id, &classroom_id),
    )
    .map_err(delete_err)?;
    let removed = tx
        .execute(
            "DELETE FROM classroom_students WHERE id = ? AND classroom_id = ?",
            (&record_id, &classroom_id),
        )
        .map_err(delete_err)?;
    if removed == 0 {
        return Err(HandlerErr::new("not_found", "record not found")
            .with_details(json!({ "recordId": record_id })));
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    state.writes.discard(&record_id);
    tracing::info!(classroom_id = %classroom_id, record_id = %record_id, "record removed");
    Ok(json!({ "ok": true }))
}

fn roster_import_csv(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let classroom_id = required_str(params, "classroomId")?;
    let in_path = required_str(params, "inPath")?;
    let classroom = require_classroom(db_conn(state)?, &classroom_id)?;
    let text = std::fs::read_to_string(&in_path).map_err(|e| {
        HandlerErr::new("io_failed", e.to_string()).with_details(json!({ "path": in_path }))
    })?;

    let (rows, warnings) = roster::parse_roster_csv(&text);
    let activities = ensure_rubric(state, &classroom)?;
    let conn = db_conn(state)?;
    let mut created_students = 0usize;
    let mut skipped = 0usize;
    let mut new_records: Vec<ClassroomStudentRecord> = Vec::new();

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    for row in &rows {
        let existing = store::find_student_by_email(&tx, &row.email).map_err(query_failed)?;
        let student = match existing {
            Some(s) => s,
            None => {
                created_students += 1;
                store::insert_student(&tx, &row.name, &row.email, row.registration_id.as_deref())
                    .map_err(|e| HandlerErr::new("db_insert_failed", format!("{e:#}")))?
            }
        };
        match store::enroll_seeded(&tx, &classroom_id, &student.id, &activities)
            .map_err(|e| HandlerErr::new("db_insert_failed", format!("{e:#}")))?
        {
            Some(record) => new_records.push(record),
            None => skipped += 1,
        }
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    tracing::info!(
        classroom_id = %classroom_id,
        enrolled = new_records.len(),
        warnings = warnings.len(),
        "roster imported"
    );
    let warnings_json: Vec<serde_json::Value> = warnings
        .iter()
        .map(|w| json!({ "line": w.line, "code": w.code, "message": w.message }))
        .collect();
    Ok(json!({
        "rowsParsed": rows.len(),
        "studentsCreated": created_students,
        "enrolled": new_records.len(),
        "alreadyEnrolled": skipped,
        "warnings": warnings_json,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "roster.list" => roster_list(state, &req.params),
        "roster.enroll" => roster_enroll(state, &req.params),
        "roster.remove" => roster_remove(state, &req.params),
        "roster.importCsv" => roster_import_csv(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
