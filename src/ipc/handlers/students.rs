use crate::ipc::helpers::{db_conn, optional_str, query_failed, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::Student;
use crate::store::{self, SqliteStore, StudentDirectory};
use rusqlite::Connection;
use serde_json::json;

fn validate_email(email: &str) -> Result<String, HandlerErr> {
    let email = email.trim().to_ascii_lowercase();
    if !email.contains('@') {
        return Err(HandlerErr::new(
            "bad_params",
            format!("invalid email: {}", email),
        ));
    }
    Ok(email)
}

fn ensure_email_free(conn: &Connection, email: &str, owner: Option<&str>) -> Result<(), HandlerErr> {
    match store::find_student_by_email(conn, email).map_err(query_failed)? {
        Some(existing) if Some(existing.id.as_str()) != owner => Err(HandlerErr::new(
            "bad_params",
            "email already belongs to another student",
        )
        .with_details(json!({ "studentId": existing.id }))),
        _ => Ok(()),
    }
}

fn students_list(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let mut stmt = conn
        .prepare("SELECT id, name, email, registration_id FROM students ORDER BY name, rowid")
        .map_err(query_failed)?;
    let students: Vec<Student> = stmt
        .query_map([], |r| {
            Ok(Student {
                id: r.get(0)?,
                name: r.get(1)?,
                email: r.get(2)?,
                registration_id: r.get(3)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_failed)?;
    Ok(json!({ "students": students }))
}

fn students_create(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let name = required_str(params, "name")?;
    let email = validate_email(&required_str(params, "email")?)?;
    ensure_email_free(conn, &email, None)?;
    let registration_id = optional_str(params, "registrationId");
    let student = store::insert_student(conn, &name, &email, registration_id.as_deref())
        .map_err(|e| HandlerErr::new("db_insert_failed", format!("{e:#}")))?;
    Ok(json!({ "student": student }))
}

fn students_update(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(params, "studentId")?;
    let Some(mut student) = SqliteStore::new(conn).resolve(&student_id).map_err(query_failed)? else {
        return Err(HandlerErr::new("not_found", "student not found")
            .with_details(json!({ "studentId": student_id })));
    };

    if params.get("name").is_some() {
        student.name = required_str(params, "name")?;
    }
    if params.get("email").is_some() {
        let email = validate_email(&required_str(params, "email")?)?;
        ensure_email_free(conn, &email, Some(&student.id))?;
        student.email = email;
    }
    if params.get("registrationId").is_some() {
        student.registration_id = optional_str(params, "registrationId");
    }

    conn.execute(
        "UPDATE students SET name = ?, email = ?, registration_id = ? WHERE id = ?",
        (
            &student.name,
            &student.email,
            &student.registration_id,
            &student.id,
        ),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "student": student }))
}

/// Enrollments are kept; their records fall out of the rollup once the student is gone.
fn students_delete(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(params, "studentId")?;
    let removed = conn
        .execute("DELETE FROM students WHERE id = ?", [&student_id])
        .map_err(|e| HandlerErr::new("db_delete_failed", e.to_string()))?;
    if removed == 0 {
        return Err(HandlerErr::new("not_found", "student not found")
            .with_details(json!({ "studentId": student_id })));
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => students_list(state),
        "students.create" => students_create(state, &req.params),
        "students.update" => students_update(state, &req.params),
        "students.delete" => students_delete(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
