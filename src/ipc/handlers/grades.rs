use crate::calc;
use crate::grouping::{self, GradeOwner};
use crate::ipc::helpers::{
    db_conn, ensure_rubric, load_records, query_failed, require_classroom, required_score,
    required_str, respond, scheme_for, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Activity, ClassroomStudentRecord, ScoringScheme};
use crate::store::{SqliteStore, StudentDirectory};
use serde_json::json;

fn owner_json(record: &ClassroomStudentRecord) -> serde_json::Value {
    match grouping::owner_of(record) {
        GradeOwner::Individual(id) => json!({ "kind": "individual", "recordId": id }),
        GradeOwner::Group(id) => json!({ "kind": "group", "groupId": id }),
    }
}

fn record_view(
    record: &ClassroomStudentRecord,
    activities: &[Activity],
    scheme: ScoringScheme,
) -> serde_json::Value {
    let report = calc::evaluate(activities, &record.grades, scheme);
    json!({
        "recordId": record.id,
        "studentId": record.student_id,
        "groupId": record.group_id,
        "owner": owner_json(record),
        "grades": record.grades,
        "finalGrade": report.final_grade(),
        "situation": report.situation(),
        "report": report,
    })
}

fn grades_set(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let classroom_id = required_str(params, "classroomId")?;
    let record_id = required_str(params, "recordId")?;
    let activity_id = required_str(params, "activityId")?;
    let score = required_score(params, "score")?;

    let classroom = require_classroom(db_conn(state)?, &classroom_id)?;
    let activities = ensure_rubric(state, &classroom)?;
    if !activities.iter().any(|a| a.id == activity_id) {
        return Err(HandlerErr::new("not_found", "activity not found")
            .with_details(json!({ "activityId": activity_id })));
    }

    let mut records = load_records(state, &classroom_id)?;
    let changed = grouping::set_score(&mut records, &record_id, &activity_id, score)?;
    for r in records.iter().filter(|r| changed.contains(&r.id)) {
        state.writes.stage(r.clone());
    }
    tracing::debug!(
        record_id = %record_id,
        activity_id = %activity_id,
        changed = changed.len(),
        "score staged"
    );

    let scheme = scheme_for(&classroom, &activities);
    let Some(record) = records.iter().find(|r| r.id == record_id) else {
        return Err(HandlerErr::new("unknown_record", "record not found in classroom"));
    };
    Ok(json!({
        "record": record_view(record, &activities, scheme),
        "changedRecords": changed,
        "pendingWrites": state.writes.pending_len(),
    }))
}

fn grades_get(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let classroom_id = required_str(params, "classroomId")?;
    let record_id = required_str(params, "recordId")?;
    let classroom = require_classroom(db_conn(state)?, &classroom_id)?;
    let activities = ensure_rubric(state, &classroom)?;
    let records = load_records(state, &classroom_id)?;
    let Some(record) = records.iter().find(|r| r.id == record_id) else {
        return Err(HandlerErr::new("unknown_record", "record not found in classroom")
            .with_details(json!({ "recordId": record_id })));
    };
    Ok(record_view(record, &activities, scheme_for(&classroom, &activities)))
}

fn grades_sheet(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let classroom_id = required_str(params, "classroomId")?;
    let classroom = require_classroom(db_conn(state)?, &classroom_id)?;
    let activities = ensure_rubric(state, &classroom)?;
    let records = load_records(state, &classroom_id)?;
    let scheme = scheme_for(&classroom, &activities);
    let directory = SqliteStore::new(db_conn(state)?);

    let mut rows = Vec::with_capacity(records.len());
    for r in &records {
        let name = directory
            .resolve(&r.student_id)
            .map_err(query_failed)?
            .map(|s| s.name);
        let mut row = record_view(r, &activities, scheme);
        row["name"] = json!(name);
        rows.push(row);
    }
    let rubric_issue = calc::validate_rubric(&activities)
        .err()
        .map(|issue| json!({ "code": issue.code(), "message": issue.to_string() }));
    Ok(json!({
        "classroomId": classroom_id,
        "scoringScheme": scheme,
        "activities": activities,
        "rubricIssue": rubric_issue,
        "rows": rows,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grades.set" => grades_set(state, &req.params),
        "grades.get" => grades_get(state, &req.params),
        "grades.sheet" => grades_sheet(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
