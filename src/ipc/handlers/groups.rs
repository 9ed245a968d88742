use crate::grouping;
use crate::ipc::helpers::{
    commit_records, db_conn, ensure_rubric, load_records, require_classroom, required_score,
    required_str, respond, string_list, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::ClassroomStudentRecord;
use serde_json::json;

fn touched(records: &[ClassroomStudentRecord], ids: &[String]) -> Vec<ClassroomStudentRecord> {
    records
        .iter()
        .filter(|r| ids.contains(&r.id))
        .cloned()
        .collect()
}

fn groups_list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let classroom_id = required_str(params, "classroomId")?;
    require_classroom(db_conn(state)?, &classroom_id)?;
    let records = load_records(state, &classroom_id)?;
    let partition = grouping::partition(&records);
    let groups: Vec<serde_json::Value> = partition
        .groups
        .iter()
        .map(|(group_id, members)| json!({ "groupId": group_id, "members": members }))
        .collect();
    Ok(json!({ "groups": groups, "ungrouped": partition.ungrouped }))
}

fn groups_create(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let classroom_id = required_str(params, "classroomId")?;
    let record_ids = string_list(params, "recordIds")?;
    require_classroom(db_conn(state)?, &classroom_id)?;

    let mut records = load_records(state, &classroom_id)?;
    let group_id = grouping::create_group(&mut records, &record_ids)?;
    let members = touched(&records, &record_ids);
    commit_records(state, &members)?;
    tracing::info!(
        classroom_id = %classroom_id,
        group_id = %group_id,
        members = members.len(),
        "group created"
    );
    Ok(json!({
        "groupId": group_id,
        "members": members.iter().map(|r| r.id.clone()).collect::<Vec<_>>(),
    }))
}

fn groups_dissolve(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let classroom_id = required_str(params, "classroomId")?;
    let record_ids = string_list(params, "recordIds")?;
    require_classroom(db_conn(state)?, &classroom_id)?;

    let mut records = load_records(state, &classroom_id)?;
    let cleared = grouping::dissolve_group(&mut records, &record_ids)?;
    commit_records(state, &touched(&records, &record_ids))?;
    tracing::info!(classroom_id = %classroom_id, cleared, "group dissolved");
    Ok(json!({ "cleared": cleared }))
}

fn groups_set_score(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let classroom_id = required_str(params, "classroomId")?;
    let group_id = required_str(params, "groupId")?;
    let activity_id = required_str(params, "activityId")?;
    let score = required_score(params, "score")?;

    let classroom = require_classroom(db_conn(state)?, &classroom_id)?;
    let activities = ensure_rubric(state, &classroom)?;
    if !activities.iter().any(|a| a.id == activity_id) {
        return Err(HandlerErr::new("not_found", "activity not found")
            .with_details(json!({ "activityId": activity_id })));
    }

    let mut records = load_records(state, &classroom_id)?;
    let changed = grouping::propagate_score(&mut records, &group_id, &activity_id, score)?;
    commit_records(state, &touched(&records, &changed))?;
    tracing::info!(
        group_id = %group_id,
        activity_id = %activity_id,
        changed = changed.len(),
        "group score propagated"
    );
    Ok(json!({ "changedRecords": changed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "groups.list" => groups_list(state, &req.params),
        "groups.create" => groups_create(state, &req.params),
        "groups.dissolve" => groups_dissolve(state, &req.params),
        "groups.setScore" => groups_set_score(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
