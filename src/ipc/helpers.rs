use crate::calc::{self, RubricIssue};
use crate::grouping::GroupingError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::AppState;
use crate::model::{Activity, Classroom, ClassroomStudentRecord, ScoringScheme};
use crate::presets::{self, PresetError};
use crate::roster;
use crate::store::{self, RecordStore, RecordWriter, SqliteStore};
use crate::writer::FlushOutcome;
use rusqlite::Connection;
use serde_json::json;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<GroupingError> for HandlerErr {
    fn from(e: GroupingError) -> Self {
        HandlerErr::new(e.code(), e.to_string())
    }
}

impl From<PresetError> for HandlerErr {
    fn from(e: PresetError) -> Self {
        let details = match &e {
            PresetError::AlreadyApplied { existing } => json!({ "existing": existing }),
        };
        HandlerErr::new(e.code(), e.to_string()).with_details(details)
    }
}

impl From<RubricIssue> for HandlerErr {
    fn from(e: RubricIssue) -> Self {
        HandlerErr::new(e.code(), e.to_string())
    }
}

pub fn respond(id: &str, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => e.response(id),
    }
}

pub fn db_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn query_failed(e: impl std::fmt::Display) -> HandlerErr {
    HandlerErr::new("db_query_failed", format!("{:#}", e))
}

pub fn required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

pub fn optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn required_score(params: &serde_json::Value, key: &str) -> Result<f64, HandlerErr> {
    let Some(v) = params.get(key).and_then(|v| v.as_f64()) else {
        return Err(HandlerErr::new("bad_params", format!("missing {}", key)));
    };
    if !v.is_finite() {
        return Err(HandlerErr::new(
            "bad_params",
            format!("{} must be a finite number", key),
        ));
    }
    Ok(v)
}

pub fn string_list(params: &serde_json::Value, key: &str) -> Result<Vec<String>, HandlerErr> {
    let Some(arr) = params.get(key).and_then(|v| v.as_array()) else {
        return Err(HandlerErr::new("bad_params", format!("missing {}", key)));
    };
    let mut out = Vec::with_capacity(arr.len());
    for v in arr {
        let Some(s) = v.as_str() else {
            return Err(HandlerErr::new(
                "bad_params",
                format!("{} must be an array of strings", key),
            ));
        };
        out.push(s.to_string());
    }
    Ok(out)
}

pub fn require_classroom(conn: &Connection, classroom_id: &str) -> Result<Classroom, HandlerErr> {
    store::load_classroom(conn, classroom_id)
        .map_err(query_failed)?
        .ok_or_else(|| {
            HandlerErr::new("not_found", "classroom not found")
                .with_details(json!({ "classroomId": classroom_id }))
        })
}

/// Declared scheme, else the class type's default, else inferred from the rubric.
pub fn scheme_for(classroom: &Classroom, activities: &[Activity]) -> ScoringScheme {
    classroom
        .scoring_scheme
        .or_else(|| classroom.class_type.map(|t| t.default_scheme()))
        .unwrap_or_else(|| calc::infer_scheme(activities))
}

pub fn flush_writes(state: &mut AppState) -> FlushOutcome {
    let Some(conn) = state.db.as_ref() else {
        return FlushOutcome {
            written: 0,
            attempts: 0,
            error: None,
        };
    };
    state.writes.flush(&SqliteStore::new(conn))
}

pub fn ensure_flushed(state: &mut AppState) -> Result<(), HandlerErr> {
    let outcome = flush_writes(state);
    match outcome.error {
        None => Ok(()),
        Some(message) => Err(HandlerErr::new("persist_failed", message).with_details(json!({
            "pending": state.writes.pending_len(),
            "attempts": outcome.attempts
        }))),
    }
}

/// Enrolled records with any staged edits applied on top.
pub fn load_records(
    state: &AppState,
    classroom_id: &str,
) -> Result<Vec<ClassroomStudentRecord>, HandlerErr> {
    let conn = db_conn(state)?;
    let mut records = SqliteStore::new(conn)
        .read_all_records(classroom_id)
        .map_err(query_failed)?;
    state.writes.overlay(&mut records);
    Ok(records)
}

/// Writes the snapshots in one transaction; they supersede anything staged for the same ids.
pub fn commit_records(
    state: &mut AppState,
    records: &[ClassroomStudentRecord],
) -> Result<(), HandlerErr> {
    if records.is_empty() {
        return Ok(());
    }
    let conn = db_conn(state)?;
    SqliteStore::new(conn)
        .write_records(records)
        .map_err(|e| HandlerErr::new("db_tx_failed", format!("{e:#}")))?;
    for r in records {
        state.writes.discard(&r.id);
    }
    Ok(())
}

/// Installs `activities` as the whole rubric and rewrites every record in the same
/// transaction: entries for vanished activities are pruned, missing active ones seeded.
pub fn install_rubric(
    state: &mut AppState,
    classroom_id: &str,
    activities: &[Activity],
) -> Result<usize, HandlerErr> {
    let mut records = load_records(state, classroom_id)?;
    for r in records.iter_mut() {
        roster::prune_entries(r, activities);
        roster::seed_missing_entries(r, activities);
    }
    let conn = db_conn(state)?;
    SqliteStore::new(conn)
        .replace_rubric(classroom_id, activities, &records)
        .map_err(|e| HandlerErr::new("db_tx_failed", format!("{e:#}")))?;
    for r in &records {
        state.writes.discard(&r.id);
    }
    Ok(records.len())
}

/// Current rubric; an empty rubric on a typed classroom receives its preset first.
pub fn ensure_rubric(
    state: &mut AppState,
    classroom: &Classroom,
) -> Result<Vec<Activity>, HandlerErr> {
    let conn = db_conn(state)?;
    let existing = store::load_activities(conn, &classroom.id).map_err(query_failed)?;
    let Some(preset) = presets::auto_preset(&existing, classroom.class_type) else {
        return Ok(existing);
    };
    let seeded = install_rubric(state, &classroom.id, &preset)?;
    tracing::info!(
        classroom_id = %classroom.id,
        activities = preset.len(),
        records = seeded,
        "applied default preset"
    );
    Ok(preset)
}
