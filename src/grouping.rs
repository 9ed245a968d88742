use crate::model::ClassroomStudentRecord;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GroupingError {
    #[error("select at least one student")]
    EmptySelection,
    #[error("record not found in classroom: {0}")]
    UnknownRecord(String),
    #[error("group not found: {0}")]
    UnknownGroup(String),
}

impl GroupingError {
    pub fn code(&self) -> &'static str {
        match self {
            GroupingError::EmptySelection => "empty_selection",
            GroupingError::UnknownRecord(_) => "unknown_record",
            GroupingError::UnknownGroup(_) => "not_found",
        }
    }
}

/// Who owns the grade set of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GradeOwner {
    Individual(String),
    Group(String),
}

pub fn owner_of(record: &ClassroomStudentRecord) -> GradeOwner {
    match &record.group_id {
        Some(g) => GradeOwner::Group(g.clone()),
        None => GradeOwner::Individual(record.id.clone()),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPartition {
    pub groups: BTreeMap<String, Vec<String>>,
    pub ungrouped: Vec<String>,
}

pub fn partition(records: &[ClassroomStudentRecord]) -> GroupPartition {
    let mut out = GroupPartition::default();
    for r in records {
        match &r.group_id {
            Some(g) => out.groups.entry(g.clone()).or_default().push(r.id.clone()),
            None => out.ungrouped.push(r.id.clone()),
        }
    }
    out
}

fn check_selection(
    records: &[ClassroomStudentRecord],
    record_ids: &[String],
) -> Result<HashSet<String>, GroupingError> {
    let wanted: HashSet<String> = record_ids.iter().cloned().collect();
    if wanted.is_empty() {
        return Err(GroupingError::EmptySelection);
    }
    let known: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
    let mut missing: Vec<&String> = wanted.iter().filter(|id| !known.contains(id.as_str())).collect();
    missing.sort();
    if let Some(id) = missing.first() {
        return Err(GroupingError::UnknownRecord((*id).clone()));
    }
    Ok(wanted)
}

/// Stamps a new group id on every selected record. Grades are left untouched.
pub fn create_group(
    records: &mut [ClassroomStudentRecord],
    record_ids: &[String],
) -> Result<String, GroupingError> {
    let wanted = check_selection(records, record_ids)?;
    let group_id = Uuid::new_v4().to_string();
    for r in records.iter_mut().filter(|r| wanted.contains(&r.id)) {
        r.group_id = Some(group_id.clone());
    }
    Ok(group_id)
}

/// Clears `group_id` on the selected records; returns how many were grouped before.
pub fn dissolve_group(
    records: &mut [ClassroomStudentRecord],
    record_ids: &[String],
) -> Result<usize, GroupingError> {
    let wanted = check_selection(records, record_ids)?;
    let mut cleared = 0;
    for r in records.iter_mut().filter(|r| wanted.contains(&r.id)) {
        if r.group_id.take().is_some() {
            cleared += 1;
        }
    }
    Ok(cleared)
}

/// Writes `score` for `activity_id` on every member of `group_id`.
/// Returns the ids of the records whose stored value changed.
pub fn propagate_score(
    records: &mut [ClassroomStudentRecord],
    group_id: &str,
    activity_id: &str,
    score: f64,
) -> Result<Vec<String>, GroupingError> {
    let mut members = 0;
    let mut changed = Vec::new();
    for r in records
        .iter_mut()
        .filter(|r| r.group_id.as_deref() == Some(group_id))
    {
        members += 1;
        if r.set_score(activity_id, score) {
            changed.push(r.id.clone());
        }
    }
    if members == 0 {
        return Err(GroupingError::UnknownGroup(group_id.to_string()));
    }
    Ok(changed)
}

/// Score edit addressed to one record; group members fan out to the whole group.
pub fn set_score(
    records: &mut [ClassroomStudentRecord],
    record_id: &str,
    activity_id: &str,
    score: f64,
) -> Result<Vec<String>, GroupingError> {
    let Some(record) = records.iter_mut().find(|r| r.id == record_id) else {
        return Err(GroupingError::UnknownRecord(record_id.to_string()));
    };
    match owner_of(record) {
        GradeOwner::Individual(id) => {
            if record.set_score(activity_id, score) {
                Ok(vec![id])
            } else {
                Ok(Vec::new())
            }
        }
        GradeOwner::Group(group_id) => propagate_score(records, &group_id, activity_id, score),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GradeEntry;

    fn record(id: &str) -> ClassroomStudentRecord {
        ClassroomStudentRecord {
            id: id.to_string(),
            student_id: format!("student-{}", id),
            grades: Vec::new(),
            group_id: None,
        }
    }

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_selection_is_rejected() {
        let mut records = vec![record("a")];
        assert_eq!(
            create_group(&mut records, &[]),
            Err(GroupingError::EmptySelection)
        );
        assert!(records[0].group_id.is_none());
    }

    #[test]
    fn unknown_record_rejects_without_partial_stamp() {
        let mut records = vec![record("a"), record("b")];
        let err = create_group(&mut records, &ids(&["a", "zz"])).expect_err("unknown");
        assert_eq!(err.code(), "unknown_record");
        assert!(records.iter().all(|r| r.group_id.is_none()));
    }

    #[test]
    fn group_of_one_is_allowed() {
        let mut records = vec![record("a"), record("b")];
        let gid = create_group(&mut records, &ids(&["b"])).expect("group");
        assert_eq!(records[1].group_id.as_deref(), Some(gid.as_str()));
        assert!(records[0].group_id.is_none());
    }

    #[test]
    fn propagate_is_identical_and_idempotent() {
        let mut records = vec![record("a"), record("b"), record("c"), record("d")];
        let gid = create_group(&mut records, &ids(&["a", "b", "c"])).expect("group");

        let changed = propagate_score(&mut records, &gid, "act", 8.0).expect("propagate");
        assert_eq!(changed.len(), 3);
        for r in &records[..3] {
            assert_eq!(r.entry("act").map(|g| g.score.to_bits()), Some(8.0f64.to_bits()));
        }
        assert!(records[3].entry("act").is_none());

        let snapshot = records.clone();
        let changed = propagate_score(&mut records, &gid, "act", 8.0).expect("again");
        assert!(changed.is_empty());
        assert_eq!(records, snapshot);
    }

    #[test]
    fn propagate_to_unknown_group_fails() {
        let mut records = vec![record("a")];
        assert_eq!(
            propagate_score(&mut records, "nope", "act", 1.0),
            Err(GroupingError::UnknownGroup("nope".to_string()))
        );
    }

    #[test]
    fn dissolve_keeps_scores() {
        let mut records = vec![record("a"), record("b")];
        let gid = create_group(&mut records, &ids(&["a", "b"])).expect("group");
        propagate_score(&mut records, &gid, "act", 6.5).expect("propagate");

        let cleared = dissolve_group(&mut records, &ids(&["a", "b"])).expect("dissolve");
        assert_eq!(cleared, 2);
        for r in &records {
            assert!(r.group_id.is_none());
            assert_eq!(r.entry("act").map(|g| g.score), Some(6.5));
        }
    }

    #[test]
    fn set_score_fans_out_for_members_only() {
        let mut records = vec![record("a"), record("b"), record("c")];
        create_group(&mut records, &ids(&["a", "b"])).expect("group");

        let changed = set_score(&mut records, "b", "act", 3.0).expect("set");
        assert_eq!(changed.len(), 2);
        assert_eq!(records[0].entry("act").map(|g| g.score), Some(3.0));

        let changed = set_score(&mut records, "c", "act", 9.0).expect("set");
        assert_eq!(changed, vec!["c".to_string()]);
        assert_eq!(records[0].entry("act").map(|g| g.score), Some(3.0));
    }

    #[test]
    fn partition_is_derived_from_group_ids() {
        let mut records = vec![record("a"), record("b"), record("c")];
        records[0].group_id = Some("g1".into());
        records[2].group_id = Some("g1".into());
        records[1].grades.push(GradeEntry {
            id: "x".into(),
            activity_id: "act".into(),
            score: 1.0,
        });
        let p = partition(&records);
        assert_eq!(p.groups.get("g1"), Some(&ids(&["a", "c"])));
        assert_eq!(p.ungrouped, ids(&["b"]));
    }
}
