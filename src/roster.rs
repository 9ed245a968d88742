use crate::model::{Activity, ClassroomStudentRecord};
use std::collections::HashSet;

/// Adds a zero entry for every active activity the record lacks. Returns true if any was added.
pub fn seed_missing_entries(record: &mut ClassroomStudentRecord, activities: &[Activity]) -> bool {
    let mut added = false;
    for a in activities.iter().filter(|a| a.active) {
        if record.entry(&a.id).is_none() {
            record.set_score(&a.id, 0.0);
            added = true;
        }
    }
    added
}

/// Drops entries whose activity is no longer part of the rubric.
pub fn prune_entries(record: &mut ClassroomStudentRecord, activities: &[Activity]) -> bool {
    let known: HashSet<&str> = activities.iter().map(|a| a.id.as_str()).collect();
    let before = record.grades.len();
    record.grades.retain(|g| known.contains(g.activity_id.as_str()));
    record.grades.len() != before
}

fn csv_split(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                buf.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => out.push(std::mem::take(&mut buf)),
            _ => buf.push(ch),
        }
    }
    out.push(buf);
    out
}

pub fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RosterRow {
    pub line: usize,
    pub name: String,
    pub email: String,
    pub registration_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RosterWarning {
    pub line: usize,
    pub code: &'static str,
    pub message: String,
}

/// Parses `name,email[,registrationId]` rows after a header line.
pub fn parse_roster_csv(text: &str) -> (Vec<RosterRow>, Vec<RosterWarning>) {
    let mut rows = Vec::new();
    let mut warnings = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        if i == 0 {
            continue;
        }
        let line_no = i + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let fields = csv_split(line);
        if fields.len() < 2 {
            warnings.push(RosterWarning {
                line: line_no,
                code: "bad_columns",
                message: "expected at least 2 CSV columns".to_string(),
            });
            continue;
        }
        let name = fields[0].trim().to_string();
        let email = fields[1].trim().to_ascii_lowercase();
        if name.is_empty() {
            warnings.push(RosterWarning {
                line: line_no,
                code: "bad_name",
                message: "name must not be empty".to_string(),
            });
            continue;
        }
        if !email.contains('@') {
            warnings.push(RosterWarning {
                line: line_no,
                code: "bad_email",
                message: format!("invalid email: {}", email),
            });
            continue;
        }
        let registration_id = fields
            .get(2)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        rows.push(RosterRow {
            line: line_no,
            name,
            email,
            registration_id,
        });
    }
    (rows, warnings)
}
