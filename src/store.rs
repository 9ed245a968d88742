use crate::model::{
    Activity, ActivityBlock, ClassType, Classroom, ClassroomStudentRecord, GradeEntry,
    ScoringScheme, Student,
};
use crate::roster;
use anyhow::Context;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::collections::HashMap;
use uuid::Uuid;

/// Resolves a student id to the backing Student entity.
pub trait StudentDirectory {
    fn resolve(&self, student_id: &str) -> anyhow::Result<Option<Student>>;
}

/// Persists full record snapshots. A call is all-or-nothing.
pub trait RecordWriter {
    fn write_records(&self, records: &[ClassroomStudentRecord]) -> anyhow::Result<()>;
}

pub trait RecordStore: RecordWriter {
    fn read_all_records(&self, classroom_id: &str) -> anyhow::Result<Vec<ClassroomStudentRecord>>;
    fn write_activities(&self, classroom_id: &str, activities: &[Activity]) -> anyhow::Result<()>;
}

pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Replaces the rubric and rewrites the given records in one transaction.
    pub fn replace_rubric(
        &self,
        classroom_id: &str,
        activities: &[Activity],
        records: &[ClassroomStudentRecord],
    ) -> anyhow::Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("failed to open transaction")?;
        write_activities_in(&tx, classroom_id, activities)?;
        write_records_in(&tx, records)?;
        tx.commit().context("failed to commit rubric")?;
        Ok(())
    }
}

impl StudentDirectory for SqliteStore<'_> {
    fn resolve(&self, student_id: &str) -> anyhow::Result<Option<Student>> {
        let student = self
            .conn
            .query_row(
                "SELECT id, name, email, registration_id FROM students WHERE id = ?",
                [student_id],
                |r| {
                    Ok(Student {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        email: r.get(2)?,
                        registration_id: r.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(student)
    }
}

impl RecordWriter for SqliteStore<'_> {
    fn write_records(&self, records: &[ClassroomStudentRecord]) -> anyhow::Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("failed to open transaction")?;
        write_records_in(&tx, records)?;
        tx.commit().context("failed to commit records")?;
        Ok(())
    }
}

impl RecordStore for SqliteStore<'_> {
    fn read_all_records(&self, classroom_id: &str) -> anyhow::Result<Vec<ClassroomStudentRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, student_id, group_id
             FROM classroom_students
             WHERE classroom_id = ?
             ORDER BY rowid",
        )?;
        let mut records: Vec<ClassroomStudentRecord> = stmt
            .query_map([classroom_id], |r| {
                Ok(ClassroomStudentRecord {
                    id: r.get(0)?,
                    student_id: r.get(1)?,
                    grades: Vec::new(),
                    group_id: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let index: HashMap<String, usize> = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();

        let mut entries_stmt = self.conn.prepare(
            "SELECT ge.id, ge.record_id, ge.activity_id, ge.score
             FROM grade_entries ge
             JOIN classroom_students cs ON cs.id = ge.record_id
             WHERE cs.classroom_id = ?
             ORDER BY ge.rowid",
        )?;
        let rows = entries_stmt.query_map([classroom_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, f64>(3)?,
            ))
        })?;
        for row in rows {
            let (id, record_id, activity_id, score) = row?;
            if let Some(&i) = index.get(&record_id) {
                records[i].grades.push(GradeEntry {
                    id,
                    activity_id,
                    score,
                });
            }
        }
        Ok(records)
    }

    fn write_activities(&self, classroom_id: &str, activities: &[Activity]) -> anyhow::Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("failed to open transaction")?;
        write_activities_in(&tx, classroom_id, activities)?;
        tx.commit().context("failed to commit activities")?;
        Ok(())
    }
}

fn write_activities_in(
    conn: &Connection,
    classroom_id: &str,
    activities: &[Activity],
) -> anyhow::Result<()> {
    conn.execute(
        "DELETE FROM activities WHERE classroom_id = ?",
        [classroom_id],
    )
    .context("failed to clear activities")?;
    let mut stmt = conn.prepare(
        "INSERT INTO activities(id, classroom_id, name, max_score, block, sort_order, active)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
    )?;
    for a in activities {
        stmt.execute((
            &a.id,
            classroom_id,
            &a.name,
            a.max_score,
            a.group.as_str(),
            a.order,
            a.active as i64,
        ))
        .with_context(|| format!("failed to insert activity {}", a.id))?;
    }
    Ok(())
}

fn write_records_in(conn: &Connection, records: &[ClassroomStudentRecord]) -> anyhow::Result<()> {
    for r in records {
        let updated = conn
            .execute(
                "UPDATE classroom_students SET group_id = ? WHERE id = ?",
                (&r.group_id, &r.id),
            )
            .with_context(|| format!("failed to update record {}", r.id))?;
        if updated == 0 {
            tracing::warn!(record_id = %r.id, "skipping write for record no longer enrolled");
            continue;
        }

        if r.grades.is_empty() {
            conn.execute("DELETE FROM grade_entries WHERE record_id = ?", [&r.id])?;
        } else {
            let placeholders = vec!["?"; r.grades.len()].join(",");
            let sql = format!(
                "DELETE FROM grade_entries WHERE record_id = ? AND activity_id NOT IN ({})",
                placeholders
            );
            let mut bind_values: Vec<Value> = Vec::with_capacity(r.grades.len() + 1);
            bind_values.push(Value::Text(r.id.clone()));
            for g in &r.grades {
                bind_values.push(Value::Text(g.activity_id.clone()));
            }
            conn.execute(&sql, params_from_iter(bind_values))
                .with_context(|| format!("failed to prune entries for {}", r.id))?;
        }

        for g in &r.grades {
            conn.execute(
                "INSERT INTO grade_entries(id, record_id, activity_id, score)
                 VALUES(?, ?, ?, ?)
                 ON CONFLICT(record_id, activity_id) DO UPDATE SET
                   score = excluded.score",
                (&g.id, &r.id, &g.activity_id, g.score),
            )
            .with_context(|| format!("failed to upsert entry for {}", r.id))?;
        }
    }
    Ok(())
}

fn parse_classroom_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Classroom> {
    let class_type: Option<String> = r.get(2)?;
    let scheme: Option<String> = r.get(3)?;
    Ok(Classroom {
        id: r.get(0)?,
        name: r.get(1)?,
        class_type: class_type.as_deref().and_then(ClassType::parse),
        scoring_scheme: scheme.as_deref().and_then(ScoringScheme::parse),
        created_at: r.get(4)?,
    })
}

pub fn load_classroom(conn: &Connection, classroom_id: &str) -> anyhow::Result<Option<Classroom>> {
    Ok(conn
        .query_row(
            "SELECT id, name, class_type, scoring_scheme, created_at FROM classrooms WHERE id = ?",
            [classroom_id],
            parse_classroom_row,
        )
        .optional()?)
}

pub fn list_classrooms(conn: &Connection) -> anyhow::Result<Vec<Classroom>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, class_type, scoring_scheme, created_at FROM classrooms ORDER BY name",
    )?;
    let rows = stmt
        .query_map([], parse_classroom_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn load_activities(conn: &Connection, classroom_id: &str) -> anyhow::Result<Vec<Activity>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, max_score, block, sort_order, active
         FROM activities
         WHERE classroom_id = ?
         ORDER BY sort_order, rowid",
    )?;
    let rows = stmt
        .query_map([classroom_id], |r| {
            Ok(Activity {
                id: r.get(0)?,
                name: r.get(1)?,
                max_score: r.get(2)?,
                group: ActivityBlock::from(r.get::<_, String>(3)?),
                order: r.get(4)?,
                active: r.get::<_, i64>(5)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn find_student_by_email(conn: &Connection, email: &str) -> anyhow::Result<Option<Student>> {
    Ok(conn
        .query_row(
            "SELECT id, name, email, registration_id FROM students WHERE email = ?",
            [email.trim().to_ascii_lowercase()],
            |r| {
                Ok(Student {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    email: r.get(2)?,
                    registration_id: r.get(3)?,
                })
            },
        )
        .optional()?)
}

pub fn insert_student(
    conn: &Connection,
    name: &str,
    email: &str,
    registration_id: Option<&str>,
) -> anyhow::Result<Student> {
    let student = Student {
        id: Uuid::new_v4().to_string(),
        name: name.trim().to_string(),
        email: email.trim().to_ascii_lowercase(),
        registration_id: registration_id.map(|s| s.to_string()),
    };
    conn.execute(
        "INSERT INTO students(id, name, email, registration_id, created_at) VALUES(?, ?, ?, ?, ?)",
        (
            &student.id,
            &student.name,
            &student.email,
            &student.registration_id,
            chrono::Utc::now().to_rfc3339(),
        ),
    )
    .context("failed to insert student")?;
    Ok(student)
}

/// Enrolls `student_id`; returns the new record id, or None when already enrolled.
pub fn enroll(conn: &Connection, classroom_id: &str, student_id: &str) -> anyhow::Result<Option<String>> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM classroom_students WHERE classroom_id = ? AND student_id = ?",
            (classroom_id, student_id),
            |r| r.get(0),
        )
        .optional()?;
    if existing.is_some() {
        return Ok(None);
    }
    let record_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classroom_students(id, classroom_id, student_id, group_id, enrolled_at)
         VALUES(?, ?, ?, NULL, ?)",
        (
            &record_id,
            classroom_id,
            student_id,
            chrono::Utc::now().to_rfc3339(),
        ),
    )
    .context("failed to enroll student")?;
    Ok(Some(record_id))
}

/// Enrolls `student_id` and writes a zero entry for every active activity through
/// the same connection, so a caller's transaction covers both.
pub fn enroll_seeded(
    conn: &Connection,
    classroom_id: &str,
    student_id: &str,
    activities: &[Activity],
) -> anyhow::Result<Option<ClassroomStudentRecord>> {
    let Some(record_id) = enroll(conn, classroom_id, student_id)? else {
        return Ok(None);
    };
    let mut record = ClassroomStudentRecord {
        id: record_id,
        student_id: student_id.to_string(),
        grades: Vec::new(),
        group_id: None,
    };
    roster::seed_missing_entries(&mut record, activities);
    write_records_in(conn, std::slice::from_ref(&record))?;
    Ok(Some(record))
}
