use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE: &str = "gradebook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classrooms(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            class_type TEXT,
            scoring_scheme TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            registration_id TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_students_email ON students(email)",
        [],
    )?;

    conn.execute(
        &activities_table_sql("activities"),
        [],
    )?;
    migrate_activities_key(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activities_classroom ON activities(classroom_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classroom_students(
            id TEXT PRIMARY KEY,
            classroom_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            group_id TEXT,
            enrolled_at TEXT NOT NULL,
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id),
            UNIQUE(classroom_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classroom_students_classroom ON classroom_students(classroom_id)",
        [],
    )?;

    // No foreign key on activity_id: entries outlive rubric edits.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_entries(
            id TEXT PRIMARY KEY,
            record_id TEXT NOT NULL,
            activity_id TEXT NOT NULL,
            score REAL NOT NULL,
            FOREIGN KEY(record_id) REFERENCES classroom_students(id),
            UNIQUE(record_id, activity_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_entries_record ON grade_entries(record_id)",
        [],
    )?;

    Ok(())
}

/// Activity ids are caller-chosen, so they are keyed per classroom.
fn activities_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {}(
            id TEXT NOT NULL,
            classroom_id TEXT NOT NULL,
            name TEXT NOT NULL,
            max_score REAL NOT NULL,
            block TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            active INTEGER NOT NULL,
            PRIMARY KEY(classroom_id, id),
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id)
        )",
        table
    )
}

/// Older workspaces keyed activities by `id` alone; rebuild the table with the
/// per-classroom key, keeping every row.
fn migrate_activities_key(conn: &Connection) -> anyhow::Result<()> {
    if primary_key_columns(conn, "activities")? != ["id"] {
        return Ok(());
    }
    let tx = conn.unchecked_transaction()?;
    tx.execute(&activities_table_sql("activities_rekeyed"), [])?;
    tx.execute(
        "INSERT INTO activities_rekeyed(id, classroom_id, name, max_score, block, sort_order, active)
         SELECT id, classroom_id, name, max_score, block, sort_order, active FROM activities",
        [],
    )?;
    tx.execute("DROP TABLE activities", [])?;
    tx.execute("ALTER TABLE activities_rekeyed RENAME TO activities", [])?;
    tx.commit()?;
    tracing::info!("activities table rekeyed per classroom");
    Ok(())
}

fn primary_key_columns(conn: &Connection, table: &str) -> anyhow::Result<Vec<String>> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    let mut keyed: Vec<(i64, String)> = Vec::new();
    while let Some(row) = rows.next()? {
        let pk: i64 = row.get(5)?;
        if pk > 0 {
            keyed.push((pk, row.get(1)?));
        }
    }
    keyed.sort();
    Ok(keyed.into_iter().map(|(_, name)| name).collect())
}
