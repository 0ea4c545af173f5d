use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("results.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            arm TEXT,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            active INTEGER NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_sort ON students(class_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teaching_assignments(
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            arm TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            UNIQUE(teacher_id, class_id, subject_id, arm)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teaching_assignments_teacher
         ON teaching_assignments(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rubrics(
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            session TEXT NOT NULL,
            term TEXT NOT NULL,
            updated_at TEXT,
            UNIQUE(tenant_id, session, term)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rubric_components(
            id TEXT PRIMARY KEY,
            rubric_id TEXT NOT NULL,
            name TEXT NOT NULL,
            max_score REAL NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(rubric_id) REFERENCES rubrics(id),
            UNIQUE(rubric_id, name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_rubric_components_rubric
         ON rubric_components(rubric_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_bands(
            id TEXT PRIMARY KEY,
            rubric_id TEXT NOT NULL,
            grade TEXT NOT NULL,
            min_score REAL NOT NULL,
            max_score REAL NOT NULL,
            remark TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(rubric_id) REFERENCES rubrics(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_bands_rubric ON grade_bands(rubric_id)",
        [],
    )?;

    // results.rubric_id is a version reference, not a foreign key:
    // a later rubric.put replaces the rubrics row it points at.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS results(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            session TEXT NOT NULL,
            term TEXT NOT NULL,
            scores_json TEXT NOT NULL,
            total REAL NOT NULL,
            grade TEXT NOT NULL,
            rubric_id TEXT NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            UNIQUE(student_id, subject_id, session, term)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_class_subject
         ON results(class_id, subject_id, session, term)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_student ON results(student_id)",
        [],
    )?;

    ensure_students_updated_at(&conn)?;

    Ok(conn)
}

fn ensure_students_updated_at(conn: &Connection) -> anyhow::Result<()> {
    // Early workspaces were created without the column. Add if needed.
    if table_has_column(conn, "students", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
