use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::engine::{self, SessionTerm};
use crate::error::EngineResult;
use crate::rubric;

/// One persisted, graded snapshot for a (student, subject, session, term).
/// total and grade were computed against the rubric identified by rubric_id
/// and stay as written until the next upsert overwrites the row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRow {
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    pub class_id: String,
    pub session: String,
    pub term: String,
    pub scores: HashMap<String, f64>,
    pub total: f64,
    pub grade: String,
    pub rubric_id: String,
    pub updated_at: Option<String>,
}

/// Grades and persists one student's snapshot. The rubric active for the
/// (tenant, session, term) at this moment decides total and grade; the whole
/// row is overwritten on conflict.
pub fn upsert_result(
    conn: &Connection,
    tenant_id: &str,
    class_id: &str,
    subject_id: &str,
    student_id: &str,
    session_term: &SessionTerm,
    scores: &HashMap<String, f64>,
) -> EngineResult<ResultRow> {
    let rubric = rubric::active_rubric(conn, tenant_id, session_term)?;
    let total = engine::compute_total(scores, &rubric.components);
    let band = engine::resolve_grade(total, &rubric.grading_scale)?;

    let scores_json = serde_json::to_string(scores).unwrap_or_else(|_| "{}".to_string());
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO results(id, student_id, subject_id, class_id, session, term,
                             scores_json, total, grade, rubric_id, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, subject_id, session, term) DO UPDATE SET
           class_id = excluded.class_id,
           scores_json = excluded.scores_json,
           total = excluded.total,
           grade = excluded.grade,
           rubric_id = excluded.rubric_id,
           updated_at = excluded.updated_at",
        (
            &id,
            student_id,
            subject_id,
            class_id,
            &session_term.session,
            &session_term.term,
            &scores_json,
            total,
            &band.grade,
            &rubric.id,
            &now,
        ),
    )?;

    Ok(ResultRow {
        id,
        student_id: student_id.to_string(),
        subject_id: subject_id.to_string(),
        class_id: class_id.to_string(),
        session: session_term.session.clone(),
        term: session_term.term.clone(),
        scores: scores.clone(),
        total,
        grade: band.grade,
        rubric_id: rubric.id,
        updated_at: Some(now),
    })
}

/// Stored snapshots for one class/subject/term, in student sort order.
/// Totals and grades are returned as persisted; no recompute on read.
pub fn list_results(
    conn: &Connection,
    class_id: &str,
    subject_id: &str,
    session_term: &SessionTerm,
) -> EngineResult<Vec<ResultRow>> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.student_id, r.class_id, r.session, r.term,
                r.scores_json, r.total, r.grade, r.rubric_id, r.updated_at
         FROM results r
         JOIN students s ON s.id = r.student_id
         WHERE r.class_id = ? AND r.subject_id = ? AND r.session = ? AND r.term = ?
         ORDER BY s.sort_order",
    )?;
    let rows = stmt.query_map(
        (
            class_id,
            subject_id,
            &session_term.session,
            &session_term.term,
        ),
        |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, String>(5)?,
                r.get::<_, f64>(6)?,
                r.get::<_, String>(7)?,
                r.get::<_, String>(8)?,
                r.get::<_, Option<String>>(9)?,
            ))
        },
    )?;

    let mut results = Vec::new();
    for row in rows {
        let (id, student_id, row_class_id, session, term, scores_json, total, grade, rubric_id, updated_at) =
            row?;
        let scores: HashMap<String, f64> =
            serde_json::from_str(&scores_json).unwrap_or_default();
        results.push(ResultRow {
            id,
            student_id,
            subject_id: subject_id.to_string(),
            class_id: row_class_id,
            session,
            term,
            scores,
            total,
            grade,
            rubric_id,
            updated_at,
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_db;
    use crate::engine::RubricComponent;
    use crate::error::EngineError;
    use crate::rubric::put_rubric;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_workspace() -> PathBuf {
        std::env::temp_dir().join(format!(
            "resultsd-results-{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ))
    }

    fn component(name: &str, max_score: f64) -> RubricComponent {
        RubricComponent {
            name: name.to_string(),
            max_score,
        }
    }

    fn seed_class(conn: &Connection) {
        conn.execute("INSERT INTO classes(id, name) VALUES('jss1', 'JSS 1')", [])
            .expect("class");
        conn.execute(
            "INSERT INTO subjects(id, name) VALUES('math', 'Mathematics')",
            [],
        )
        .expect("subject");
        conn.execute(
            "INSERT INTO students(id, class_id, arm, last_name, first_name, sort_order, active)
             VALUES('st1', 'jss1', 'A', 'Adeyemi', 'Bola', 0, 1)",
            [],
        )
        .expect("student");
    }

    #[test]
    fn snapshot_survives_a_later_rubric_change() {
        let mut conn = open_db(&temp_workspace()).expect("open");
        seed_class(&conn);
        let st = SessionTerm::new("2025/2026", "first");
        put_rubric(
            &mut conn,
            "tenant-1",
            &st,
            vec![component("CA1", 20.0), component("Exam", 80.0)],
            engine::legacy_grading_scale(),
        )
        .expect("put");

        let mut scores = HashMap::new();
        scores.insert("CA1".to_string(), 18.0);
        scores.insert("Exam".to_string(), 55.0);
        let written =
            upsert_result(&conn, "tenant-1", "jss1", "math", "st1", &st, &scores).expect("upsert");
        assert_eq!(written.total, 73.0);
        assert_eq!(written.grade, "A");

        // Replace the rubric; the stored snapshot must not move.
        put_rubric(
            &mut conn,
            "tenant-1",
            &st,
            vec![component("Exam", 100.0)],
            engine::legacy_grading_scale(),
        )
        .expect("replace");

        let listed = list_results(&conn, "jss1", "math", &st).expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].total, 73.0);
        assert_eq!(listed[0].grade, "A");
        assert_eq!(listed[0].rubric_id, written.rubric_id);
        assert_eq!(listed[0].scores.get("CA1"), Some(&18.0));
    }

    #[test]
    fn reupsert_overwrites_the_whole_snapshot() {
        let mut conn = open_db(&temp_workspace()).expect("open");
        seed_class(&conn);
        let st = SessionTerm::new("2025/2026", "first");
        put_rubric(
            &mut conn,
            "tenant-1",
            &st,
            vec![component("CA1", 20.0), component("Exam", 80.0)],
            vec![],
        )
        .expect("put");

        let mut first = HashMap::new();
        first.insert("CA1".to_string(), 10.0);
        first.insert("Exam".to_string(), 50.0);
        upsert_result(&conn, "tenant-1", "jss1", "math", "st1", &st, &first).expect("upsert");

        let mut second = HashMap::new();
        second.insert("Exam".to_string(), 42.0);
        upsert_result(&conn, "tenant-1", "jss1", "math", "st1", &st, &second).expect("upsert");

        let listed = list_results(&conn, "jss1", "math", &st).expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].total, 42.0);
        assert_eq!(listed[0].grade, "E");
        assert!(listed[0].scores.get("CA1").is_none());
    }

    #[test]
    fn upsert_without_a_rubric_is_config_missing() {
        let conn = open_db(&temp_workspace()).expect("open");
        seed_class(&conn);
        let st = SessionTerm::new("2025/2026", "first");
        let err = upsert_result(&conn, "tenant-1", "jss1", "math", "st1", &st, &HashMap::new())
            .expect_err("no rubric");
        assert!(matches!(err, EngineError::ConfigMissing { .. }));
    }
}
