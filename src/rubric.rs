use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::engine::{self, GradeBand, RubricComponent, RubricConfig, SessionTerm};
use crate::error::{EngineError, EngineResult};

/// Loads the rubric document for (tenant, session, term), or None.
pub fn get_rubric(
    conn: &Connection,
    tenant_id: &str,
    session_term: &SessionTerm,
) -> EngineResult<Option<RubricConfig>> {
    let rubric_id: Option<String> = conn
        .query_row(
            "SELECT id FROM rubrics WHERE tenant_id = ? AND session = ? AND term = ?",
            (tenant_id, &session_term.session, &session_term.term),
            |r| r.get(0),
        )
        .optional()?;
    let Some(rubric_id) = rubric_id else {
        return Ok(None);
    };

    let mut comp_stmt = conn.prepare(
        "SELECT name, max_score FROM rubric_components
         WHERE rubric_id = ? ORDER BY sort_order",
    )?;
    let components: Vec<RubricComponent> = comp_stmt
        .query_map([&rubric_id], |r| {
            Ok(RubricComponent {
                name: r.get(0)?,
                max_score: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut band_stmt = conn.prepare(
        "SELECT grade, min_score, max_score, remark FROM grade_bands
         WHERE rubric_id = ? ORDER BY sort_order",
    )?;
    let grading_scale: Vec<GradeBand> = band_stmt
        .query_map([&rubric_id], |r| {
            Ok(GradeBand {
                grade: r.get(0)?,
                min_score: r.get(1)?,
                max_score: r.get(2)?,
                remark: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(RubricConfig {
        id: rubric_id,
        tenant_id: tenant_id.to_string(),
        session: session_term.session.clone(),
        term: session_term.term.clone(),
        components,
        grading_scale,
    }))
}

/// Like get_rubric but a missing document is an error. Used wherever a
/// rubric is required rather than merely displayed.
pub fn active_rubric(
    conn: &Connection,
    tenant_id: &str,
    session_term: &SessionTerm,
) -> EngineResult<RubricConfig> {
    get_rubric(conn, tenant_id, session_term)?.ok_or_else(|| EngineError::ConfigMissing {
        session: session_term.session.clone(),
        term: session_term.term.clone(),
    })
}

/// Replaces the whole rubric document for (tenant, session, term) in one
/// transaction. Validation failures carry every violation and persist
/// nothing. Each successful put issues a fresh rubric id.
pub fn put_rubric(
    conn: &mut Connection,
    tenant_id: &str,
    session_term: &SessionTerm,
    components: Vec<RubricComponent>,
    grading_scale: Vec<GradeBand>,
) -> EngineResult<RubricConfig> {
    let violations = engine::validate_rubric(&components, &grading_scale);
    if !violations.is_empty() {
        return Err(EngineError::Validation(violations));
    }

    let tx = conn.transaction()?;

    let old_id: Option<String> = tx
        .query_row(
            "SELECT id FROM rubrics WHERE tenant_id = ? AND session = ? AND term = ?",
            (tenant_id, &session_term.session, &session_term.term),
            |r| r.get(0),
        )
        .optional()?;
    if let Some(old_id) = old_id {
        tx.execute("DELETE FROM grade_bands WHERE rubric_id = ?", [&old_id])?;
        tx.execute(
            "DELETE FROM rubric_components WHERE rubric_id = ?",
            [&old_id],
        )?;
        tx.execute("DELETE FROM rubrics WHERE id = ?", [&old_id])?;
    }

    let rubric_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    tx.execute(
        "INSERT INTO rubrics(id, tenant_id, session, term, updated_at)
         VALUES(?, ?, ?, ?, ?)",
        (
            &rubric_id,
            tenant_id,
            &session_term.session,
            &session_term.term,
            &now,
        ),
    )?;

    let components: Vec<RubricComponent> = components
        .into_iter()
        .map(|c| RubricComponent {
            name: c.name.trim().to_string(),
            max_score: c.max_score,
        })
        .collect();
    for (i, c) in components.iter().enumerate() {
        tx.execute(
            "INSERT INTO rubric_components(id, rubric_id, name, max_score, sort_order)
             VALUES(?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &rubric_id,
                &c.name,
                c.max_score,
                i as i64,
            ),
        )?;
    }
    for (i, b) in grading_scale.iter().enumerate() {
        tx.execute(
            "INSERT INTO grade_bands(id, rubric_id, grade, min_score, max_score, remark, sort_order)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &rubric_id,
                b.grade.trim(),
                b.min_score,
                b.max_score,
                &b.remark,
                i as i64,
            ),
        )?;
    }

    tx.commit()?;
    tracing::info!(
        tenant = tenant_id,
        session = %session_term.session,
        term = %session_term.term,
        rubric_id = %rubric_id,
        "rubric replaced"
    );

    Ok(RubricConfig {
        id: rubric_id,
        tenant_id: tenant_id.to_string(),
        session: session_term.session.clone(),
        term: session_term.term.clone(),
        components,
        grading_scale,
    })
}
