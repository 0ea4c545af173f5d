use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

use crate::engine::{self, RubricConfig, SessionTerm};
use crate::error::{EngineError, EngineResult, EntryViolation};
use crate::results::{self, ResultRow};
use crate::scope::Scope;

/// One transient score entry as submitted by a front-end.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    pub student_id: String,
    pub component_name: String,
    pub raw_score: f64,
}

#[derive(Debug, Clone)]
pub struct SheetRow {
    pub student_id: String,
    pub display_name: String,
    pub arm: Option<String>,
    pub sort_order: i64,
    /// Component scores, prefilled from any persisted result and mutated by
    /// set_score. Keys are the rubric's own component names.
    pub scores: HashMap<String, f64>,
    pub existing_total: Option<f64>,
    pub existing_grade: Option<String>,
}

/// Request-scoped working set of per-student component scores for one
/// class/subject/session/term. Built behind a Scope check, against the
/// rubric active at load time, and discarded after submission.
#[derive(Debug)]
pub struct ScoreSheet {
    pub tenant_id: String,
    pub class_id: String,
    pub subject_id: String,
    pub arm: Option<String>,
    pub session_term: SessionTerm,
    pub rubric: RubricConfig,
    pub rows: Vec<SheetRow>,
    row_index: HashMap<String, usize>,
    dirty: HashSet<String>,
}

impl ScoreSheet {
    #[allow(clippy::too_many_arguments)]
    pub fn load(
        conn: &Connection,
        scope: &Scope,
        tenant_id: &str,
        class_id: &str,
        subject_id: &str,
        arm: Option<&str>,
        session_term: &SessionTerm,
    ) -> EngineResult<ScoreSheet> {
        if !scope.permits(class_id, subject_id, arm) {
            return Err(EngineError::Authorization {
                class_id: class_id.to_string(),
                subject_id: subject_id.to_string(),
                arm: arm.map(str::to_string),
            });
        }

        // Never default a missing rubric; the caller must configure one first.
        let rubric = crate::rubric::active_rubric(conn, tenant_id, session_term)?;

        let class_exists: Option<String> = conn
            .query_row("SELECT id FROM classes WHERE id = ?", [class_id], |r| {
                r.get(0)
            })
            .optional()?;
        if class_exists.is_none() {
            return Err(EngineError::NotFound {
                entity: "class",
                id: class_id.to_string(),
            });
        }

        let mut stmt = conn.prepare(
            "SELECT id, last_name, first_name, arm, sort_order
             FROM students
             WHERE class_id = ?1 AND active = 1 AND (?2 IS NULL OR arm = ?2)
             ORDER BY sort_order",
        )?;
        let mut rows: Vec<SheetRow> = stmt
            .query_map((class_id, arm), |r| {
                let last: String = r.get(1)?;
                let first: String = r.get(2)?;
                Ok(SheetRow {
                    student_id: r.get(0)?,
                    display_name: format!("{}, {}", last, first),
                    arm: r.get(3)?,
                    sort_order: r.get(4)?,
                    scores: HashMap::new(),
                    existing_total: None,
                    existing_grade: None,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let existing: HashMap<String, ResultRow> =
            results::list_results(conn, class_id, subject_id, session_term)?
                .into_iter()
                .map(|r| (r.student_id.clone(), r))
                .collect();
        for row in &mut rows {
            if let Some(result) = existing.get(&row.student_id) {
                row.scores = result.scores.clone();
                row.existing_total = Some(result.total);
                row.existing_grade = Some(result.grade.clone());
            }
        }

        let row_index = rows
            .iter()
            .enumerate()
            .map(|(i, r)| (r.student_id.clone(), i))
            .collect();

        Ok(ScoreSheet {
            tenant_id: tenant_id.to_string(),
            class_id: class_id.to_string(),
            subject_id: subject_id.to_string(),
            arm: arm.map(str::to_string),
            session_term: session_term.clone(),
            rubric,
            rows,
            row_index,
            dirty: HashSet::new(),
        })
    }

    /// Validates and records one score. Rejected entries leave the sheet
    /// untouched; nothing is ever clamped into range.
    pub fn set_score(
        &mut self,
        student_id: &str,
        component_name: &str,
        raw_score: f64,
    ) -> Result<(), engine::EntryRejection> {
        let component =
            engine::validate_entry(&self.rubric.components, component_name, raw_score)?;
        let component_name = component.name.clone();
        let Some(&i) = self.row_index.get(student_id) else {
            return Err(engine::EntryRejection {
                code: "unknown_student",
                message: format!("student {} is not on this sheet", student_id),
            });
        };
        self.rows[i].scores.insert(component_name, raw_score);
        self.dirty.insert(student_id.to_string());
        Ok(())
    }

    /// Applies a submission batch all-or-nothing: every entry is validated
    /// first and any violation rejects the whole batch.
    pub fn apply_entries(&mut self, entries: &[ScoreEntry]) -> Result<(), Vec<EntryViolation>> {
        let mut violations: Vec<EntryViolation> = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            let rejection = match engine::validate_entry(
                &self.rubric.components,
                &entry.component_name,
                entry.raw_score,
            ) {
                Err(r) => Some(r),
                Ok(_) if !self.row_index.contains_key(&entry.student_id) => {
                    Some(engine::EntryRejection {
                        code: "unknown_student",
                        message: format!("student {} is not on this sheet", entry.student_id),
                    })
                }
                Ok(_) => None,
            };
            if let Some(r) = rejection {
                violations.push(EntryViolation {
                    index,
                    student_id: entry.student_id.clone(),
                    component_name: entry.component_name.clone(),
                    code: r.code,
                    message: r.message,
                });
            }
        }
        if !violations.is_empty() {
            return Err(violations);
        }

        for entry in entries {
            // Already validated; set_score cannot fail here.
            let _ = self.set_score(&entry.student_id, &entry.component_name, entry.raw_score);
        }
        Ok(())
    }

    /// Persists a graded snapshot for every student the batch touched. Each
    /// snapshot merges the prefilled scores with the applied entries, graded
    /// against the rubric active now. One transaction covers the whole
    /// batch, so an ungraded total rolls every snapshot back.
    pub fn submit(&self, conn: &mut Connection) -> EngineResult<usize> {
        let tx = conn.transaction()?;
        let mut updated = 0;
        for row in &self.rows {
            if !self.dirty.contains(&row.student_id) {
                continue;
            }
            results::upsert_result(
                &tx,
                &self.tenant_id,
                &self.class_id,
                &self.subject_id,
                &row.student_id,
                &self.session_term,
                &row.scores,
            )?;
            updated += 1;
        }
        tx.commit()?;
        Ok(updated)
    }
}
