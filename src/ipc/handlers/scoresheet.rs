use crate::engine::SessionTerm;
use crate::error::EngineError;
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::types::{AppState, Request};
use crate::scope;
use crate::sheet::{ScoreEntry, ScoreSheet};
use serde_json::json;

const SUBMIT_MAX_ENTRIES: usize = 5000;

struct SheetParams {
    actor_id: String,
    role: String,
    tenant_id: String,
    class_id: String,
    subject_id: String,
    arm: Option<String>,
    session_term: SessionTerm,
}

fn parse_sheet_params(req: &Request) -> Result<SheetParams, serde_json::Value> {
    let required = |key: &str| -> Result<String, serde_json::Value> {
        match req.params.get(key).and_then(|v| v.as_str()) {
            Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
            _ => Err(err(
                &req.id,
                "bad_params",
                format!("missing {}", key),
                None,
            )),
        }
    };
    let actor_id = required("actorId")?;
    let role = required("role")?;
    let tenant_id = required("tenantId")?;
    let class_id = required("classId")?;
    let subject_id = required("subjectId")?;
    let session = required("session")?;
    let term = required("term")?;
    let arm = req
        .params
        .get("arm")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    Ok(SheetParams {
        actor_id,
        role,
        tenant_id,
        class_id,
        subject_id,
        arm,
        session_term: SessionTerm { session, term },
    })
}

fn sheet_view(sheet: &ScoreSheet) -> serde_json::Value {
    let rows: Vec<serde_json::Value> = sheet
        .rows
        .iter()
        .map(|r| {
            json!({
                "studentId": r.student_id,
                "displayName": r.display_name,
                "arm": r.arm,
                "sortOrder": r.sort_order,
                "existingScores": r.scores,
                "total": r.existing_total,
                "grade": r.existing_grade
            })
        })
        .collect();
    json!({
        "classId": sheet.class_id,
        "subjectId": sheet.subject_id,
        "arm": sheet.arm,
        "session": sheet.session_term.session,
        "term": sheet.session_term.term,
        "rubricId": sheet.rubric.id,
        "components": sheet.rubric.components,
        "gradingScale": sheet.rubric.grading_scale,
        "rows": rows
    })
}

fn handle_scoresheet_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let p = match parse_sheet_params(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let actor_scope = match scope::resolve_scope(conn, &p.actor_id, &p.role) {
        Ok(v) => v,
        Err(e) => return engine_err(&req.id, e),
    };
    match ScoreSheet::load(
        conn,
        &actor_scope,
        &p.tenant_id,
        &p.class_id,
        &p.subject_id,
        p.arm.as_deref(),
        &p.session_term,
    ) {
        Ok(sheet) => ok(&req.id, sheet_view(&sheet)),
        Err(e) => engine_err(&req.id, e),
    }
}

fn handle_scoresheet_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let p = match parse_sheet_params(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let Some(entries_raw) = req.params.get("entries") else {
        return err(&req.id, "bad_params", "missing entries[]", None);
    };
    let entries: Vec<ScoreEntry> = match serde_json::from_value(entries_raw.clone()) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "bad_params",
                format!("malformed entries[]: {}", e),
                None,
            )
        }
    };
    if entries.len() > SUBMIT_MAX_ENTRIES {
        return err(
            &req.id,
            "bad_params",
            "submission exceeds max entries",
            Some(json!({
                "entries": entries.len(),
                "maxEntries": SUBMIT_MAX_ENTRIES
            })),
        );
    }

    let actor_scope = match scope::resolve_scope(conn, &p.actor_id, &p.role) {
        Ok(v) => v,
        Err(e) => return engine_err(&req.id, e),
    };
    let mut sheet = match ScoreSheet::load(
        conn,
        &actor_scope,
        &p.tenant_id,
        &p.class_id,
        &p.subject_id,
        p.arm.as_deref(),
        &p.session_term,
    ) {
        Ok(v) => v,
        Err(e) => return engine_err(&req.id, e),
    };

    if let Err(violations) = sheet.apply_entries(&entries) {
        tracing::warn!(
            class = %p.class_id,
            subject = %p.subject_id,
            rejected = violations.len(),
            "scoresheet.submit rejected"
        );
        return engine_err(&req.id, EngineError::ScoreRange(violations));
    }

    match sheet.submit(conn) {
        Ok(updated) => {
            tracing::info!(
                class = %p.class_id,
                subject = %p.subject_id,
                updated,
                "scoresheet submitted"
            );
            ok(&req.id, json!({ "updated": updated }))
        }
        Err(e) => engine_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scoresheet.load" => Some(handle_scoresheet_load(state, req)),
        "scoresheet.submit" => Some(handle_scoresheet_submit(state, req)),
        _ => None,
    }
}
