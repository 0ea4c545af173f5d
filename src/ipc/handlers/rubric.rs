use crate::engine::{GradeBand, RubricComponent, SessionTerm};
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::types::{AppState, Request};
use crate::rubric;
use serde_json::json;

fn parse_session_term(req: &Request) -> Result<SessionTerm, serde_json::Value> {
    let session = match req.params.get("session").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return Err(err(&req.id, "bad_params", "missing session", None)),
    };
    let term = match req.params.get("term").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return Err(err(&req.id, "bad_params", "missing term", None)),
    };
    Ok(SessionTerm { session, term })
}

fn parse_tenant(req: &Request) -> Result<String, serde_json::Value> {
    match req.params.get("tenantId").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(err(&req.id, "bad_params", "missing tenantId", None)),
    }
}

fn handle_rubric_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let tenant_id = match parse_tenant(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let session_term = match parse_session_term(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match rubric::get_rubric(conn, &tenant_id, &session_term) {
        Ok(Some(config)) => ok(
            &req.id,
            json!({ "rubric": serde_json::to_value(&config).unwrap_or_else(|_| json!({})) }),
        ),
        Ok(None) => err(
            &req.id,
            "not_found",
            "no rubric configured",
            Some(json!({
                "session": session_term.session,
                "term": session_term.term
            })),
        ),
        Err(e) => engine_err(&req.id, e),
    }
}

fn handle_rubric_put(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let tenant_id = match parse_tenant(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let session_term = match parse_session_term(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let Some(components_raw) = req.params.get("components") else {
        return err(&req.id, "bad_params", "missing components[]", None);
    };
    let components: Vec<RubricComponent> = match serde_json::from_value(components_raw.clone()) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "bad_params",
                format!("malformed components[]: {}", e),
                None,
            )
        }
    };
    let grading_scale: Vec<GradeBand> = match req.params.get("gradingScale") {
        None => Vec::new(),
        Some(raw) if raw.is_null() => Vec::new(),
        Some(raw) => match serde_json::from_value(raw.clone()) {
            Ok(v) => v,
            Err(e) => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("malformed gradingScale[]: {}", e),
                    None,
                )
            }
        },
    };

    match rubric::put_rubric(conn, &tenant_id, &session_term, components, grading_scale) {
        Ok(config) => ok(&req.id, json!({ "rubricId": config.id })),
        Err(e) => {
            tracing::warn!(
                tenant = %tenant_id,
                session = %session_term.session,
                term = %session_term.term,
                "rubric.put rejected: {}",
                e
            );
            engine_err(&req.id, e)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "rubric.get" => Some(handle_rubric_get(state, req)),
        "rubric.put" => Some(handle_rubric_put(state, req)),
        _ => None,
    }
}
