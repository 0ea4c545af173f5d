use serde_json::json;

use crate::error::EngineError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Maps a domain error onto the wire envelope. Collected violation lists
/// ride along in details so a front-end can show the full correction list.
pub fn engine_err(id: &str, e: EngineError) -> serde_json::Value {
    let message = e.to_string();
    match e {
        EngineError::Validation(violations) => err(
            id,
            "validation_failed",
            message,
            Some(json!({ "violations": violations })),
        ),
        EngineError::Authorization {
            class_id,
            subject_id,
            arm,
        } => err(
            id,
            "authorization_denied",
            message,
            Some(json!({
                "classId": class_id,
                "subjectId": subject_id,
                "arm": arm
            })),
        ),
        EngineError::ConfigMissing { session, term } => err(
            id,
            "config_missing",
            message,
            Some(json!({ "session": session, "term": term })),
        ),
        EngineError::ScoreRange(violations) => err(
            id,
            "score_range",
            message,
            Some(json!({ "violations": violations })),
        ),
        EngineError::Ungraded { total } => {
            err(id, "ungraded", message, Some(json!({ "total": total })))
        }
        EngineError::NotFound { entity, id: missing } => err(
            id,
            "not_found",
            message,
            Some(json!({ "entity": entity, "id": missing })),
        ),
        EngineError::Db(_) => err(id, "db_query_failed", message, None),
    }
}
