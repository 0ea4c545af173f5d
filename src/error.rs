use serde::Serialize;
use thiserror::Error;

/// One rubric validation failure. `rubric.put` reports every violation it
/// finds in a single response so the admin can fix the whole form at once.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RubricViolation {
    pub code: &'static str,
    pub field: String,
    pub message: String,
}

impl RubricViolation {
    pub fn new(code: &'static str, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            field: field.into(),
            message: message.into(),
        }
    }
}

/// One rejected score entry in a submission batch.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntryViolation {
    pub index: usize,
    pub student_id: String,
    pub component_name: String,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("rubric validation failed ({} violations)", .0.len())]
    Validation(Vec<RubricViolation>),

    #[error("not authorized for class={class_id} subject={subject_id}")]
    Authorization {
        class_id: String,
        subject_id: String,
        arm: Option<String>,
    },

    #[error("no rubric configured for session={session} term={term}")]
    ConfigMissing { session: String, term: String },

    #[error("submission rejected ({} invalid entries)", .0.len())]
    ScoreRange(Vec<EntryViolation>),

    #[error("total {total} matches no band of the grading scale")]
    Ungraded { total: f64 },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
