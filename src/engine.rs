use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::{EngineError, EngineResult, RubricViolation};

/// Explicit academic period key. Always passed in by the caller; the engine
/// never reads a "current term" from anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionTerm {
    pub session: String,
    pub term: String,
}

impl SessionTerm {
    pub fn new(session: impl Into<String>, term: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            term: term.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricComponent {
    pub name: String,
    pub max_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBand {
    pub grade: String,
    pub min_score: f64,
    pub max_score: f64,
    #[serde(default)]
    pub remark: String,
}

/// One whole rubric document for a (tenant, session, term). `id` changes on
/// every replacement; results record the id that graded them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricConfig {
    pub id: String,
    pub tenant_id: String,
    pub session: String,
    pub term: String,
    pub components: Vec<RubricComponent>,
    pub grading_scale: Vec<GradeBand>,
}

const COMPONENT_SUM_TOLERANCE: f64 = 1e-9;

/// Trimmed, case-folded form used for component-name uniqueness and lookup.
pub fn canonical_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Collects every violation instead of stopping at the first, so a caller
/// can present a complete correction list.
pub fn validate_rubric(
    components: &[RubricComponent],
    grading_scale: &[GradeBand],
) -> Vec<RubricViolation> {
    let mut violations: Vec<RubricViolation> = Vec::new();

    if components.is_empty() {
        violations.push(RubricViolation::new(
            "no_components",
            "components",
            "a rubric needs at least one scoring component",
        ));
    }

    let mut seen: HashSet<String> = HashSet::new();
    for (i, c) in components.iter().enumerate() {
        let field = format!("components[{}]", i);
        if c.name.trim().is_empty() {
            violations.push(RubricViolation::new(
                "blank_component_name",
                field.clone(),
                "component name must not be blank",
            ));
        } else if !seen.insert(canonical_name(&c.name)) {
            violations.push(RubricViolation::new(
                "duplicate_component_name",
                field.clone(),
                format!("duplicate component name: {}", c.name.trim()),
            ));
        }
        if c.max_score <= 0.0 {
            violations.push(RubricViolation::new(
                "non_positive_max_score",
                field,
                format!("maxScore must be positive, got {}", c.max_score),
            ));
        }
    }

    if !components.is_empty() {
        let sum: f64 = components.iter().map(|c| c.max_score).sum();
        if (sum - 100.0).abs() > COMPONENT_SUM_TOLERANCE {
            violations.push(RubricViolation::new(
                "component_sum_not_100",
                "components",
                format!("component maxScores must sum to 100, got {}", sum),
            ));
        }
    }

    for (i, b) in grading_scale.iter().enumerate() {
        let field = format!("gradingScale[{}]", i);
        if b.grade.trim().is_empty() {
            violations.push(RubricViolation::new(
                "blank_grade",
                field.clone(),
                "grade band label must not be blank",
            ));
        }
        if b.min_score > b.max_score {
            violations.push(RubricViolation::new(
                "inverted_band",
                field,
                format!(
                    "band minScore {} exceeds maxScore {}",
                    b.min_score, b.max_score
                ),
            ));
        }
    }

    violations
}

/// Looks a component up by its canonical name.
pub fn find_component<'a>(
    components: &'a [RubricComponent],
    name: &str,
) -> Option<&'a RubricComponent> {
    let wanted = canonical_name(name);
    components
        .iter()
        .find(|c| canonical_name(&c.name) == wanted)
}

#[derive(Debug, Clone)]
pub struct EntryRejection {
    pub code: &'static str,
    pub message: String,
}

/// Validates a single raw score against the active rubric. Out-of-range and
/// unknown-component entries are rejected outright, never clamped.
pub fn validate_entry<'a>(
    components: &'a [RubricComponent],
    component_name: &str,
    raw_score: f64,
) -> Result<&'a RubricComponent, EntryRejection> {
    let Some(component) = find_component(components, component_name) else {
        return Err(EntryRejection {
            code: "unknown_component",
            message: format!("component {} is not in the active rubric", component_name),
        });
    };
    if raw_score < 0.0 {
        return Err(EntryRejection {
            code: "negative_score",
            message: format!("score {} is negative", raw_score),
        });
    }
    if raw_score > component.max_score {
        return Err(EntryRejection {
            code: "exceeds_max_score",
            message: format!(
                "score {} exceeds max {} for {}",
                raw_score, component.max_score, component.name
            ),
        });
    }
    Ok(component)
}

/// Sums scores over the rubric's components only. A score key left over from
/// a renamed or removed component contributes nothing.
pub fn compute_total(scores: &HashMap<String, f64>, components: &[RubricComponent]) -> f64 {
    components
        .iter()
        .map(|c| scores.get(&c.name).copied().unwrap_or(0.0))
        .sum()
}

/// Fixed compatibility scale, used only when a rubric carries no grading
/// scale at all. A scale with coverage gaps never falls back to this.
pub fn legacy_grading_scale() -> Vec<GradeBand> {
    let bands = [
        ("A", 70.0, 100.0, "Excellent"),
        ("B", 60.0, 69.0, "Very Good"),
        ("C", 50.0, 59.0, "Good"),
        ("D", 45.0, 49.0, "Pass"),
        ("E", 40.0, 44.0, "Weak Pass"),
        ("F", 0.0, 39.0, "Fail"),
    ];
    bands
        .iter()
        .map(|(grade, min_score, max_score, remark)| GradeBand {
            grade: grade.to_string(),
            min_score: *min_score,
            max_score: *max_score,
            remark: remark.to_string(),
        })
        .collect()
}

fn match_band<'a>(total: f64, scale: &'a [GradeBand]) -> Option<&'a GradeBand> {
    scale
        .iter()
        .find(|b| b.min_score <= total && total <= b.max_score)
}

/// Resolves the first band covering `total`. With a non-empty scale that
/// covers no band, the total stays explicitly ungraded.
pub fn resolve_grade(total: f64, grading_scale: &[GradeBand]) -> EngineResult<GradeBand> {
    if grading_scale.is_empty() {
        let legacy = legacy_grading_scale();
        return match_band(total, &legacy)
            .cloned()
            .ok_or(EngineError::Ungraded { total });
    }
    match_band(total, grading_scale)
        .cloned()
        .ok_or(EngineError::Ungraded { total })
}
