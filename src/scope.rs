use rusqlite::Connection;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::error::EngineResult;

pub const ROLE_TEACHER: &str = "teacher";
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_SUPER_ADMIN: &str = "super_admin";

/// The class/subject/arm combinations one actor may operate on, resolved
/// once per request and threaded into sheet and result calls. Downstream
/// code checks the scope, never the role string.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub all_classes: bool,
    pub class_ids: HashSet<String>,
    pub subject_ids: HashSet<String>,
    /// Arms granted per class. An empty set means every arm of that class.
    pub arms_by_class: HashMap<String, HashSet<String>>,
}

impl Scope {
    pub fn all() -> Self {
        Self {
            all_classes: true,
            ..Self::default()
        }
    }

    pub fn permits(&self, class_id: &str, subject_id: &str, arm: Option<&str>) -> bool {
        if self.all_classes {
            return true;
        }
        if !self.class_ids.contains(class_id) || !self.subject_ids.contains(subject_id) {
            return false;
        }
        let Some(arms) = self.arms_by_class.get(class_id) else {
            return false;
        };
        if arms.is_empty() {
            // Whole-class grant.
            return true;
        }
        match arm {
            Some(a) => arms.contains(a),
            // A sheet spanning all arms needs a whole-class grant.
            None => false,
        }
    }
}

/// Builds an actor's scope. Administrator roles bypass assignment lookup
/// entirely; teachers get exactly their teaching_assignments rows; any other
/// role resolves to an empty scope.
pub fn resolve_scope(conn: &Connection, actor_id: &str, role: &str) -> EngineResult<Scope> {
    let role = role.trim().to_ascii_lowercase();
    if role == ROLE_ADMIN || role == ROLE_SUPER_ADMIN {
        return Ok(Scope::all());
    }
    if role != ROLE_TEACHER {
        return Ok(Scope::default());
    }

    let mut stmt = conn.prepare(
        "SELECT class_id, subject_id, arm
         FROM teaching_assignments
         WHERE teacher_id = ?",
    )?;
    let rows = stmt.query_map([actor_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
        ))
    })?;

    let mut scope = Scope::default();
    let mut whole_class: HashSet<String> = HashSet::new();
    let mut arm_grants: HashMap<String, HashSet<String>> = HashMap::new();
    for row in rows {
        let (class_id, subject_id, arm) = row?;
        scope.class_ids.insert(class_id.clone());
        scope.subject_ids.insert(subject_id);
        match arm {
            None => {
                whole_class.insert(class_id);
            }
            Some(a) => {
                arm_grants.entry(class_id).or_default().insert(a);
            }
        }
    }

    // An arm-less assignment wins over arm-specific grants for the same class.
    for class_id in &scope.class_ids {
        let arms = if whole_class.contains(class_id) {
            HashSet::new()
        } else {
            arm_grants.remove(class_id).unwrap_or_default()
        };
        scope.arms_by_class.insert(class_id.clone(), arms);
    }
    Ok(scope)
}
