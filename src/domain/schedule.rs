//! Schedule definitions
//!
//! A ScheduleDefinition is a user-managed, cron-triggered campaign that
//! refreshes a fixed list of course codes for one academic year and semester.
//! The persisted record is the source of truth; the scheduler only mirrors
//! the enabled ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CourseKey;
use crate::storage::HasId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDefinition {
    /// Unique id, assigned by the repository on create
    #[serde(default)]
    pub id: String,

    /// Human-readable label, e.g. "Refresh CP courses"
    pub name: String,

    /// Five-field cron expression, e.g. "0 */6 * * *"
    pub cron_expr: String,

    /// Course codes refreshed on every fire
    pub course_codes: Vec<String>,

    pub acadyear: i32,
    pub semester: i32,

    pub enabled: bool,

    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

impl ScheduleDefinition {
    /// Create an enabled definition with no id yet
    pub fn new(
        name: impl Into<String>,
        cron_expr: impl Into<String>,
        course_codes: Vec<String>,
        acadyear: i32,
        semester: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            name: name.into(),
            cron_expr: cron_expr.into(),
            course_codes,
            acadyear,
            semester,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder-style id setter
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Builder-style enabled setter
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// One refresh key per course code, in definition order
    pub fn keys(&self) -> Vec<CourseKey> {
        self.course_codes
            .iter()
            .map(|code| CourseKey::new(code.clone(), self.acadyear, self.semester))
            .collect()
    }
}

impl HasId for ScheduleDefinition {
    fn id(&self) -> &str {
        &self.id
    }
}
