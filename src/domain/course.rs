//! Course record and its composite identity
//!
//! A Course is an externally sourced offering for one academic year and
//! semester. Its identity for refresh purposes is the `CourseKey`
//! (code, academic year, semester), not the storage id.

use std::fmt;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::HasId;

/// Composite key naming a refreshable course record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CourseKey {
    /// Course code, e.g. "CP353004"
    pub code: String,
    /// Academic year in the Buddhist calendar, e.g. 2568
    pub acadyear: i32,
    /// Semester within the academic year, e.g. 1, 2 or 3
    pub semester: i32,
}

impl CourseKey {
    pub fn new(code: impl Into<String>, acadyear: i32, semester: i32) -> Self {
        Self {
            code: code.into(),
            acadyear,
            semester,
        }
    }
}

impl fmt::Display for CourseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.code, self.acadyear, self.semester)
    }
}

/// A course offering as persisted and as returned by the upstream API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    //=== Identity ===
    /// Storage id, assigned by the repository on create
    #[serde(default)]
    pub id: String,

    /// Course code, e.g. "CP353004"
    pub code: String,

    /// Academic year, e.g. 2568
    pub year: i32,

    /// Semester, e.g. 1
    pub semester: i32,

    //=== Offering ===
    #[serde(default)]
    pub name_en: String,
    #[serde(default)]
    pub name_th: String,
    #[serde(default)]
    pub faculty: String,
    /// Credit string as published, e.g. "3 (2-2-5)"
    #[serde(default)]
    pub credits: String,
    #[serde(default)]
    pub prerequisite: String,
    #[serde(default)]
    pub program: String,
    #[serde(default)]
    pub sections: Vec<Section>,

    //=== Timestamps ===
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    /// Set when the course is soft-deleted
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A section of a course
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Section {
    /// Section number, e.g. "01"
    pub number: String,
    #[serde(default)]
    pub seats: u32,
    #[serde(default, alias = "instructor")]
    pub instructors: Vec<String>,
    /// Exam date as published upstream
    #[serde(default)]
    pub exam_date: String,
    #[serde(default, alias = "schedules")]
    pub meetings: Vec<ClassMeeting>,
}

/// One weekly class meeting of a section
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassMeeting {
    pub day: String,
    /// Time range, e.g. "13:00-15:00"
    pub time: String,
    #[serde(default)]
    pub room: String,
    /// Meeting kind, e.g. "Lecture" or "Lab"
    #[serde(default, rename = "type")]
    pub kind: String,
}

impl Course {
    /// Create an empty course for the given key with both timestamps set to now
    pub fn new(key: &CourseKey) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            code: key.code.clone(),
            year: key.acadyear,
            semester: key.semester,
            name_en: String::new(),
            name_th: String::new(),
            faculty: String::new(),
            credits: String::new(),
            prerequisite: String::new(),
            program: String::new(),
            sections: Vec::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Builder-style name setter
    pub fn with_name(mut self, name_en: impl Into<String>) -> Self {
        self.name_en = name_en.into();
        self
    }

    /// The composite refresh key of this course
    pub fn key(&self) -> CourseKey {
        CourseKey::new(self.code.clone(), self.year, self.semester)
    }

    /// Whether the course has been soft-deleted
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// A course is fresh when it was last updated on the same local calendar
    /// day as `now`, regardless of the hour.
    pub fn is_fresh_at(&self, now: DateTime<Local>) -> bool {
        self.updated_at.with_timezone(&Local).date_naive() == now.date_naive()
    }

    /// Whether the course needs a refresh as of the current local time
    pub fn is_stale(&self) -> bool {
        !self.is_fresh_at(Local::now())
    }
}

impl HasId for Course {
    fn id(&self) -> &str {
        &self.id
    }
}
