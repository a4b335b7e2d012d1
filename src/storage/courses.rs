//! Course persistence gateway.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use super::traits::{Filter, Storage};
use crate::domain::{Course, CourseKey};
use crate::error::{RefreshError, Result};
use crate::id::generate_course_id;

/// Collection name for courses in storage
const COURSES_COLLECTION: &str = "courses";

/// Record store for courses, keyed by `CourseKey`.
///
/// Implementations must tolerate concurrent calls for different keys.
#[async_trait]
pub trait CourseRepository: Send + Sync {
    /// Get the live (not soft-deleted) course for a key.
    async fn get(&self, key: &CourseKey) -> Result<Option<Course>>;

    /// Persist a new course, assigning its id. Returns the stored record.
    async fn create(&self, course: Course) -> Result<Course>;

    /// Overwrite an existing course, matched by id.
    async fn update(&self, course: &Course) -> Result<()>;

    /// All live courses.
    async fn list(&self) -> Result<Vec<Course>>;

    /// Mark the course for a key as deleted.
    async fn soft_delete(&self, key: &CourseKey) -> Result<()>;
}

/// `CourseRepository` backed by a generic `Storage`.
#[derive(Debug)]
pub struct CourseStore<S: Storage> {
    storage: Arc<S>,
}

impl<S: Storage> CourseStore<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    fn key_filters(key: &CourseKey) -> [Filter; 4] {
        [
            Filter::eq("code", &key.code),
            Filter::eq("year", key.acadyear),
            Filter::eq("semester", key.semester),
            Filter::is_null("deleted_at"),
        ]
    }
}

#[async_trait]
impl<S: Storage + 'static> CourseRepository for CourseStore<S> {
    async fn get(&self, key: &CourseKey) -> Result<Option<Course>> {
        let found: Vec<Course> = self.storage.query(COURSES_COLLECTION, &Self::key_filters(key))?;
        Ok(found.into_iter().next())
    }

    async fn create(&self, mut course: Course) -> Result<Course> {
        if course.id.is_empty() {
            course.id = generate_course_id();
        }
        self.storage.create(COURSES_COLLECTION, &course)?;
        Ok(course)
    }

    async fn update(&self, course: &Course) -> Result<()> {
        if course.id.is_empty() {
            return Err(RefreshError::InvalidInput(format!("course {} has no id", course.key())));
        }
        self.storage.update(COURSES_COLLECTION, &course.id, course)
    }

    async fn list(&self) -> Result<Vec<Course>> {
        self.storage
            .query(COURSES_COLLECTION, &[Filter::is_null("deleted_at")])
    }

    async fn soft_delete(&self, key: &CourseKey) -> Result<()> {
        let mut course = self
            .get(key)
            .await?
            .ok_or_else(|| RefreshError::CourseNotFound(key.to_string()))?;
        let now = Utc::now();
        course.deleted_at = Some(now);
        course.updated_at = now;
        self.update(&course).await
    }
}
