//! Scriptable in-memory fetcher.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::CourseFetcher;
use crate::domain::{Course, CourseKey};
use crate::error::{RefreshError, Result};

/// Canned upstream: returns registered courses, optional artificial latency,
/// and scripted failures per key.
#[derive(Debug, Default)]
pub struct MockCourseFetcher {
    courses: Mutex<HashMap<CourseKey, Course>>,
    failures: Mutex<HashMap<CourseKey, String>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockCourseFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a course served for its own key
    pub fn with_course(self, course: Course) -> Self {
        self.set_course(course);
        self
    }

    /// Delay every fetch by `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make fetches for `key` fail with an upstream error
    pub fn with_failure(self, key: CourseKey, message: impl Into<String>) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(key, message.into());
        }
        self
    }

    /// Replace the course served for its key
    pub fn set_course(&self, course: Course) {
        if let Ok(mut courses) = self.courses.lock() {
            courses.insert(course.key(), course);
        }
    }

    /// Number of fetches started so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CourseFetcher for MockCourseFetcher {
    async fn fetch(&self, key: &CourseKey) -> Result<Course> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failure = self
            .failures
            .lock()
            .map_err(|e| RefreshError::Fetch(e.to_string()))?
            .get(key)
            .cloned();
        if let Some(message) = failure {
            return Err(RefreshError::Fetch(message));
        }

        let course = self
            .courses
            .lock()
            .map_err(|e| RefreshError::Fetch(e.to_string()))?
            .get(key)
            .cloned();

        match course {
            Some(mut course) => {
                course.id = String::new();
                course.updated_at = Utc::now();
                Ok(course)
            }
            None => Err(RefreshError::CourseNotFound(key.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_returns_registered_course() {
        let key = CourseKey::new("CS101", 2568, 1);
        let fetcher = MockCourseFetcher::new().with_course(Course::new(&key).with_name("Intro"));

        let course = fetcher.fetch(&key).await.unwrap();
        assert_eq!(course.name_en, "Intro");
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_key_not_found() {
        let fetcher = MockCourseFetcher::new();
        let result = fetcher.fetch(&CourseKey::new("CS101", 2568, 1)).await;
        assert!(matches!(result, Err(RefreshError::CourseNotFound(_))));
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let key = CourseKey::new("CS101", 2568, 1);
        let fetcher = MockCourseFetcher::new()
            .with_course(Course::new(&key))
            .with_failure(key.clone(), "upstream down");

        let result = fetcher.fetch(&key).await;
        assert!(matches!(result, Err(RefreshError::Fetch(msg)) if msg == "upstream down"));
    }

    #[tokio::test]
    async fn test_delay_applies() {
        let key = CourseKey::new("CS101", 2568, 1);
        let fetcher = MockCourseFetcher::new()
            .with_course(Course::new(&key))
            .with_delay(Duration::from_millis(50));

        let started = std::time::Instant::now();
        fetcher.fetch(&key).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
