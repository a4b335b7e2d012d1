//! External fetch gateway - where fresh course data comes from
//!
//! This module provides:
//! - CourseFetcher trait: one upstream call per refresh job
//! - HttpCourseFetcher: JSON-over-HTTP implementation
//! - MockCourseFetcher: scriptable in-memory implementation

mod http;
mod mock;

use async_trait::async_trait;

use crate::domain::{Course, CourseKey};
use crate::error::Result;

pub use http::{HttpCourseFetcher, HttpFetcherConfig};
pub use mock::MockCourseFetcher;

/// Fetches the current upstream version of a course.
///
/// Calls are idempotent; a failed fetch is retried by enqueuing the key again.
/// The returned course carries the requested key and no storage id.
#[async_trait]
pub trait CourseFetcher: Send + Sync {
    async fn fetch(&self, key: &CourseKey) -> Result<Course>;
}
