//! Error types for course-refresh
//!
//! Centralized error handling using thiserror.

use std::time::Duration;

use thiserror::Error;

/// All error types that can occur while reading, refreshing or scheduling courses
#[derive(Debug, Error)]
pub enum RefreshError {
    /// Course not found in storage or upstream
    #[error("Course not found: {0}")]
    CourseNotFound(String),

    /// Stored course was deleted while its refresh was running
    #[error("Course removed during refresh: {0}")]
    CourseVanished(String),

    /// Schedule definition not found in storage
    #[error("Schedule not found: {0}")]
    ScheduleNotFound(String),

    /// A record with the same identity already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Malformed five-field cron expression
    #[error("Invalid cron expression: {0}")]
    InvalidCron(String),

    /// Caller supplied bad input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Upstream course API error
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Upstream call exceeded its deadline
    #[error("Fetch timed out after {0:?}")]
    FetchTimeout(Duration),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for course-refresh operations
pub type Result<T> = std::result::Result<T, RefreshError>;
