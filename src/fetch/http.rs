//! HTTP course fetcher
//!
//! Calls `GET {base_url}/{code}?acadyear={year}&semester={semester}` and
//! decodes the JSON body into a `Course`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};

use super::CourseFetcher;
use crate::domain::{Course, CourseKey};
use crate::error::{RefreshError, Result};

/// Configuration for the HTTP fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl HttpFetcherConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Upstream course API client
#[derive(Debug, Clone)]
pub struct HttpCourseFetcher {
    client: Client,
    base_url: String,
}

impl HttpCourseFetcher {
    pub fn new(config: HttpFetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RefreshError::Fetch(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn course_url(&self, key: &CourseKey) -> String {
        format!("{}/{}", self.base_url, key.code)
    }
}

#[async_trait]
impl CourseFetcher for HttpCourseFetcher {
    async fn fetch(&self, key: &CourseKey) -> Result<Course> {
        let response = self
            .client
            .get(self.course_url(key))
            .query(&[("acadyear", key.acadyear), ("semester", key.semester)])
            .send()
            .await
            .map_err(|e| RefreshError::Fetch(format!("Request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RefreshError::CourseNotFound(key.to_string()));
        }
        if !status.is_success() {
            return Err(RefreshError::Fetch(format!("Upstream returned {} for {}", status, key)));
        }

        let mut course: Course = response
            .json()
            .await
            .map_err(|e| RefreshError::Fetch(format!("Invalid course payload for {}: {}", key, e)))?;

        course.id = String::new();
        course.code = key.code.clone();
        course.year = key.acadyear;
        course.semester = key.semester;
        course.updated_at = Utc::now();
        course.deleted_at = None;

        Ok(course)
    }
}
