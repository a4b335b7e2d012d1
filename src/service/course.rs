//! Course use case: the stale-while-revalidate read path and the refresh worker.
//!
//! A read consults the record store first. A fresh record is served as is; a
//! stale one is served immediately while a background refresh is queued; a
//! missing one is fetched through the queue with a short bounded wait, after
//! which the caller is told the record is pending and the job finishes on
//! its own.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;

use crate::domain::{Course, CourseKey};
use crate::error::{RefreshError, Result};
use crate::fetch::CourseFetcher;
use crate::queue::{JobHandler, QueueStatus, RefreshJob, RefreshQueue};
use crate::storage::CourseRepository;

/// How long a reader waits for a first-time fetch before getting `Pending`
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(3);

/// Upper bound on a single upstream fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(300);

/// Outcome of a read by key
#[derive(Debug, Clone, PartialEq)]
pub enum CourseLookup {
    /// The record, possibly stale with a refresh already queued
    Found(Course),
    /// The record does not exist here or upstream
    NotFound,
    /// A fetch for the key is underway; retry shortly
    Pending,
}

/// Pagination request; out-of-range values are normalized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub page: i64,
    /// Page size; 0 returns everything on one page
    pub limit: i64,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self { page: 1, limit: 10 }
    }
}

impl PageQuery {
    pub fn new(page: i64, limit: i64) -> Self {
        Self { page, limit }.normalized()
    }

    /// page < 1 becomes 1, limit < 0 becomes 10, limit > 100 becomes 100
    pub fn normalized(self) -> Self {
        let page = self.page.max(1);
        let limit = match self.limit {
            l if l < 0 => 10,
            l if l > 100 => 100,
            l => l,
        };
        Self { page, limit }
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub limit: i64,
    pub total: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    /// Cut one page out of the full, already ordered result set
    pub fn from_all(all: Vec<T>, query: PageQuery) -> Self {
        let query = query.normalized();
        let total = all.len();

        if query.limit == 0 {
            return Self {
                items: all,
                page: 1,
                limit: 0,
                total,
                total_pages: usize::from(total > 0),
            };
        }

        let limit = query.limit as usize;
        let skip = (query.page as usize - 1).saturating_mul(limit);
        Self {
            items: all.into_iter().skip(skip).take(limit).collect(),
            page: query.page,
            limit: query.limit,
            total,
            total_pages: total.div_ceil(limit),
        }
    }
}

/// Course use case and refresh orchestrator
pub struct CourseService {
    repo: Arc<dyn CourseRepository>,
    fetcher: Option<Arc<dyn CourseFetcher>>,
    queue: Option<Arc<RefreshQueue>>,
    wait_timeout: Duration,
    fetch_timeout: Duration,
}

impl CourseService {
    /// A service with no refresh capability; reads only see stored records
    pub fn new(repo: Arc<dyn CourseRepository>) -> Self {
        Self {
            repo,
            fetcher: None,
            queue: None,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn CourseFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_queue(mut self, queue: Arc<RefreshQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// The queue, but only when there is also something to fetch with
    fn refresh_queue(&self) -> Option<&Arc<RefreshQueue>> {
        self.fetcher.as_ref().and(self.queue.as_ref())
    }

    /// Read a course by key, refreshing it as needed.
    ///
    /// Only a failure of the initial store read is returned as an error;
    /// fetch and persistence problems surface as `NotFound` or `Pending`.
    pub async fn get_course(&self, key: &CourseKey) -> Result<CourseLookup> {
        match self.repo.get(key).await? {
            Some(course) => {
                if course.is_stale() {
                    self.refresh_in_background(key);
                } else {
                    tracing::debug!(key = %key, "serving fresh course");
                }
                Ok(CourseLookup::Found(course))
            }
            None => Ok(self.fetch_missing(key).await),
        }
    }

    fn refresh_in_background(&self, key: &CourseKey) {
        let Some(queue) = self.refresh_queue() else {
            tracing::debug!(key = %key, "course is stale but no refresh is configured");
            return;
        };

        if queue.enqueue(RefreshJob::refresh(key.clone())) {
            tracing::info!(key = %key, "serving stale course, refresh queued");
        } else {
            tracing::debug!(key = %key, "serving stale course, refresh not queued");
        }
    }

    async fn fetch_missing(&self, key: &CourseKey) -> CourseLookup {
        let Some(queue) = self.refresh_queue() else {
            return CourseLookup::NotFound;
        };

        let (job, rx) = RefreshJob::create(key.clone()).with_result_channel();
        if !queue.enqueue(job) {
            tracing::info!(key = %key, "course fetch already pending");
            return CourseLookup::Pending;
        }

        match tokio::time::timeout(self.wait_timeout, rx).await {
            Ok(Ok(Ok(course))) => CourseLookup::Found(course),
            Ok(Ok(Err(e))) => {
                tracing::warn!(key = %key, error = %e, "course fetch failed, reporting not found");
                CourseLookup::NotFound
            }
            Ok(Err(_)) => {
                tracing::warn!(key = %key, "refresh job ended without a result");
                CourseLookup::NotFound
            }
            Err(_) => {
                tracing::info!(
                    key = %key,
                    wait = ?self.wait_timeout,
                    "course fetch still running, continuing in background"
                );
                CourseLookup::Pending
            }
        }
    }

    async fn fetch(&self, key: &CourseKey) -> Result<Course> {
        let fetcher = self
            .fetcher
            .as_ref()
            .ok_or_else(|| RefreshError::Fetch("no upstream fetcher configured".to_string()))?;

        tokio::time::timeout(self.fetch_timeout, fetcher.fetch(key))
            .await
            .map_err(|_| RefreshError::FetchTimeout(self.fetch_timeout))?
    }

    /// Fetch and persist a course that has no record yet
    async fn create_from_upstream(&self, key: &CourseKey) -> Result<Course> {
        let mut course = self.fetch(key).await?;

        // Someone else stored it since the job was queued; keep one record per key
        if let Some(existing) = self.repo.get(key).await? {
            return self.overwrite(existing, course).await;
        }

        let now = Utc::now();
        course.id = String::new();
        course.created_at = now;
        course.updated_at = now;
        course.deleted_at = None;
        self.repo.create(course).await
    }

    /// Fetch and overwrite an existing course, keeping its id and creation time
    async fn update_from_upstream(&self, key: &CourseKey) -> Result<Course> {
        let fetched = self.fetch(key).await?;

        let existing = self
            .repo
            .get(key)
            .await?
            .ok_or_else(|| RefreshError::CourseVanished(key.to_string()))?;
        self.overwrite(existing, fetched).await
    }

    async fn overwrite(&self, existing: Course, mut fetched: Course) -> Result<Course> {
        fetched.id = existing.id;
        fetched.code = existing.code;
        fetched.year = existing.year;
        fetched.semester = existing.semester;
        fetched.created_at = existing.created_at;
        fetched.updated_at = Utc::now();
        fetched.deleted_at = None;
        self.repo.update(&fetched).await?;
        Ok(fetched)
    }

    /// Store a course supplied by the caller
    pub async fn create_course(&self, mut course: Course) -> Result<Course> {
        let key = course.key();
        if key.code.trim().is_empty() {
            return Err(RefreshError::InvalidInput("course code is required".to_string()));
        }
        if self.repo.get(&key).await?.is_some() {
            return Err(RefreshError::AlreadyExists(key.to_string()));
        }

        let now = Utc::now();
        course.id = String::new();
        course.created_at = now;
        course.updated_at = now;
        course.deleted_at = None;
        self.repo.create(course).await
    }

    /// Live courses ordered by code, year and semester
    pub async fn list_courses(&self, query: PageQuery) -> Result<Page<Course>> {
        let mut all = self.repo.list().await?;
        all.sort_by(|a, b| {
            (a.code.as_str(), a.year, a.semester).cmp(&(b.code.as_str(), b.year, b.semester))
        });
        Ok(Page::from_all(all, query))
    }

    /// Soft-delete a course
    pub async fn delete_course(&self, key: &CourseKey) -> Result<()> {
        self.repo.soft_delete(key).await?;
        tracing::info!(key = %key, "course deleted");
        Ok(())
    }

    pub fn queue_status(&self) -> Option<QueueStatus> {
        self.queue.as_ref().map(|q| q.status())
    }
}

#[async_trait]
impl JobHandler for CourseService {
    async fn handle(&self, mut job: RefreshJob) {
        let done = self.queue.as_ref().map(|q| q.done_guard(job.key.clone()));
        let key = job.key.clone();

        let result = if job.is_new {
            self.create_from_upstream(&key).await
        } else {
            self.update_from_upstream(&key).await
        };

        match &result {
            Ok(course) => tracing::info!(key = %key, id = %course.id, created = job.is_new, "course refreshed"),
            Err(RefreshError::CourseVanished(_)) => {
                tracing::warn!(key = %key, "course vanished before refresh could be stored, abandoning")
            }
            Err(RefreshError::CourseNotFound(_)) => {
                tracing::warn!(key = %key, created = job.is_new, "course not found upstream")
            }
            Err(e) => tracing::error!(key = %key, error = %e, created = job.is_new, "course refresh failed"),
        }

        // Release the key before the reader sees the outcome, so a re-read
        // right after a failure is not told the fetch is still pending
        drop(done);
        job.report(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MockCourseFetcher;
    use crate::storage::{CourseStore, JsonlStorage};
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        repo: Arc<CourseStore<JsonlStorage>>,
        fetcher: Arc<MockCourseFetcher>,
        queue: Arc<RefreshQueue>,
        service: Arc<CourseService>,
    }

    fn harness(fetcher: MockCourseFetcher, wait: Duration) -> Harness {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(JsonlStorage::new(dir.path()).unwrap());
        let repo = Arc::new(CourseStore::new(storage));
        let fetcher = Arc::new(fetcher);
        let queue = Arc::new(RefreshQueue::new(10, 2));
        let service = Arc::new(
            CourseService::new(repo.clone())
                .with_fetcher(fetcher.clone())
                .with_queue(queue.clone())
                .with_wait_timeout(wait),
        );
        Harness {
            _dir: dir,
            repo,
            fetcher,
            queue,
            service,
        }
    }

    fn key() -> CourseKey {
        CourseKey::new("CS101", 2568, 1)
    }

    fn upstream(name: &str) -> Course {
        Course::new(&key()).with_name(name)
    }

    async fn store_stale(repo: &CourseStore<JsonlStorage>, name: &str) -> Course {
        let mut course = upstream(name);
        let two_days_ago = Utc::now() - chrono::Duration::days(2);
        course.created_at = two_days_ago;
        course.updated_at = two_days_ago;
        repo.create(course).await.unwrap()
    }

    /// Store whose reads always fail
    struct BrokenRepo;

    #[async_trait]
    impl CourseRepository for BrokenRepo {
        async fn get(&self, _key: &CourseKey) -> Result<Option<Course>> {
            Err(RefreshError::Storage("disk on fire".to_string()))
        }
        async fn create(&self, course: Course) -> Result<Course> {
            Ok(course)
        }
        async fn update(&self, _course: &Course) -> Result<()> {
            Ok(())
        }
        async fn list(&self) -> Result<Vec<Course>> {
            Ok(Vec::new())
        }
        async fn soft_delete(&self, _key: &CourseKey) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_page_query_normalization() {
        assert_eq!(PageQuery::new(0, -5), PageQuery { page: 1, limit: 10 });
        assert_eq!(PageQuery::new(3, 500), PageQuery { page: 3, limit: 100 });
        assert_eq!(PageQuery::new(2, 0), PageQuery { page: 2, limit: 0 });
    }

    #[test]
    fn test_page_from_all() {
        let page = Page::from_all((1..=25).collect::<Vec<_>>(), PageQuery::new(3, 10));
        assert_eq!(page.items, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.total, 25);
        assert_eq!(page.total_pages, 3);

        let everything = Page::from_all((1..=25).collect::<Vec<_>>(), PageQuery::new(4, 0));
        assert_eq!(everything.items.len(), 25);
        assert_eq!(everything.page, 1);
        assert_eq!(everything.total_pages, 1);

        let past_end = Page::from_all(vec![1, 2], PageQuery::new(5, 10));
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.total_pages, 1);
    }

    #[tokio::test]
    async fn test_fresh_course_served_without_refresh() {
        let h = harness(MockCourseFetcher::new(), DEFAULT_WAIT_TIMEOUT);
        let stored = h.repo.create(upstream("Intro")).await.unwrap();

        let lookup = h.service.get_course(&key()).await.unwrap();
        assert_eq!(lookup, CourseLookup::Found(stored));
        assert_eq!(h.queue.status().processing, 0);
        assert_eq!(h.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_stale_course_served_and_refresh_queued() {
        let h = harness(MockCourseFetcher::new(), DEFAULT_WAIT_TIMEOUT);
        let stored = store_stale(&h.repo, "Old name").await;

        let lookup = h.service.get_course(&key()).await.unwrap();
        assert_eq!(lookup, CourseLookup::Found(stored));
        assert_eq!(h.queue.status().codes, vec!["CS101:2568:1".to_string()]);

        // A second stale read does not queue a duplicate
        h.service.get_course(&key()).await.unwrap();
        assert_eq!(h.queue.status().pending, 1);
    }

    #[tokio::test]
    async fn test_stale_refresh_preserves_identity() {
        let h = harness(MockCourseFetcher::new().with_course(upstream("New name")), DEFAULT_WAIT_TIMEOUT);
        let stored = store_stale(&h.repo, "Old name").await;
        h.queue.start(h.service.clone());

        h.service.get_course(&key()).await.unwrap();
        h.queue.stop().await;

        let refreshed = h.repo.get(&key()).await.unwrap().unwrap();
        assert_eq!(refreshed.id, stored.id);
        assert_eq!(refreshed.created_at, stored.created_at);
        assert_eq!(refreshed.name_en, "New name");
        assert!(!refreshed.is_stale());
        assert_eq!(h.queue.status().processed, 1);
        assert_eq!(h.repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_refresh_failure_keeps_old_record() {
        let h = harness(
            MockCourseFetcher::new().with_failure(key(), "upstream down"),
            DEFAULT_WAIT_TIMEOUT,
        );
        let stored = store_stale(&h.repo, "Old name").await;
        h.queue.start(h.service.clone());

        h.service.get_course(&key()).await.unwrap();
        h.queue.stop().await;

        assert_eq!(h.repo.get(&key()).await.unwrap().unwrap(), stored);
        assert!(!h.queue.is_inflight(&key()));
    }

    #[tokio::test]
    async fn test_missing_course_without_fetcher_is_not_found() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(JsonlStorage::new(dir.path()).unwrap());
        let queue = Arc::new(RefreshQueue::new(10, 1));
        let service = CourseService::new(Arc::new(CourseStore::new(storage))).with_queue(queue.clone());

        assert_eq!(service.get_course(&key()).await.unwrap(), CourseLookup::NotFound);
        assert_eq!(queue.status().processing, 0);
    }

    #[tokio::test]
    async fn test_missing_course_fetched_within_wait() {
        let h = harness(MockCourseFetcher::new().with_course(upstream("Intro")), DEFAULT_WAIT_TIMEOUT);
        h.queue.start(h.service.clone());

        let lookup = h.service.get_course(&key()).await.unwrap();
        let CourseLookup::Found(course) = lookup else {
            panic!("expected Found, got {:?}", lookup);
        };
        assert_eq!(course.name_en, "Intro");
        assert!(!course.id.is_empty());

        let stored = h.repo.get(&key()).await.unwrap().unwrap();
        assert_eq!(stored.id, course.id);

        h.queue.stop().await;
        assert_eq!(h.queue.status().processed, 1);
    }

    #[tokio::test]
    async fn test_missing_course_fetch_error_is_not_found() {
        let h = harness(MockCourseFetcher::new(), DEFAULT_WAIT_TIMEOUT);
        h.queue.start(h.service.clone());

        assert_eq!(h.service.get_course(&key()).await.unwrap(), CourseLookup::NotFound);
        assert!(h.repo.get(&key()).await.unwrap().is_none());
        h.queue.stop().await;
    }

    #[tokio::test]
    async fn test_missing_course_already_inflight_is_pending() {
        let h = harness(MockCourseFetcher::new().with_course(upstream("Intro")), DEFAULT_WAIT_TIMEOUT);
        assert!(h.queue.enqueue(RefreshJob::create(key())));

        assert_eq!(h.service.get_course(&key()).await.unwrap(), CourseLookup::Pending);
    }

    #[tokio::test]
    async fn test_slow_fetch_hands_off_to_background() {
        let h = harness(
            MockCourseFetcher::new()
                .with_course(upstream("Slow"))
                .with_delay(Duration::from_millis(300)),
            Duration::from_millis(50),
        );
        h.queue.start(h.service.clone());

        assert_eq!(h.service.get_course(&key()).await.unwrap(), CourseLookup::Pending);
        assert!(h.queue.is_inflight(&key()));

        h.queue.stop().await;
        let stored = h.repo.get(&key()).await.unwrap().unwrap();
        assert_eq!(stored.name_en, "Slow");
        assert!(!h.queue.is_inflight(&key()));
    }

    #[tokio::test]
    async fn test_fetch_timeout_releases_key() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(JsonlStorage::new(dir.path()).unwrap());
        let repo = Arc::new(CourseStore::new(storage));
        let queue = Arc::new(RefreshQueue::new(10, 1));
        let fetcher = MockCourseFetcher::new()
            .with_course(upstream("Never"))
            .with_delay(Duration::from_secs(5));
        let service = Arc::new(
            CourseService::new(repo.clone())
                .with_fetcher(Arc::new(fetcher))
                .with_queue(queue.clone())
                .with_fetch_timeout(Duration::from_millis(50)),
        );
        queue.start(service.clone());

        let (job, rx) = RefreshJob::create(key()).with_result_channel();
        assert!(queue.enqueue(job));
        let result = rx.await.unwrap();
        assert!(matches!(result, Err(RefreshError::FetchTimeout(_))));

        queue.stop().await;
        assert!(!queue.is_inflight(&key()));
        assert!(repo.get(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_of_vanished_course_is_abandoned() {
        let h = harness(MockCourseFetcher::new().with_course(upstream("Intro")), DEFAULT_WAIT_TIMEOUT);
        h.queue.start(h.service.clone());

        let (job, rx) = RefreshJob::refresh(key()).with_result_channel();
        assert!(h.queue.enqueue(job));
        assert!(matches!(rx.await.unwrap(), Err(RefreshError::CourseVanished(_))));

        h.queue.stop().await;
        assert!(h.repo.get(&key()).await.unwrap().is_none());
        assert_eq!(h.queue.status().processed, 1);
    }

    #[tokio::test]
    async fn test_stale_refresh_missing_upstream_is_not_found() {
        let h = harness(MockCourseFetcher::new(), DEFAULT_WAIT_TIMEOUT);
        let stored = store_stale(&h.repo, "Old name").await;
        h.queue.start(h.service.clone());

        let (job, rx) = RefreshJob::refresh(key()).with_result_channel();
        assert!(h.queue.enqueue(job));
        assert!(matches!(rx.await.unwrap(), Err(RefreshError::CourseNotFound(_))));

        h.queue.stop().await;
        assert_eq!(h.repo.get(&key()).await.unwrap().unwrap(), stored);
    }

    #[tokio::test]
    async fn test_key_released_before_result_delivered() {
        let h = harness(MockCourseFetcher::new(), DEFAULT_WAIT_TIMEOUT);
        h.queue.start(h.service.clone());

        let (job, rx) = RefreshJob::create(key()).with_result_channel();
        assert!(h.queue.enqueue(job));
        assert!(rx.await.unwrap().is_err());
        assert!(!h.queue.is_inflight(&key()));
        assert_eq!(h.queue.status().processed, 1);

        h.queue.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reread_after_failed_fetch_is_not_pending() {
        let h = harness(
            MockCourseFetcher::new().with_failure(key(), "upstream down"),
            DEFAULT_WAIT_TIMEOUT,
        );
        h.queue.start(h.service.clone());

        for _ in 0..200 {
            assert_eq!(h.service.get_course(&key()).await.unwrap(), CourseLookup::NotFound);
            assert_eq!(h.service.get_course(&key()).await.unwrap(), CourseLookup::NotFound);
        }

        h.queue.stop().await;
        assert_eq!(h.fetcher.calls(), 400);
    }

    #[tokio::test]
    async fn test_store_read_failure_is_error() {
        let service = CourseService::new(Arc::new(BrokenRepo));
        let result = service.get_course(&key()).await;
        assert!(matches!(result, Err(RefreshError::Storage(_))));
    }

    #[tokio::test]
    async fn test_create_course_rejects_duplicate() {
        let h = harness(MockCourseFetcher::new(), DEFAULT_WAIT_TIMEOUT);
        let created = h.service.create_course(upstream("Intro")).await.unwrap();
        assert!(!created.id.is_empty());

        let result = h.service.create_course(upstream("Intro again")).await;
        assert!(matches!(result, Err(RefreshError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_list_and_delete_courses() {
        let h = harness(MockCourseFetcher::new(), DEFAULT_WAIT_TIMEOUT);
        for code in ["CS300", "CS100", "CS200"] {
            h.service
                .create_course(Course::new(&CourseKey::new(code, 2568, 1)))
                .await
                .unwrap();
        }

        let page = h.service.list_courses(PageQuery::new(1, 2)).await.unwrap();
        let codes: Vec<&str> = page.items.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["CS100", "CS200"]);
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);

        h.service.delete_course(&CourseKey::new("CS200", 2568, 1)).await.unwrap();
        let page = h.service.list_courses(PageQuery::new(1, 0)).await.unwrap();
        assert_eq!(page.total, 2);

        let missing = h.service.delete_course(&CourseKey::new("CS200", 2568, 1)).await;
        assert!(matches!(missing, Err(RefreshError::CourseNotFound(_))));
    }

    #[tokio::test]
    async fn test_queue_status_passthrough() {
        let h = harness(MockCourseFetcher::new(), DEFAULT_WAIT_TIMEOUT);
        assert_eq!(h.service.queue_status().unwrap().workers, 2);

        let bare = CourseService::new(Arc::new(BrokenRepo));
        assert!(bare.queue_status().is_none());
    }
}
