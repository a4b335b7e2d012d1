//! Daemon wiring - builds and owns every long-lived component

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::fetch::{CourseFetcher, HttpCourseFetcher, HttpFetcherConfig};
use crate::queue::RefreshQueue;
use crate::scheduler::Scheduler;
use crate::service::{CourseService, ScheduleService};
use crate::storage::{CourseStore, JsonlStorage, ScheduleRepository, ScheduleStore};

/// The running refresh subsystem
pub struct Daemon {
    /// Read path, refresh worker and course CRUD
    pub courses: Arc<CourseService>,
    /// Schedule management
    pub schedules: Arc<ScheduleService>,
    pub queue: Arc<RefreshQueue>,
    pub scheduler: Arc<Scheduler>,
    schedule_repo: Arc<dyn ScheduleRepository>,
}

impl Daemon {
    /// Build all components from configuration.
    ///
    /// An HTTP fetcher is created only when `fetcher.base_url` is set.
    pub fn build(config: &Config) -> Result<Self> {
        let fetcher: Option<Arc<dyn CourseFetcher>> = match &config.fetcher.base_url {
            Some(url) => {
                let http_config = HttpFetcherConfig::new(url.clone())
                    .with_timeout(std::time::Duration::from_millis(config.fetcher.request_timeout_ms));
                Some(Arc::new(HttpCourseFetcher::new(http_config)?))
            }
            None => {
                tracing::warn!("no upstream URL configured, missing courses will not be fetched");
                None
            }
        };
        Self::with_fetcher(config, fetcher)
    }

    /// Build all components around the given fetcher
    pub fn with_fetcher(config: &Config, fetcher: Option<Arc<dyn CourseFetcher>>) -> Result<Self> {
        let storage = Arc::new(JsonlStorage::new(&config.storage.data_dir)?);
        let course_repo = Arc::new(CourseStore::new(storage.clone()));
        let schedule_repo: Arc<dyn ScheduleRepository> = Arc::new(ScheduleStore::new(storage));

        let queue = Arc::new(RefreshQueue::new(config.queue.buffer_capacity(), config.queue.worker_count()));
        let scheduler = Arc::new(Scheduler::new(queue.clone()));

        let mut courses = CourseService::new(course_repo)
            .with_queue(queue.clone())
            .with_wait_timeout(config.refresh.wait_timeout())
            .with_fetch_timeout(config.refresh.fetch_timeout());
        if let Some(fetcher) = fetcher {
            courses = courses.with_fetcher(fetcher);
        }

        let schedules = Arc::new(ScheduleService::new(schedule_repo.clone(), scheduler.clone()));

        Ok(Self {
            courses: Arc::new(courses),
            schedules,
            queue,
            scheduler,
            schedule_repo,
        })
    }

    /// Start workers, restore enabled schedules, then start the scheduler.
    ///
    /// Returns the number of schedules registered.
    pub async fn start(&self) -> Result<usize> {
        self.queue.start(self.courses.clone());

        let enabled = self.schedule_repo.list_enabled().await?;
        let loaded = self.scheduler.load_jobs(&enabled);
        self.scheduler.start();

        tracing::info!(workers = self.queue.workers(), schedules = loaded, "refresh daemon started");
        Ok(loaded)
    }

    /// Stop the scheduler first so nothing new is produced, then drain the queue
    pub async fn shutdown(&self) {
        tracing::info!("shutting down refresh daemon");
        self.scheduler.stop().await;
        self.queue.stop().await;
        tracing::info!("refresh daemon stopped");
    }
}
