//! Refresh jobs and their results

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::domain::{Course, CourseKey};
use crate::error::Result;

/// Outcome delivered to a waiting caller: the refreshed course or the error
/// that ended the job.
pub type JobResult = Result<Course>;

/// A unit of refresh work for one course key
#[derive(Debug)]
pub struct RefreshJob {
    /// Dedup identity; at most one job per key is in flight
    pub key: CourseKey,

    /// true = no record yet, create on success; false = update the existing record
    pub is_new: bool,

    /// Stamped by the queue on admission
    pub enqueued_at: Option<DateTime<Utc>>,

    /// Present only when a caller is waiting for the outcome
    result_tx: Option<oneshot::Sender<JobResult>>,
}

impl RefreshJob {
    /// Job that creates the record on success
    pub fn create(key: CourseKey) -> Self {
        Self {
            key,
            is_new: true,
            enqueued_at: None,
            result_tx: None,
        }
    }

    /// Job that updates an existing record on success
    pub fn refresh(key: CourseKey) -> Self {
        Self {
            is_new: false,
            ..Self::create(key)
        }
    }

    /// Attach a one-shot result channel, returning the receiving half
    pub fn with_result_channel(mut self) -> (Self, oneshot::Receiver<JobResult>) {
        let (tx, rx) = oneshot::channel();
        self.result_tx = Some(tx);
        (self, rx)
    }

    /// Whether a caller is waiting on this job
    pub fn has_waiter(&self) -> bool {
        self.result_tx.is_some()
    }

    /// Deliver the outcome to the waiting caller, if any.
    ///
    /// Returns false when there was no channel or the caller already gave up.
    pub fn report(&mut self, result: JobResult) -> bool {
        match self.result_tx.take() {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RefreshError;

    fn key() -> CourseKey {
        CourseKey::new("CS101", 2568, 1)
    }

    #[test]
    fn test_create_and_refresh_flags() {
        assert!(RefreshJob::create(key()).is_new);
        let refresh = RefreshJob::refresh(key());
        assert!(!refresh.is_new);
        assert!(!refresh.has_waiter());
        assert!(refresh.enqueued_at.is_none());
    }

    #[test]
    fn test_report_without_channel() {
        let mut job = RefreshJob::refresh(key());
        assert!(!job.report(Err(RefreshError::Fetch("x".to_string()))));
    }

    #[tokio::test]
    async fn test_report_delivers_once() {
        let (mut job, rx) = RefreshJob::create(key()).with_result_channel();
        assert!(job.has_waiter());

        assert!(job.report(Ok(Course::new(&key()))));
        assert!(!job.has_waiter());
        assert!(!job.report(Err(RefreshError::Fetch("late".to_string()))));

        let delivered = rx.await.unwrap().unwrap();
        assert_eq!(delivered.key(), key());
    }

    #[test]
    fn test_report_after_receiver_dropped() {
        let (mut job, rx) = RefreshJob::create(key()).with_result_channel();
        drop(rx);
        assert!(!job.report(Ok(Course::new(&key()))));
    }
}
