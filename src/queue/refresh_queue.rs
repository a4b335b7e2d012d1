//! Bounded, deduplicating worker pool for refresh jobs.
//!
//! Admission is keyed by `CourseKey`: while a key is in flight a second
//! enqueue for it is rejected, not queued. A full buffer also rejects, and
//! never leaves the key marked. Workers pull from one shared bounded channel
//! and hand each job to a `JobHandler`, which owns persistence, result
//! delivery and `mark_done`.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use super::job::RefreshJob;
use crate::domain::CourseKey;

/// Processes one admitted job.
///
/// Implementations must call `RefreshQueue::mark_done` for the job's key
/// exactly once (see `RefreshQueue::done_guard`).
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: RefreshJob);
}

/// Point-in-time queue snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    /// Number of workers in the pool
    pub workers: usize,
    /// Jobs buffered but not yet picked up by a worker
    pub pending: usize,
    /// Keys currently in flight
    pub processing: usize,
    /// Lifetime count of jobs marked done
    pub processed: u64,
    /// In-flight keys as `code:acadyear:semester`
    pub codes: Vec<String>,
}

/// Bounded worker pool with per-key admission dedup
#[derive(Debug)]
pub struct RefreshQueue {
    sender: Mutex<Option<mpsc::Sender<RefreshJob>>>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<RefreshJob>>>,
    inflight: Mutex<HashSet<CourseKey>>,
    processed: AtomicU64,
    workers: usize,
    capacity: usize,
    started: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl RefreshQueue {
    /// Create a queue buffering up to `buffer_size` jobs, served by `workers`
    /// workers. Both are clamped to at least 1.
    pub fn new(buffer_size: usize, workers: usize) -> Self {
        let capacity = buffer_size.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            sender: Mutex::new(Some(tx)),
            receiver: Arc::new(tokio::sync::Mutex::new(rx)),
            inflight: Mutex::new(HashSet::new()),
            processed: AtomicU64::new(0),
            workers: workers.max(1),
            capacity,
            started: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn inflight(&self) -> MutexGuard<'_, HashSet<CourseKey>> {
        // The set stays consistent even if a holder panicked; keep using it.
        self.inflight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn sender(&self) -> MutexGuard<'_, Option<mpsc::Sender<RefreshJob>>> {
        self.sender.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Try to admit a job.
    ///
    /// Returns false without side effects when the key is already in flight,
    /// when the buffer is full, or after `stop`. Returns true only if the job
    /// is now buffered for a worker.
    pub fn enqueue(&self, mut job: RefreshJob) -> bool {
        let key = job.key.clone();

        if !self.inflight().insert(key.clone()) {
            tracing::debug!(key = %key, "refresh already in progress, skipping");
            return false;
        }

        job.enqueued_at = Some(Utc::now());

        let sent = match self.sender().as_ref() {
            Some(tx) => tx.try_send(job),
            None => Err(TrySendError::Closed(job)),
        };

        match sent {
            Ok(()) => {
                tracing::info!(key = %key, "enqueued refresh");
                true
            }
            Err(e) => {
                self.inflight().remove(&key);
                match e {
                    TrySendError::Full(_) => {
                        tracing::warn!(key = %key, capacity = self.capacity, "queue full, dropped refresh")
                    }
                    TrySendError::Closed(_) => tracing::warn!(key = %key, "queue stopped, dropped refresh"),
                }
                false
            }
        }
    }

    /// Release a key and count the job as processed.
    ///
    /// No-op for keys that are not in flight.
    pub fn mark_done(&self, key: &CourseKey) {
        if self.inflight().remove(key) {
            self.processed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Guard that calls `mark_done(key)` when dropped, including on early
    /// return or panic.
    pub fn done_guard(self: &Arc<Self>, key: CourseKey) -> DoneGuard {
        DoneGuard {
            queue: Arc::clone(self),
            key,
        }
    }

    pub fn is_inflight(&self, key: &CourseKey) -> bool {
        self.inflight().contains(key)
    }

    /// Spawn the worker pool. Each worker loops until the channel is closed
    /// and drained. Calling `start` more than once has no effect.
    pub fn start<H: JobHandler>(&self, handler: Arc<H>) {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("refresh queue already started");
            return;
        }

        let mut handles = self.handles.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for worker_id in 0..self.workers {
            let receiver = Arc::clone(&self.receiver);
            let handler = Arc::clone(&handler);
            handles.push(tokio::spawn(async move {
                tracing::debug!(worker_id, "worker started");
                loop {
                    let job = receiver.lock().await.recv().await;
                    let Some(job) = job else { break };
                    let key = job.key.clone();

                    if AssertUnwindSafe(handler.handle(job)).catch_unwind().await.is_err() {
                        tracing::error!(worker_id, key = %key, "refresh handler panicked");
                    }
                }
                tracing::debug!(worker_id, "worker stopped");
            }));
        }

        tracing::info!(workers = self.workers, buffer = self.capacity, "refresh queue started");
    }

    /// Close the channel and wait for the workers to drain it.
    ///
    /// Jobs admitted before the call still run to completion.
    pub async fn stop(&self) {
        tracing::info!("stopping refresh queue, waiting for workers to drain");
        self.sender().take();

        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.drain(..).collect()
        };

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "refresh worker exited abnormally");
            }
        }
        tracing::info!("all refresh workers stopped");
    }

    /// Snapshot of the queue's counters and in-flight keys
    pub fn status(&self) -> QueueStatus {
        let codes: Vec<String> = {
            let inflight = self.inflight();
            inflight.iter().map(ToString::to_string).collect()
        };

        let pending = self
            .sender()
            .as_ref()
            .map(|tx| tx.max_capacity() - tx.capacity())
            .unwrap_or(0);

        QueueStatus {
            workers: self.workers,
            pending,
            processing: codes.len(),
            processed: self.processed.load(Ordering::SeqCst),
            codes,
        }
    }
}

/// Calls `RefreshQueue::mark_done` on drop
#[derive(Debug)]
pub struct DoneGuard {
    queue: Arc<RefreshQueue>,
    key: CourseKey,
}

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.queue.mark_done(&self.key);
    }
}
