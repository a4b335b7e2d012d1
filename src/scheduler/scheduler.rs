//! Cron-driven dispatcher
//!
//! Live registrations are a map from schedule id to its parsed cron
//! expression and next fire time. A single dispatcher task sleeps until the
//! earliest fire time, then enqueues one fire-and-forget refresh per course
//! code of every due schedule. Changes to the map wake the dispatcher so it
//! can recompute its deadline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

use super::cron_expr::CronSchedule;
use crate::domain::ScheduleDefinition;
use crate::error::{RefreshError, Result};
use crate::queue::{RefreshJob, RefreshQueue};

/// One registered schedule
#[derive(Debug)]
struct Entry {
    definition: ScheduleDefinition,
    schedule: CronSchedule,
    next: Option<DateTime<Local>>,
}

/// State shared between the public handle and the dispatcher task
#[derive(Debug)]
struct Shared {
    queue: Arc<RefreshQueue>,
    entries: Mutex<HashMap<String, Entry>>,
    changed: Notify,
}

impl Shared {
    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn earliest_fire(&self) -> Option<DateTime<Local>> {
        self.entries().values().filter_map(|e| e.next).min()
    }

    /// Fire every schedule due at `now` and advance its next fire time.
    ///
    /// The map lock is released before any enqueue. Returns the number of
    /// schedules fired.
    fn fire_due(&self, now: DateTime<Local>) -> usize {
        let due: Vec<ScheduleDefinition> = {
            let mut entries = self.entries();
            entries
                .values_mut()
                .filter(|e| e.next.is_some_and(|next| next <= now))
                .map(|e| {
                    e.next = e.schedule.next_after(&now);
                    e.definition.clone()
                })
                .collect()
        };

        for definition in &due {
            tracing::info!(schedule_id = %definition.id, name = %definition.name, "schedule fired");
            fan_out(&self.queue, definition);
        }
        due.len()
    }
}

/// Enqueue one refresh per course code; rejected admissions are accepted silently.
fn fan_out(queue: &RefreshQueue, definition: &ScheduleDefinition) -> usize {
    let keys = definition.keys();
    let total = keys.len();
    let admitted = keys
        .into_iter()
        .filter(|key| queue.enqueue(RefreshJob::refresh(key.clone())))
        .count();

    tracing::info!(
        schedule_id = %definition.id,
        admitted,
        skipped = total - admitted,
        "schedule enqueued refreshes"
    );
    admitted
}

async fn sleep_until(deadline: Option<DateTime<Local>>) {
    match deadline {
        Some(at) => {
            let wait = (at - Local::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Live set of cron-triggered refresh campaigns
#[derive(Debug)]
pub struct Scheduler {
    shared: Arc<Shared>,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(queue: Arc<RefreshQueue>) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue,
                entries: Mutex::new(HashMap::new()),
                changed: Notify::new(),
            }),
            shutdown_tx: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the dispatcher task. Calling `start` while running has no effect.
    pub fn start(&self) {
        let mut handle = self.handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if handle.is_some() {
            tracing::warn!("scheduler already started");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        *self.shutdown_tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(shutdown_tx);

        let shared = Arc::clone(&self.shared);
        *handle = Some(tokio::spawn(async move {
            loop {
                let deadline = shared.earliest_fire();
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = shared.changed.notified() => continue,
                    _ = sleep_until(deadline) => {
                        shared.fire_due(Local::now());
                    }
                }
            }
            tracing::debug!("scheduler dispatcher exited");
        }));

        tracing::info!(schedules = self.entry_count(), "scheduler started");
    }

    /// Stop the dispatcher, waiting for a fan-out in progress to finish
    pub async fn stop(&self) {
        // Dropping the sender closes the channel and ends the dispatcher loop
        self.shutdown_tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take();

        let handle = self.handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "scheduler dispatcher exited abnormally");
            }
            tracing::info!("scheduler stopped");
        }
    }

    /// Register, replace or unregister a schedule.
    ///
    /// Any existing entry for the id is removed first. A disabled definition
    /// is left unregistered. An invalid cron expression is an error and also
    /// leaves the id unregistered.
    pub fn add_job(&self, definition: &ScheduleDefinition) -> Result<()> {
        if definition.id.is_empty() {
            return Err(RefreshError::InvalidInput("schedule id is required".to_string()));
        }

        let removed = self.shared.entries().remove(&definition.id).is_some();

        if !definition.enabled {
            tracing::debug!(schedule_id = %definition.id, removed, "schedule disabled, not registered");
            if removed {
                self.shared.changed.notify_one();
            }
            return Ok(());
        }

        let schedule = match CronSchedule::parse(&definition.cron_expr) {
            Ok(schedule) => schedule,
            Err(e) => {
                if removed {
                    self.shared.changed.notify_one();
                }
                return Err(e);
            }
        };
        let next = schedule.next_after(&Local::now());

        self.shared.entries().insert(
            definition.id.clone(),
            Entry {
                definition: definition.clone(),
                schedule,
                next,
            },
        );
        self.shared.changed.notify_one();

        tracing::info!(
            schedule_id = %definition.id,
            cron = %definition.cron_expr,
            next = ?next,
            replaced = removed,
            "schedule registered"
        );
        Ok(())
    }

    /// Unregister a schedule. Returns false if it was not registered.
    pub fn remove_job(&self, id: &str) -> bool {
        let removed = self.shared.entries().remove(id).is_some();
        if removed {
            self.shared.changed.notify_one();
            tracing::info!(schedule_id = %id, "schedule unregistered");
        }
        removed
    }

    /// Register every definition, logging and skipping the ones that fail.
    ///
    /// Returns the number of schedules now registered from this batch.
    pub fn load_jobs(&self, definitions: &[ScheduleDefinition]) -> usize {
        let mut loaded = 0;
        for definition in definitions {
            match self.add_job(definition) {
                Ok(()) if definition.enabled => loaded += 1,
                Ok(()) => {}
                Err(e) => {
                    tracing::error!(schedule_id = %definition.id, error = %e, "failed to load schedule")
                }
            }
        }
        tracing::info!(loaded, total = definitions.len(), "schedules loaded");
        loaded
    }

    /// Run a schedule's fan-out now, without touching its registration.
    ///
    /// Returns the number of refreshes admitted.
    pub fn trigger_job(&self, definition: &ScheduleDefinition) -> usize {
        tracing::info!(schedule_id = %definition.id, "manual trigger");
        fan_out(&self.shared.queue, definition)
    }

    /// Number of live registrations
    pub fn entry_count(&self) -> usize {
        self.shared.entries().len()
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.shared.entries().contains_key(id)
    }

    /// Next fire time of a registered schedule
    pub fn next_fire(&self, id: &str) -> Option<DateTime<Local>> {
        self.shared.entries().get(id).and_then(|e| e.next)
    }
}
