//! Schedule definition persistence gateway.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use super::traits::{Filter, Storage};
use crate::domain::ScheduleDefinition;
use crate::error::{RefreshError, Result};
use crate::id::generate_schedule_id;

/// Collection name for schedule definitions in storage
const SCHEDULES_COLLECTION: &str = "schedules";

/// Record store for schedule definitions.
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Persist a new definition, assigning its id. Returns the stored record.
    async fn create(&self, definition: ScheduleDefinition) -> Result<ScheduleDefinition>;

    async fn get(&self, id: &str) -> Result<Option<ScheduleDefinition>>;

    async fn list(&self) -> Result<Vec<ScheduleDefinition>>;

    /// Definitions with `enabled = true`, used to rebuild the scheduler on startup.
    async fn list_enabled(&self) -> Result<Vec<ScheduleDefinition>>;

    /// Overwrite an existing definition. `ScheduleNotFound` if the id is unknown.
    async fn update(&self, definition: &ScheduleDefinition) -> Result<()>;

    /// Remove a definition. `ScheduleNotFound` if the id is unknown.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// `ScheduleRepository` backed by a generic `Storage`.
#[derive(Debug)]
pub struct ScheduleStore<S: Storage> {
    storage: Arc<S>,
}

impl<S: Storage> ScheduleStore<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    fn ensure_exists(&self, id: &str) -> Result<()> {
        let existing: Option<ScheduleDefinition> = self.storage.get(SCHEDULES_COLLECTION, id)?;
        match existing {
            Some(_) => Ok(()),
            None => Err(RefreshError::ScheduleNotFound(id.to_string())),
        }
    }
}

#[async_trait]
impl<S: Storage + 'static> ScheduleRepository for ScheduleStore<S> {
    async fn create(&self, mut definition: ScheduleDefinition) -> Result<ScheduleDefinition> {
        if definition.id.is_empty() {
            definition.id = generate_schedule_id();
        }
        let now = Utc::now();
        definition.created_at = now;
        definition.updated_at = now;
        self.storage.create(SCHEDULES_COLLECTION, &definition)?;
        Ok(definition)
    }

    async fn get(&self, id: &str) -> Result<Option<ScheduleDefinition>> {
        self.storage.get(SCHEDULES_COLLECTION, id)
    }

    async fn list(&self) -> Result<Vec<ScheduleDefinition>> {
        self.storage.list(SCHEDULES_COLLECTION)
    }

    async fn list_enabled(&self) -> Result<Vec<ScheduleDefinition>> {
        self.storage
            .query(SCHEDULES_COLLECTION, &[Filter::eq("enabled", true)])
    }

    async fn update(&self, definition: &ScheduleDefinition) -> Result<()> {
        self.ensure_exists(&definition.id)?;
        let mut updated = definition.clone();
        updated.updated_at = Utc::now();
        self.storage.update(SCHEDULES_COLLECTION, &updated.id, &updated)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.ensure_exists(id)?;
        self.storage.delete(SCHEDULES_COLLECTION, id)
    }
}
