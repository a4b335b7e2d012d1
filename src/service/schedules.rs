//! Schedule management use case.
//!
//! The repository is the source of truth. Every successful write is mirrored
//! into the live scheduler; a failure to mirror is logged and does not undo
//! the write.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::ScheduleDefinition;
use crate::error::{RefreshError, Result};
use crate::scheduler::{Scheduler, validate_cron_expr};
use crate::storage::ScheduleRepository;

/// Live timer registrations, as seen by the schedule use case
pub trait ScheduleRegistry: Send + Sync {
    /// Register, replace or (when disabled) unregister a schedule
    fn add_job(&self, definition: &ScheduleDefinition) -> Result<()>;

    fn remove_job(&self, id: &str) -> bool;

    /// Fan out a schedule now; returns the number of refreshes admitted
    fn trigger_job(&self, definition: &ScheduleDefinition) -> usize;
}

impl ScheduleRegistry for Scheduler {
    fn add_job(&self, definition: &ScheduleDefinition) -> Result<()> {
        Scheduler::add_job(self, definition)
    }

    fn remove_job(&self, id: &str) -> bool {
        Scheduler::remove_job(self, id)
    }

    fn trigger_job(&self, definition: &ScheduleDefinition) -> usize {
        Scheduler::trigger_job(self, definition)
    }
}

/// Changes applied by `ScheduleService::update`; `None` keeps the current value
#[derive(Debug, Clone, Default)]
pub struct ScheduleUpdate {
    pub name: Option<String>,
    pub cron_expr: Option<String>,
    pub course_codes: Option<Vec<String>>,
    pub acadyear: Option<i32>,
    pub semester: Option<i32>,
    pub enabled: Option<bool>,
}

impl ScheduleUpdate {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }

    fn apply(self, definition: &mut ScheduleDefinition) {
        if let Some(name) = self.name {
            definition.name = name;
        }
        if let Some(cron_expr) = self.cron_expr {
            definition.cron_expr = cron_expr;
        }
        if let Some(course_codes) = self.course_codes {
            definition.course_codes = course_codes;
        }
        if let Some(acadyear) = self.acadyear {
            definition.acadyear = acadyear;
        }
        if let Some(semester) = self.semester {
            definition.semester = semester;
        }
        if let Some(enabled) = self.enabled {
            definition.enabled = enabled;
        }
    }
}

/// Create, edit and trigger schedule definitions
pub struct ScheduleService {
    repo: Arc<dyn ScheduleRepository>,
    registry: Arc<dyn ScheduleRegistry>,
}

impl ScheduleService {
    pub fn new(repo: Arc<dyn ScheduleRepository>, registry: Arc<dyn ScheduleRegistry>) -> Self {
        Self { repo, registry }
    }

    fn validate(definition: &ScheduleDefinition) -> Result<()> {
        if definition.name.trim().is_empty() {
            return Err(RefreshError::InvalidInput("schedule name is required".to_string()));
        }
        if definition.course_codes.is_empty() {
            return Err(RefreshError::InvalidInput("at least one course code is required".to_string()));
        }
        validate_cron_expr(&definition.cron_expr)
    }

    fn register(&self, definition: &ScheduleDefinition) {
        if let Err(e) = self.registry.add_job(definition) {
            tracing::error!(schedule_id = %definition.id, error = %e, "failed to register schedule");
        }
    }

    pub async fn create(&self, definition: ScheduleDefinition) -> Result<ScheduleDefinition> {
        Self::validate(&definition)?;
        let created = self.repo.create(definition).await?;
        tracing::info!(schedule_id = %created.id, name = %created.name, enabled = created.enabled, "schedule created");

        if created.enabled {
            self.register(&created);
        }
        Ok(created)
    }

    pub async fn list(&self) -> Result<Vec<ScheduleDefinition>> {
        let mut all = self.repo.list().await?;
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    pub async fn get(&self, id: &str) -> Result<ScheduleDefinition> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| RefreshError::ScheduleNotFound(id.to_string()))
    }

    /// Apply changes, persist, then re-register. Enabling and disabling go
    /// through here as well.
    pub async fn update(&self, id: &str, changes: ScheduleUpdate) -> Result<ScheduleDefinition> {
        let mut definition = self.get(id).await?;
        changes.apply(&mut definition);
        Self::validate(&definition)?;

        definition.updated_at = Utc::now();
        self.repo.update(&definition).await?;
        tracing::info!(schedule_id = %id, enabled = definition.enabled, "schedule updated");

        self.register(&definition);
        Ok(definition)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.repo.delete(id).await?;
        self.registry.remove_job(id);
        tracing::info!(schedule_id = %id, "schedule deleted");
        Ok(())
    }

    /// Run a schedule now, whether or not it is enabled
    pub async fn trigger(&self, id: &str) -> Result<usize> {
        let definition = self.get(id).await?;
        Ok(self.registry.trigger_job(&definition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{JsonlStorage, ScheduleStore};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Registry that records what it was asked to do
    #[derive(Default)]
    struct FakeRegistry {
        live: Mutex<HashMap<String, ScheduleDefinition>>,
        triggered: Mutex<Vec<String>>,
        fail_adds: bool,
    }

    impl ScheduleRegistry for FakeRegistry {
        fn add_job(&self, definition: &ScheduleDefinition) -> Result<()> {
            let mut live = self.live.lock().unwrap();
            live.remove(&definition.id);
            if self.fail_adds {
                return Err(RefreshError::InvalidCron("rejected".to_string()));
            }
            if definition.enabled {
                live.insert(definition.id.clone(), definition.clone());
            }
            Ok(())
        }

        fn remove_job(&self, id: &str) -> bool {
            self.live.lock().unwrap().remove(id).is_some()
        }

        fn trigger_job(&self, definition: &ScheduleDefinition) -> usize {
            self.triggered.lock().unwrap().push(definition.id.clone());
            definition.course_codes.len()
        }
    }

    fn setup(registry: FakeRegistry) -> (TempDir, Arc<FakeRegistry>, ScheduleService) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(JsonlStorage::new(dir.path()).unwrap());
        let registry = Arc::new(registry);
        let service = ScheduleService::new(Arc::new(ScheduleStore::new(storage)), registry.clone());
        (dir, registry, service)
    }

    fn definition(cron: &str) -> ScheduleDefinition {
        ScheduleDefinition::new(
            "CP courses",
            cron,
            vec!["CP353004".to_string(), "CP353002".to_string()],
            2568,
            1,
        )
    }

    #[tokio::test]
    async fn test_create_registers_enabled() {
        let (_dir, registry, service) = setup(FakeRegistry::default());

        let created = service.create(definition("0 */6 * * *")).await.unwrap();
        assert!(!created.id.is_empty());
        assert!(registry.live.lock().unwrap().contains_key(&created.id));
    }

    #[tokio::test]
    async fn test_create_disabled_not_registered() {
        let (_dir, registry, service) = setup(FakeRegistry::default());

        service
            .create(definition("0 */6 * * *").with_enabled(false))
            .await
            .unwrap();
        assert!(registry.live.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_input() {
        let (_dir, _registry, service) = setup(FakeRegistry::default());

        let bad_cron = service.create(definition("every monday")).await;
        assert!(matches!(bad_cron, Err(RefreshError::InvalidCron(_))));

        let mut no_codes = definition("0 0 * * *");
        no_codes.course_codes.clear();
        assert!(matches!(service.create(no_codes).await, Err(RefreshError::InvalidInput(_))));

        assert!(service.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_registration_failure_still_persists() {
        let registry = FakeRegistry {
            fail_adds: true,
            ..FakeRegistry::default()
        };
        let (_dir, _registry, service) = setup(registry);

        let created = service.create(definition("0 0 * * *")).await.unwrap();
        assert_eq!(service.get(&created.id).await.unwrap().id, created.id);
    }

    #[tokio::test]
    async fn test_disable_and_enable_through_update() {
        let (_dir, registry, service) = setup(FakeRegistry::default());
        let created = service.create(definition("0 0 * * *")).await.unwrap();

        let disabled = service.update(&created.id, ScheduleUpdate::enabled(false)).await.unwrap();
        assert!(!disabled.enabled);
        assert!(registry.live.lock().unwrap().is_empty());
        assert!(!service.get(&created.id).await.unwrap().enabled);

        service.update(&created.id, ScheduleUpdate::enabled(true)).await.unwrap();
        assert_eq!(registry.live.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_changes_cron_and_validates() {
        let (_dir, registry, service) = setup(FakeRegistry::default());
        let created = service.create(definition("0 0 * * *")).await.unwrap();

        let changes = ScheduleUpdate {
            cron_expr: Some("30 6 * * 1-5".to_string()),
            ..ScheduleUpdate::default()
        };
        service.update(&created.id, changes).await.unwrap();
        assert_eq!(registry.live.lock().unwrap()[&created.id].cron_expr, "30 6 * * 1-5");

        let invalid = ScheduleUpdate {
            cron_expr: Some("61 * * * *".to_string()),
            ..ScheduleUpdate::default()
        };
        assert!(service.update(&created.id, invalid).await.is_err());
        assert_eq!(service.get(&created.id).await.unwrap().cron_expr, "30 6 * * 1-5");
    }

    #[tokio::test]
    async fn test_update_missing_schedule() {
        let (_dir, _registry, service) = setup(FakeRegistry::default());
        let result = service.update("sch-missing", ScheduleUpdate::enabled(true)).await;
        assert!(matches!(result, Err(RefreshError::ScheduleNotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_unregisters() {
        let (_dir, registry, service) = setup(FakeRegistry::default());
        let created = service.create(definition("0 0 * * *")).await.unwrap();

        service.delete(&created.id).await.unwrap();
        assert!(registry.live.lock().unwrap().is_empty());
        assert!(matches!(service.get(&created.id).await, Err(RefreshError::ScheduleNotFound(_))));
        assert!(service.delete(&created.id).await.is_err());
    }

    #[tokio::test]
    async fn test_trigger() {
        let (_dir, registry, service) = setup(FakeRegistry::default());
        let created = service
            .create(definition("0 0 * * *").with_enabled(false))
            .await
            .unwrap();

        assert_eq!(service.trigger(&created.id).await.unwrap(), 2);
        assert_eq!(registry.triggered.lock().unwrap().as_slice(), &[created.id.clone()]);

        let missing = service.trigger("sch-missing").await;
        assert!(matches!(missing, Err(RefreshError::ScheduleNotFound(_))));
    }

    #[tokio::test]
    async fn test_with_real_scheduler() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(JsonlStorage::new(dir.path()).unwrap());
        let queue = Arc::new(crate::queue::RefreshQueue::new(10, 1));
        let scheduler = Arc::new(Scheduler::new(queue.clone()));
        let service = ScheduleService::new(Arc::new(ScheduleStore::new(storage)), scheduler.clone());

        let created = service.create(definition("0 0 * * *")).await.unwrap();
        assert!(scheduler.is_registered(&created.id));

        service.trigger(&created.id).await.unwrap();
        assert_eq!(queue.status().processing, 2);

        service.update(&created.id, ScheduleUpdate::enabled(false)).await.unwrap();
        assert_eq!(scheduler.entry_count(), 0);
    }
}
