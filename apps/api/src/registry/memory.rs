#![allow(dead_code)]

//! In-memory registry: the second implementation of the store contract,
//! selected by dependency injection where no database is wanted (embedded
//! use, tests). Carries the full conflict semantics — duplicate natural
//! keys fail with Conflict under concurrency, deletes are blocked by
//! referencing bundles — so the registry's core properties are testable here.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::prompt::{AuditRow, BundleRow, TemplateRow};
use crate::registry::sources::{AuditEntry, AuditSink, BundleSource, TemplateSource};

#[derive(Default)]
struct RegistryInner {
    templates: HashMap<Uuid, TemplateRow>,
    bundles: HashMap<Uuid, BundleRow>,
}

/// Mutex-guarded map-backed registry. All uniqueness and referential
/// checks happen under one lock, which is what gives the same atomic
/// create semantics the database constraints give the Postgres store.
#[derive(Default)]
pub struct MemoryRegistry {
    inner: Mutex<RegistryInner>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_template(
        &self,
        template_id: &str,
        semver: &str,
        role: &str,
        content: &str,
        constraints: Option<Value>,
    ) -> Result<TemplateRow, AppError> {
        let mut inner = self.lock();
        if inner
            .templates
            .values()
            .any(|t| t.template_id == template_id && t.semver == semver)
        {
            return Err(AppError::Conflict(format!(
                "template {template_id}@{semver} already exists"
            )));
        }
        let row = TemplateRow {
            id: Uuid::new_v4(),
            template_id: template_id.to_string(),
            semver: semver.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            constraints,
            created_at: Utc::now(),
        };
        inner.templates.insert(row.id, row.clone());
        Ok(row)
    }

    pub fn get_template_by_internal_id(&self, id: Uuid) -> Option<TemplateRow> {
        self.lock().templates.get(&id).cloned()
    }

    pub fn get_template_by_natural_key(
        &self,
        template_id: &str,
        semver: &str,
    ) -> Option<TemplateRow> {
        self.lock()
            .templates
            .values()
            .find(|t| t.template_id == template_id && t.semver == semver)
            .cloned()
    }

    /// Removes a template. Conflict when any bundle references it; false
    /// when no such template exists.
    pub fn delete_template(&self, id: Uuid) -> Result<bool, AppError> {
        let mut inner = self.lock();
        let referenced = inner
            .bundles
            .values()
            .any(|b| b.template_ids_in_order().contains(&id));
        if referenced {
            return Err(AppError::Conflict(format!(
                "cannot delete template {id}: one or more bundles reference it"
            )));
        }
        Ok(inner.templates.remove(&id).is_some())
    }

    pub fn create_bundle(
        &self,
        bundle_id: &str,
        semver: &str,
        template_ids: [Uuid; 4],
        tags: &[String],
    ) -> Result<BundleRow, AppError> {
        let mut inner = self.lock();
        if inner
            .bundles
            .values()
            .any(|b| b.bundle_id == bundle_id && b.semver == semver)
        {
            return Err(AppError::Conflict(format!(
                "bundle {bundle_id}@{semver} already exists"
            )));
        }
        for tid in template_ids {
            if !inner.templates.contains_key(&tid) {
                return Err(AppError::NotFound(format!("Template not found: {tid}")));
            }
        }
        let [system_id, personality_id, activity_id, task_id] = template_ids;
        let row = BundleRow {
            id: Uuid::new_v4(),
            bundle_id: bundle_id.to_string(),
            semver: semver.to_string(),
            system_template_id: system_id,
            personality_template_id: personality_id,
            activity_template_id: activity_id,
            task_template_id: task_id,
            tags: tags.to_vec(),
            created_at: Utc::now(),
        };
        inner.bundles.insert(row.id, row.clone());
        Ok(row)
    }

    pub fn get_bundle_by_natural_key(&self, bundle_id: &str, semver: &str) -> Option<BundleRow> {
        self.lock()
            .bundles
            .values()
            .find(|b| b.bundle_id == bundle_id && b.semver == semver)
            .cloned()
    }

    pub fn bundle_exists(&self, bundle_id: &str, semver: &str) -> bool {
        self.get_bundle_by_natural_key(bundle_id, semver).is_some()
    }

    pub fn bundle_count(&self, bundle_id: &str, semver: &str) -> usize {
        self.lock()
            .bundles
            .values()
            .filter(|b| b.bundle_id == bundle_id && b.semver == semver)
            .count()
    }

    /// Removes a template without the referential guard, to simulate a
    /// dangling bundle reference.
    #[cfg(test)]
    pub(crate) fn delete_template_unchecked_for_tests(&self, id: Uuid) {
        self.lock().templates.remove(&id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl BundleSource for MemoryRegistry {
    async fn get_bundle(
        &self,
        bundle_id: &str,
        semver: &str,
    ) -> Result<Option<BundleRow>, AppError> {
        Ok(self.get_bundle_by_natural_key(bundle_id, semver))
    }
}

#[async_trait]
impl TemplateSource for MemoryRegistry {
    async fn get_templates_by_ids(
        &self,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, TemplateRow>, AppError> {
        let inner = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| inner.templates.get(id).map(|t| (*id, t.clone())))
            .collect())
    }
}

/// Audit sink that appends to a vector. Supports the replay read the
/// Postgres store offers, for end-to-end tests without a database.
#[derive(Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRow>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest_by_bundle_hash(&self, bundle_hash: &str) -> Option<AuditRow> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find(|r| r.bundle_hash == bundle_hash)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, entry: AuditEntry<'_>) -> Result<(), AppError> {
        let row = AuditRow {
            id: Uuid::new_v4(),
            bundle_hash: entry.bundle_hash.to_string(),
            personality_hash: entry.personality_hash.to_string(),
            engine_version: entry.engine_version.map(str::to_string),
            adapter_version: entry.adapter_version.map(str::to_string),
            rendered_prompt: entry.rendered_prompt.to_string(),
            created_at: Utc::now(),
        };
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(row);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn seed_templates(reg: &MemoryRegistry) -> [Uuid; 4] {
        let sys = reg
            .create_template("sys", "1.0.0", "system", "System: {{task}}", None)
            .unwrap();
        let persona = reg
            .create_template("persona", "1.0.0", "user", "Persona {{activity_level}}", None)
            .unwrap();
        let activity = reg
            .create_template("activity", "1.0.0", "user", "Activity {{stress}}", None)
            .unwrap();
        let task = reg
            .create_template("task", "1.0.0", "user", "Task: {{task}}", None)
            .unwrap();
        [sys.id, persona.id, activity.id, task.id]
    }

    #[test]
    fn test_duplicate_template_natural_key_conflicts() {
        let reg = MemoryRegistry::new();
        reg.create_template("t", "1.0.0", "system", "a", None).unwrap();
        let err = reg
            .create_template("t", "1.0.0", "system", "b", None)
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        // Same template_id at a new semver is fine.
        reg.create_template("t", "1.0.1", "system", "b", None).unwrap();
    }

    #[test]
    fn test_bundle_create_requires_existing_templates() {
        let reg = MemoryRegistry::new();
        let ids = seed_templates(&reg);
        let mut dangling = ids;
        dangling[2] = Uuid::new_v4();
        let err = reg.create_bundle("b", "1.0.0", dangling, &[]).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        reg.create_bundle("b", "1.0.0", ids, &[]).unwrap();
    }

    #[test]
    fn test_delete_referenced_template_conflicts() {
        let reg = MemoryRegistry::new();
        let ids = seed_templates(&reg);
        reg.create_bundle("b", "1.0.0", ids, &[]).unwrap();
        let err = reg.delete_template(ids[0]).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let unreferenced = reg
            .create_template("loose", "1.0.0", "user", "x", None)
            .unwrap();
        assert!(reg.delete_template(unreferenced.id).unwrap());
        assert!(!reg.delete_template(unreferenced.id).unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_bundle_create_single_winner() {
        let reg = Arc::new(MemoryRegistry::new());
        let ids = seed_templates(&reg);

        let concurrency = 10;
        let mut handles = Vec::new();
        for _ in 0..concurrency {
            let reg = Arc::clone(&reg);
            handles.push(tokio::spawn(async move {
                reg.create_bundle("race-bundle", "3.0.0", ids, &[])
            }));
        }

        let mut successes = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(AppError::Conflict(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(conflicts, concurrency - 1);
        assert_eq!(reg.bundle_count("race-bundle", "3.0.0"), 1);
    }

    #[tokio::test]
    async fn test_batch_template_lookup_returns_subset() {
        let reg = MemoryRegistry::new();
        let ids = seed_templates(&reg);
        let missing = Uuid::new_v4();
        let out = reg
            .get_templates_by_ids(&[ids[0], ids[1], missing])
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.contains_key(&ids[0]));
        assert!(!out.contains_key(&missing));
    }

    #[tokio::test]
    async fn test_memory_audit_latest_by_bundle_hash() {
        let sink = MemoryAuditSink::new();
        sink.record(AuditEntry {
            bundle_hash: "h1",
            personality_hash: "p1",
            rendered_prompt: "first",
            engine_version: None,
            adapter_version: None,
        })
        .await
        .unwrap();
        sink.record(AuditEntry {
            bundle_hash: "h1",
            personality_hash: "p2",
            rendered_prompt: "second",
            engine_version: Some("e1"),
            adapter_version: None,
        })
        .await
        .unwrap();

        let latest = sink.latest_by_bundle_hash("h1").unwrap();
        assert_eq!(latest.rendered_prompt, "second");
        assert_eq!(latest.engine_version.as_deref(), Some("e1"));
        assert!(sink.latest_by_bundle_hash("nope").is_none());
    }
}
