#![allow(dead_code)]

//! PromptGenerator — composes bundle/template sources, the assembly engine,
//! and an audit sink into one end-to-end render operation. Sources and sink
//! are injected at construction; the DB-backed and in-memory wirings share
//! this orchestration verbatim, so source-of-content cannot leak into the
//! hashes.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::errors::AppError;
use crate::registry::assemble::{assemble_and_hash, Assembled, RenderInputs};
use crate::registry::constraints::ConstraintsCache;
use crate::registry::sources::{AuditEntry, AuditSink, BundleSource, TemplateSource};

/// Optional replay-context version strings persisted with the audit record.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderVersions<'a> {
    pub engine_version: Option<&'a str>,
    pub adapter_version: Option<&'a str>,
}

pub struct PromptGenerator {
    bundle_source: Arc<dyn BundleSource>,
    template_source: Arc<dyn TemplateSource>,
    audit_sink: Arc<dyn AuditSink>,
    constraints: Arc<ConstraintsCache>,
}

impl PromptGenerator {
    pub fn new(
        bundle_source: Arc<dyn BundleSource>,
        template_source: Arc<dyn TemplateSource>,
        audit_sink: Arc<dyn AuditSink>,
        constraints: Arc<ConstraintsCache>,
    ) -> Self {
        PromptGenerator {
            bundle_source,
            template_source,
            audit_sink,
            constraints,
        }
    }

    /// Resolves a bundle by natural key, gates on model_type, loads the four
    /// templates in one batch, assembles, audits, and returns the result.
    ///
    /// An empty-string `model_type` is treated identically to its absence.
    #[allow(clippy::too_many_arguments)]
    pub async fn render_from_bundle(
        &self,
        bundle_id: &str,
        semver: &str,
        semantic_traits: &Map<String, Value>,
        activity_level: f64,
        stress: f64,
        task: &str,
        model_type: Option<&str>,
        versions: RenderVersions<'_>,
    ) -> Result<Assembled, AppError> {
        let bundle = self
            .bundle_source
            .get_bundle(bundle_id, semver)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Bundle not found: {bundle_id}@{semver}"))
            })?;

        if let Some(model_type) = model_type.filter(|mt| !mt.is_empty()) {
            if !bundle.tags.iter().any(|t| t == model_type) {
                return Err(AppError::UnsupportedModel(format!(
                    "bundle {bundle_id}@{semver} is not tagged for model '{model_type}'"
                )));
            }
        }

        let template_ids = bundle.template_ids_in_order();
        let templates_map = self
            .template_source
            .get_templates_by_ids(&template_ids)
            .await?;
        for tid in &template_ids {
            if !templates_map.contains_key(tid) {
                return Err(AppError::NotFound(format!("Template not found: {tid}")));
            }
        }

        // Warm the constraints cache for each resolved template. Side effect
        // only; the render output does not depend on constraints.
        for t in templates_map.values() {
            self.constraints
                .get_or_normalize(&t.template_id, &t.semver, t.constraints.as_ref());
        }

        let parts_content: Vec<String> = template_ids
            .iter()
            .map(|tid| templates_map[tid].content.clone())
            .collect();

        let inputs = RenderInputs {
            semantic_traits,
            activity_level,
            stress,
            task,
        };
        let assembled = assemble_and_hash(bundle_id, semver, &parts_content, &inputs)?;
        self.audit(&assembled, versions).await?;
        Ok(assembled)
    }

    /// Renders from four in-memory content strings (system, personality,
    /// activity, task) without any store. Produces the same hashes as
    /// `render_from_bundle` for equivalent content and identity.
    #[allow(clippy::too_many_arguments)]
    pub async fn render_inline(
        &self,
        bundle_id: &str,
        semver: &str,
        parts_content: &[String],
        semantic_traits: &Map<String, Value>,
        activity_level: f64,
        stress: f64,
        task: &str,
        versions: RenderVersions<'_>,
    ) -> Result<Assembled, AppError> {
        let inputs = RenderInputs {
            semantic_traits,
            activity_level,
            stress,
            task,
        };
        let assembled = assemble_and_hash(bundle_id, semver, parts_content, &inputs)?;
        self.audit(&assembled, versions).await?;
        Ok(assembled)
    }

    async fn audit(
        &self,
        assembled: &Assembled,
        versions: RenderVersions<'_>,
    ) -> Result<(), AppError> {
        self.audit_sink
            .record(AuditEntry {
                bundle_hash: &assembled.bundle_hash,
                personality_hash: &assembled.personality_hash,
                rendered_prompt: &assembled.rendered_prompt,
                engine_version: versions.engine_version,
                adapter_version: versions.adapter_version,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::memory::{MemoryAuditSink, MemoryRegistry};
    use crate::registry::sources::NullAuditSink;
    use serde_json::json;
    use uuid::Uuid;

    struct Fixture {
        generator: PromptGenerator,
        registry: Arc<MemoryRegistry>,
        audit: Arc<MemoryAuditSink>,
        constraints: Arc<ConstraintsCache>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(MemoryRegistry::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let constraints = Arc::new(ConstraintsCache::default());
        let generator = PromptGenerator::new(
            registry.clone(),
            registry.clone(),
            audit.clone(),
            constraints.clone(),
        );
        Fixture {
            generator,
            registry,
            audit,
            constraints,
        }
    }

    fn seed_bundle(registry: &MemoryRegistry, bundle_id: &str, tags: &[&str]) -> [Uuid; 4] {
        let sys = registry
            .create_template("sys", "1.0.0", "system", "System: {{task}}", None)
            .unwrap();
        let persona = registry
            .create_template("persona", "1.0.0", "user", "Persona {{activity_level}}", None)
            .unwrap();
        let activity = registry
            .create_template("activity", "1.0.0", "user", "Activity {{stress}}", None)
            .unwrap();
        let task = registry
            .create_template("task", "1.0.0", "user", "Task: {{task}}", None)
            .unwrap();
        let ids = [sys.id, persona.id, activity.id, task.id];
        let tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
        registry.create_bundle(bundle_id, "1.0.0", ids, &tags).unwrap();
        ids
    }

    fn no_traits() -> Map<String, Value> {
        Map::new()
    }

    #[tokio::test]
    async fn test_end_to_end_render_example() {
        let f = fixture();
        seed_bundle(&f.registry, "test-bundle", &[]);

        let traits = no_traits();
        let out = f
            .generator
            .render_from_bundle(
                "test-bundle",
                "1.0.0",
                &traits,
                0.5,
                0.2,
                "hello",
                None,
                RenderVersions::default(),
            )
            .await
            .unwrap();
        assert_eq!(
            out.rendered_prompt,
            "System: hello\n\nPersona 0.5\n\nActivity 0.2\n\nTask: hello"
        );
    }

    #[tokio::test]
    async fn test_missing_bundle_is_not_found() {
        let f = fixture();
        let traits = no_traits();
        let err = f
            .generator
            .render_from_bundle(
                "missing",
                "1.0.0",
                &traits,
                0.0,
                0.0,
                "",
                None,
                RenderVersions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_template_named_in_error() {
        let registry = Arc::new(MemoryRegistry::new());
        let ids = seed_bundle(&registry, "dangling", &[]);
        // Bypass create_bundle's check to simulate a template vanishing.
        registry.delete_template_unchecked_for_tests(ids[1]);

        let generator = PromptGenerator::new(
            registry.clone(),
            registry.clone(),
            Arc::new(NullAuditSink),
            Arc::new(ConstraintsCache::default()),
        );
        let traits = no_traits();
        let err = generator
            .render_from_bundle(
                "dangling",
                "1.0.0",
                &traits,
                0.0,
                0.0,
                "",
                None,
                RenderVersions::default(),
            )
            .await
            .unwrap_err();
        match err {
            AppError::NotFound(msg) => assert!(msg.contains(&ids[1].to_string())),
            other => panic!("expected NotFound, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_tag_gating() {
        let f = fixture();
        seed_bundle(&f.registry, "tagged", &["gpt-4o", "default"]);
        let traits = no_traits();

        // Matching tag renders.
        assert!(f
            .generator
            .render_from_bundle(
                "tagged", "1.0.0", &traits, 0.0, 0.0, "y",
                Some("gpt-4o"), RenderVersions::default(),
            )
            .await
            .is_ok());

        // Absent tag is a distinct UnsupportedModel rejection.
        let err = f
            .generator
            .render_from_bundle(
                "tagged", "1.0.0", &traits, 0.0, 0.0, "z",
                Some("claude-3"), RenderVersions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnsupportedModel(_)));

        // Empty string skips the check entirely.
        assert!(f
            .generator
            .render_from_bundle(
                "tagged", "1.0.0", &traits, 0.0, 0.0, "w",
                Some(""), RenderVersions::default(),
            )
            .await
            .is_ok());

        // As does omission, even with tags present.
        assert!(f
            .generator
            .render_from_bundle(
                "tagged", "1.0.0", &traits, 0.0, 0.0, "v",
                None, RenderVersions::default(),
            )
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_inline_parity_with_bundle_path() {
        let f = fixture();
        seed_bundle(&f.registry, "parity-b", &[]);
        let parts = vec![
            "System: {{task}}".to_string(),
            "Persona {{activity_level}}".to_string(),
            "Activity {{stress}}".to_string(),
            "Task: {{task}}".to_string(),
        ];
        let traits = {
            let mut m = Map::new();
            m.insert("x".to_string(), json!(1));
            m
        };

        let from_bundle = f
            .generator
            .render_from_bundle(
                "parity-b", "1.0.0", &traits, 0.5, 0.2, "do it",
                None, RenderVersions::default(),
            )
            .await
            .unwrap();
        let inline = f
            .generator
            .render_inline(
                "parity-b", "1.0.0", &parts, &traits, 0.5, 0.2, "do it",
                RenderVersions::default(),
            )
            .await
            .unwrap();

        assert_eq!(from_bundle.rendered_prompt, inline.rendered_prompt);
        assert_eq!(from_bundle.bundle_hash, inline.bundle_hash);
        assert_eq!(from_bundle.personality_hash, inline.personality_hash);
    }

    #[tokio::test]
    async fn test_replay_via_audit_sink() {
        let f = fixture();
        seed_bundle(&f.registry, "replay-bundle", &[]);
        let traits = no_traits();

        let out = f
            .generator
            .render_from_bundle(
                "replay-bundle",
                "1.0.0",
                &traits,
                0.0,
                0.0,
                "replay-me",
                None,
                RenderVersions {
                    engine_version: Some("engine-1"),
                    adapter_version: None,
                },
            )
            .await
            .unwrap();

        let record = f.audit.latest_by_bundle_hash(&out.bundle_hash).unwrap();
        assert_eq!(record.rendered_prompt, out.rendered_prompt);
        assert_eq!(record.personality_hash, out.personality_hash);
        assert_eq!(record.engine_version.as_deref(), Some("engine-1"));
    }

    #[tokio::test]
    async fn test_render_warms_constraints_cache() {
        let f = fixture();
        let registry = &f.registry;
        let sys = registry
            .create_template(
                "c-sys", "1.0.0", "system", "s",
                Some(json!({"NO_EMOJI": true, "A": 1})),
            )
            .unwrap();
        let others: Vec<Uuid> = (0..3)
            .map(|i| {
                registry
                    .create_template(&format!("c-{i}"), "1.0.0", "user", "x", None)
                    .unwrap()
                    .id
            })
            .collect();
        registry
            .create_bundle("c-bundle", "1.0.0", [sys.id, others[0], others[1], others[2]], &[])
            .unwrap();

        let traits = no_traits();
        f.generator
            .render_from_bundle(
                "c-bundle", "1.0.0", &traits, 0.0, 0.0, "t",
                None, RenderVersions::default(),
            )
            .await
            .unwrap();

        // Cache now answers for the template's natural key without raw input.
        let cached = f.constraints.get_or_normalize("c-sys", "1.0.0", None);
        assert_eq!(cached, json!({"A": 1, "NO_EMOJI": true}));
    }
}
