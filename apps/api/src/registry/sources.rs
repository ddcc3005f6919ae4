#![allow(dead_code)]

//! Trait seams for the render path: bundle/template lookup and the audit
//! sink. Two implementations share each contract — the Postgres-backed
//! stores and the in-memory registry — selected by dependency injection
//! when a `PromptGenerator` is constructed.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::prompt::{BundleRow, TemplateRow};

/// Source of bundle records by natural key.
#[async_trait]
pub trait BundleSource: Send + Sync {
    async fn get_bundle(
        &self,
        bundle_id: &str,
        semver: &str,
    ) -> Result<Option<BundleRow>, AppError>;
}

/// Source of template records. Batch lookup by internal id is the render
/// path's only access pattern (one query for all four references).
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn get_templates_by_ids(
        &self,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, TemplateRow>, AppError>;
}

/// Parameters for recording one render. Borrowed — sinks copy what they keep.
#[derive(Debug, Clone, Copy)]
pub struct AuditEntry<'a> {
    pub bundle_hash: &'a str,
    pub personality_hash: &'a str,
    pub rendered_prompt: &'a str,
    pub engine_version: Option<&'a str>,
    pub adapter_version: Option<&'a str>,
}

/// Append-only sink for render audit records. Hashes are computed before
/// and independently of the sink; a sink can never alter them.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry<'_>) -> Result<(), AppError>;
}

/// Audit sink with zero effect. Never fails. For inline/test renders.
pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn record(&self, _entry: AuditEntry<'_>) -> Result<(), AppError> {
        Ok(())
    }
}
