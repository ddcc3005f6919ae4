//! Audit records: append-only log of every render, keyed for replay by
//! bundle_hash. Records are never updated or deleted; re-renders append.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::prompt::AuditRow;
use crate::registry::sources::{AuditEntry, AuditSink};

/// Appends one audit record.
pub async fn append(pool: &PgPool, entry: AuditEntry<'_>) -> Result<AuditRow, AppError> {
    Ok(sqlx::query_as(
        r#"
        INSERT INTO prompt_audit
            (id, bundle_hash, personality_hash, engine_version, adapter_version,
             rendered_prompt, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(entry.bundle_hash)
    .bind(entry.personality_hash)
    .bind(entry.engine_version)
    .bind(entry.adapter_version)
    .bind(entry.rendered_prompt)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?)
}

/// The canonical audit entry for a bundle_hash: most recent by creation
/// time (re-renders share a bundle_hash).
pub async fn latest_by_bundle_hash(
    pool: &PgPool,
    bundle_hash: &str,
) -> Result<Option<AuditRow>, AppError> {
    Ok(sqlx::query_as(
        r#"
        SELECT * FROM prompt_audit
        WHERE bundle_hash = $1
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(bundle_hash)
    .fetch_optional(pool)
    .await?)
}

/// Audit sink that appends to the database.
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        PgAuditSink { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, entry: AuditEntry<'_>) -> Result<(), AppError> {
        append(&self.pool, entry).await?;
        Ok(())
    }
}
