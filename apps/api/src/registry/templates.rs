//! Postgres template store. Versioned, immutable per version: a row is
//! inserted once and never updated. The (template_id, semver) unique
//! constraint is the authoritative backstop for concurrent creates; the
//! handler's existence pre-check is a fast path only.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::errors::{is_foreign_key_violation, is_unique_violation, AppError};
use crate::models::prompt::TemplateRow;
use crate::registry::sources::TemplateSource;

/// Inserts a new template version. A losing create race surfaces the
/// unique-constraint violation, translated here into `Conflict`.
pub async fn create(
    pool: &PgPool,
    template_id: &str,
    semver: &str,
    role: &str,
    content: &str,
    constraints: Option<&serde_json::Value>,
) -> Result<TemplateRow, AppError> {
    let row: TemplateRow = sqlx::query_as(
        r#"
        INSERT INTO prompt_templates (id, template_id, semver, role, content, constraints, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(template_id)
    .bind(semver)
    .bind(role)
    .bind(content)
    .bind(constraints)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!(
                "template {template_id}@{semver} already exists"
            ))
        } else {
            AppError::Database(e)
        }
    })?;

    info!("Created template {template_id}@{semver} ({})", row.id);
    Ok(row)
}

pub async fn get_by_internal_id(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<TemplateRow>, AppError> {
    Ok(
        sqlx::query_as("SELECT * FROM prompt_templates WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?,
    )
}

pub async fn get_by_natural_key(
    pool: &PgPool,
    template_id: &str,
    semver: &str,
) -> Result<Option<TemplateRow>, AppError> {
    Ok(sqlx::query_as(
        "SELECT * FROM prompt_templates WHERE template_id = $1 AND semver = $2",
    )
    .bind(template_id)
    .bind(semver)
    .fetch_optional(pool)
    .await?)
}

/// Loads multiple templates in one query; avoids N+1 on the render path.
pub async fn get_many_by_internal_ids(
    pool: &PgPool,
    ids: &[Uuid],
) -> Result<HashMap<Uuid, TemplateRow>, AppError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<TemplateRow> =
        sqlx::query_as("SELECT * FROM prompt_templates WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|r| (r.id, r)).collect())
}

/// Physically removes a template row. Returns false when no row exists.
/// The caller must have confirmed no bundle references this id; the FK
/// constraints on prompt_bundles reject the delete otherwise.
pub async fn delete_by_internal_id(pool: &PgPool, id: Uuid) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM prompt_templates WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                AppError::Conflict(format!(
                    "cannot delete template {id}: one or more bundles reference it"
                ))
            } else {
                AppError::Database(e)
            }
        })?;
    Ok(result.rows_affected() > 0)
}

/// Template source backed by the Postgres store.
pub struct DbTemplateSource {
    pool: PgPool,
}

impl DbTemplateSource {
    pub fn new(pool: PgPool) -> Self {
        DbTemplateSource { pool }
    }
}

#[async_trait]
impl TemplateSource for DbTemplateSource {
    async fn get_templates_by_ids(
        &self,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, TemplateRow>, AppError> {
        get_many_by_internal_ids(&self.pool, ids).await
    }
}
