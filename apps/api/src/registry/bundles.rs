#![allow(dead_code)]

//! Postgres bundle store. Bundles are immutable once created: no update,
//! no delete. Uniqueness on (bundle_id, semver) and the four foreign keys
//! to prompt_templates are enforced in the schema, so a create racing
//! another create (or a template delete) resolves atomically at the store.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::errors::{is_foreign_key_violation, is_unique_violation, AppError};
use crate::models::prompt::BundleRow;
use crate::registry::sources::BundleSource;

/// Inserts a new bundle version referencing four template internal ids in
/// assembly order. Conflict on a duplicate natural key; NotFound when a
/// referenced template id does not resolve (FK backstop).
pub async fn create(
    pool: &PgPool,
    bundle_id: &str,
    semver: &str,
    template_ids: [Uuid; 4],
    tags: &[String],
) -> Result<BundleRow, AppError> {
    let [system_id, personality_id, activity_id, task_id] = template_ids;
    let row: BundleRow = sqlx::query_as(
        r#"
        INSERT INTO prompt_bundles
            (id, bundle_id, semver, system_template_id, personality_template_id,
             activity_template_id, task_template_id, tags, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(bundle_id)
    .bind(semver)
    .bind(system_id)
    .bind(personality_id)
    .bind(activity_id)
    .bind(task_id)
    .bind(tags)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("bundle {bundle_id}@{semver} already exists"))
        } else if is_foreign_key_violation(&e) {
            AppError::NotFound(
                "bundle references a template that does not exist".to_string(),
            )
        } else {
            AppError::Database(e)
        }
    })?;

    info!("Created bundle {bundle_id}@{semver} ({})", row.id);
    Ok(row)
}

pub async fn get_by_internal_id(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<BundleRow>, AppError> {
    Ok(
        sqlx::query_as("SELECT * FROM prompt_bundles WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?,
    )
}

pub async fn get_by_natural_key(
    pool: &PgPool,
    bundle_id: &str,
    semver: &str,
) -> Result<Option<BundleRow>, AppError> {
    Ok(sqlx::query_as(
        "SELECT * FROM prompt_bundles WHERE bundle_id = $1 AND semver = $2",
    )
    .bind(bundle_id)
    .bind(semver)
    .fetch_optional(pool)
    .await?)
}

pub async fn exists(pool: &PgPool, bundle_id: &str, semver: &str) -> Result<bool, AppError> {
    Ok(get_by_natural_key(pool, bundle_id, semver).await?.is_some())
}

/// True when any bundle references the template id in any of its four
/// slots. Used as the fast-path delete guard; the FK constraint remains
/// the backstop for races.
pub async fn references_template(pool: &PgPool, template_id: Uuid) -> Result<bool, AppError> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM prompt_bundles
        WHERE system_template_id = $1
           OR personality_template_id = $1
           OR activity_template_id = $1
           OR task_template_id = $1
        "#,
    )
    .bind(template_id)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Bundle source backed by the Postgres store.
pub struct DbBundleSource {
    pool: PgPool,
}

impl DbBundleSource {
    pub fn new(pool: PgPool) -> Self {
        DbBundleSource { pool }
    }
}

#[async_trait]
impl BundleSource for DbBundleSource {
    async fn get_bundle(
        &self,
        bundle_id: &str,
        semver: &str,
    ) -> Result<Option<BundleRow>, AppError> {
        get_by_natural_key(&self.pool, bundle_id, semver).await
    }
}
