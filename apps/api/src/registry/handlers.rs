//! Axum route handlers for the Prompt Registry & Renderer API.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::prompt::{AuditRow, BundleRow, TemplateRow};
use crate::registry::audit::{self, PgAuditSink};
use crate::registry::bundles::{self, DbBundleSource};
use crate::registry::constraints;
use crate::registry::generator::{PromptGenerator, RenderVersions};
use crate::registry::metrics::MetricsSnapshot;
use crate::registry::templates::{self, DbTemplateSource};
use crate::registry::validation::{
    normalize_tags, validate_natural_id, validate_semver, validate_task,
    validate_unit_interval, TemplateRole,
};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TemplateCreateRequest {
    pub template_id: String,
    pub semver: String,
    pub role: String,
    pub content: String,
    pub constraints: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct BundleCreateRequest {
    pub bundle_id: String,
    pub semver: String,
    pub system_template_id: Uuid,
    pub personality_template_id: Uuid,
    pub activity_template_id: Uuid,
    pub task_template_id: Uuid,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct BundleQuery {
    pub semver: String,
}

#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub bundle_id: String,
    #[serde(alias = "bundle_version", default)]
    pub semver: Option<String>,
    #[serde(default)]
    pub semantic_traits: Map<String, Value>,
    #[serde(default)]
    pub activity_level: f64,
    #[serde(default)]
    pub stress: f64,
    #[serde(default)]
    pub task: String,
    pub model_type: Option<String>,
    pub engine_version: Option<String>,
    pub adapter_version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RenderResponse {
    pub rendered_prompt: String,
    pub bundle_hash: String,
    pub personality_hash: String,
    pub engine_version: Option<String>,
    pub adapter_version: Option<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/prompts/templates
///
/// Creates a template version. 409 if (template_id, semver) already exists.
/// The existence pre-check is a fast path; the unique constraint settles races.
pub async fn handle_create_template(
    State(state): State<AppState>,
    Json(req): Json<TemplateCreateRequest>,
) -> Result<(StatusCode, Json<TemplateRow>), AppError> {
    validate_natural_id("template_id", &req.template_id)?;
    validate_semver(&req.semver)?;
    let role = TemplateRole::parse(&req.role)?;
    if req.content.is_empty() {
        return Err(AppError::Validation("content must not be empty".to_string()));
    }
    if let Some(c) = &req.constraints {
        constraints::validate_schema(c)?;
    }

    if templates::get_by_natural_key(&state.db, &req.template_id, &req.semver)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(format!(
            "template {}@{} already exists",
            req.template_id, req.semver
        )));
    }

    let row = templates::create(
        &state.db,
        &req.template_id,
        &req.semver,
        role.as_str(),
        &req.content,
        req.constraints.as_ref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// DELETE /api/v1/prompts/templates/:id
///
/// 409 when any bundle references the template; 404 when it does not exist.
pub async fn handle_delete_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if bundles::references_template(&state.db, id).await? {
        return Err(AppError::Conflict(format!(
            "cannot delete template {id}: one or more bundles reference it"
        )));
    }
    let deleted = templates::delete_by_internal_id(&state.db, id).await?;
    if !deleted {
        return Err(AppError::NotFound(format!("Template not found: {id}")));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/prompts/bundles
///
/// Creates an immutable bundle version. All four template ids must resolve
/// (404 naming the missing one); 409 on a duplicate (bundle_id, semver).
pub async fn handle_create_bundle(
    State(state): State<AppState>,
    Json(req): Json<BundleCreateRequest>,
) -> Result<(StatusCode, Json<BundleRow>), AppError> {
    validate_natural_id("bundle_id", &req.bundle_id)?;
    validate_semver(&req.semver)?;
    let template_ids = [
        req.system_template_id,
        req.personality_template_id,
        req.activity_template_id,
        req.task_template_id,
    ];
    for tid in template_ids {
        if templates::get_by_internal_id(&state.db, tid).await?.is_none() {
            return Err(AppError::NotFound(format!("Template not found: {tid}")));
        }
    }
    if bundles::exists(&state.db, &req.bundle_id, &req.semver).await? {
        return Err(AppError::Conflict(format!(
            "bundle {}@{} already exists",
            req.bundle_id, req.semver
        )));
    }

    let tags = normalize_tags(req.tags.as_deref());
    let row = bundles::create(&state.db, &req.bundle_id, &req.semver, template_ids, &tags).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/v1/prompts/bundles/:bundle_id?semver=
pub async fn handle_get_bundle(
    State(state): State<AppState>,
    Path(bundle_id): Path<String>,
    Query(params): Query<BundleQuery>,
) -> Result<Json<BundleRow>, AppError> {
    let bundle = bundles::get_by_natural_key(&state.db, &bundle_id, &params.semver)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Bundle not found: {bundle_id}@{}", params.semver))
        })?;
    Ok(Json(bundle))
}

/// POST /api/v1/prompts/render
///
/// Deterministic assembly (system → personality → activity → task), audited.
/// Latency and errors feed the side-channel counters on every attempt.
pub async fn handle_render(
    State(state): State<AppState>,
    Json(req): Json<RenderRequest>,
) -> Result<Json<RenderResponse>, AppError> {
    validate_natural_id("bundle_id", &req.bundle_id)?;
    validate_unit_interval("activity_level", req.activity_level)?;
    validate_unit_interval("stress", req.stress)?;
    validate_task(&req.task)?;
    let semver = req.semver.as_deref().unwrap_or("0.1.0");

    let generator = PromptGenerator::new(
        Arc::new(DbBundleSource::new(state.db.clone())),
        Arc::new(DbTemplateSource::new(state.db.clone())),
        Arc::new(PgAuditSink::new(state.db.clone())),
        state.constraints.clone(),
    );

    let started = Instant::now();
    let result = generator
        .render_from_bundle(
            &req.bundle_id,
            semver,
            &req.semantic_traits,
            req.activity_level,
            req.stress,
            &req.task,
            req.model_type.as_deref(),
            RenderVersions {
                engine_version: req.engine_version.as_deref(),
                adapter_version: req.adapter_version.as_deref(),
            },
        )
        .await;
    let elapsed = started.elapsed();
    state.metrics.observe_render(elapsed);

    let assembled = match result {
        Ok(assembled) => assembled,
        Err(e) => {
            state.metrics.record_error();
            tracing::warn!("Render failed: {e}");
            return Err(e);
        }
    };

    tracing::info!(
        "Render completed in {:.3}s bundle_id={} semver={}",
        elapsed.as_secs_f64(),
        req.bundle_id,
        semver
    );
    Ok(Json(RenderResponse {
        rendered_prompt: assembled.rendered_prompt,
        bundle_hash: assembled.bundle_hash,
        personality_hash: assembled.personality_hash,
        engine_version: req.engine_version,
        adapter_version: req.adapter_version,
    }))
}

/// GET /api/v1/audit/:bundle_hash
///
/// Returns the most recent audit record for a bundle_hash (replay).
pub async fn handle_get_audit(
    State(state): State<AppState>,
    Path(bundle_hash): Path<String>,
) -> Result<Json<AuditRow>, AppError> {
    let record = audit::latest_by_bundle_hash(&state.db, &bundle_hash)
        .await?
        .ok_or_else(|| AppError::NotFound("Audit record not found".to_string()))?;
    Ok(Json(record))
}

/// GET /api/v1/prompts/metrics
pub async fn handle_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
