pub mod health;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::registry::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Prompt Registry & Renderer API
        .route(
            "/api/v1/prompts/templates",
            post(handlers::handle_create_template),
        )
        .route(
            "/api/v1/prompts/templates/:id",
            delete(handlers::handle_delete_template),
        )
        .route(
            "/api/v1/prompts/bundles",
            post(handlers::handle_create_bundle),
        )
        .route(
            "/api/v1/prompts/bundles/:bundle_id",
            get(handlers::handle_get_bundle),
        )
        .route("/api/v1/prompts/render", post(handlers::handle_render))
        .route("/api/v1/prompts/metrics", get(handlers::handle_metrics))
        .route("/api/v1/audit/:bundle_hash", get(handlers::handle_get_audit))
        .with_state(state)
}
