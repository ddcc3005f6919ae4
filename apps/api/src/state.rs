use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::registry::constraints::ConstraintsCache;
use crate::registry::metrics::RenderMetrics;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    /// Render latency/error counters. Side-channel only — never affects
    /// render output or hashes.
    pub metrics: Arc<RenderMetrics>,
    /// Process-wide bounded cache of normalized template constraints,
    /// shared across concurrent renders.
    pub constraints: Arc<ConstraintsCache>,
}
