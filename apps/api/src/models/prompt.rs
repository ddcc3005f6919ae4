use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Versioned prompt fragment. (template_id, semver) is unique for all time;
/// a row is never updated in place — content changes require a new semver.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TemplateRow {
    pub id: Uuid,
    pub template_id: String,
    pub semver: String,
    pub role: String,
    pub content: String,
    pub constraints: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Immutable bundle of four template references in fixed assembly order.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BundleRow {
    pub id: Uuid,
    pub bundle_id: String,
    pub semver: String,
    pub system_template_id: Uuid,
    pub personality_template_id: Uuid,
    pub activity_template_id: Uuid,
    pub task_template_id: Uuid,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl BundleRow {
    /// Template ids in assembly order: system → personality → activity → task.
    pub fn template_ids_in_order(&self) -> [Uuid; 4] {
        [
            self.system_template_id,
            self.personality_template_id,
            self.activity_template_id,
            self.task_template_id,
        ]
    }
}

/// Append-only audit record for a render. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditRow {
    pub id: Uuid,
    pub bundle_hash: String,
    pub personality_hash: String,
    pub engine_version: Option<String>,
    pub adapter_version: Option<String>,
    pub rendered_prompt: String,
    pub created_at: DateTime<Utc>,
}
