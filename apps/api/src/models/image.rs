use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: Uuid,
    pub owner_id: String,
    pub snippet_id: Option<Uuid>,
    pub external_file_id: String,
    pub external_url: String,
    pub file_size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

/// Storage accounting across an owner's images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageStats {
    pub count: usize,
    pub total_bytes: i64,
    /// Megabytes with two decimals, for display.
    pub total_mb: String,
}

impl ImageStats {
    pub fn from_images(images: &[Image]) -> Self {
        let total_bytes: i64 = images.iter().map(|i| i.file_size_bytes).sum();
        ImageStats {
            count: images.len(),
            total_bytes,
            total_mb: format!("{:.2}", total_bytes as f64 / (1024.0 * 1024.0)),
        }
    }
}
