use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TagWithCount {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub snippet_count: i64,
}

impl TagWithCount {
    pub fn new(tag: Tag, snippet_count: i64) -> Self {
        TagWithCount {
            id: tag.id,
            owner_id: tag.owner_id,
            name: tag.name,
            created_at: tag.created_at,
            snippet_count,
        }
    }
}

/// How a caller names the tag to link onto a snippet.
#[derive(Debug, Clone, PartialEq)]
pub enum TagRef {
    Id(Uuid),
    /// Already normalized. Resolves to the owner's tag of that name, creating it if absent.
    Name(String),
}

/// Canonical tag name: trimmed and lower-cased.
pub fn normalize_tag_name(name: &str) -> String {
    name.trim().to_lowercase()
}
