use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::errors::AppError;

/// The closed set of snippet kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnippetType {
    Quote,
    Note,
    Source,
    Summary,
    Link,
}

impl SnippetType {
    pub const ALL: [SnippetType; 5] = [
        SnippetType::Quote,
        SnippetType::Note,
        SnippetType::Source,
        SnippetType::Summary,
        SnippetType::Link,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SnippetType::Quote => "quote",
            SnippetType::Note => "note",
            SnippetType::Source => "source",
            SnippetType::Summary => "summary",
            SnippetType::Link => "link",
        }
    }
}

impl fmt::Display for SnippetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnippetType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SnippetType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<_> = SnippetType::ALL.iter().map(|t| t.as_str()).collect();
                AppError::validation(format!("Type must be one of: {}", valid.join(", ")))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub id: Uuid,
    pub owner_id: String,
    #[serde(rename = "type")]
    pub kind: SnippetType,
    pub content: String,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Field changes for an update. `metadata: Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct SnippetPatch {
    pub kind: Option<SnippetType>,
    pub content: Option<String>,
    pub metadata: Option<Option<Value>>,
}

impl SnippetPatch {
    pub fn apply(&self, snippet: &mut Snippet, now: DateTime<Utc>) {
        if let Some(kind) = self.kind {
            snippet.kind = kind;
        }
        if let Some(content) = &self.content {
            snippet.content = content.clone();
        }
        if let Some(metadata) = &self.metadata {
            snippet.metadata = normalize_metadata(metadata.clone());
        }
        snippet.updated_at = now;
    }
}

/// Optional filters for listing snippets.
#[derive(Debug, Clone, Default)]
pub struct SnippetQuery {
    pub kind: Option<SnippetType>,
    /// Case-insensitive substring matched against `content`.
    pub text: Option<String>,
}

impl SnippetQuery {
    pub fn matches(&self, snippet: &Snippet) -> bool {
        if let Some(kind) = self.kind {
            if snippet.kind != kind {
                return false;
            }
        }
        match &self.text {
            Some(text) => snippet
                .content
                .to_lowercase()
                .contains(&text.to_lowercase()),
            None => true,
        }
    }
}

/// Storage form of a snippet. `metadata` holds serialized JSON text.
#[derive(Debug, Clone, FromRow)]
pub struct SnippetRow {
    pub id: Uuid,
    pub owner_id: String,
    pub kind: String,
    pub content: String,
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SnippetRow> for Snippet {
    type Error = AppError;

    fn try_from(row: SnippetRow) -> Result<Self, Self::Error> {
        let kind = row
            .kind
            .parse()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("stored snippet {} has unknown type '{}'", row.id, row.kind)))?;
        Ok(Snippet {
            id: row.id,
            owner_id: row.owner_id,
            kind,
            content: row.content,
            metadata: decode_metadata(row.metadata.as_deref())?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// JSON `null` is folded into "no metadata" so the two never diverge in storage.
pub fn normalize_metadata(metadata: Option<Value>) -> Option<Value> {
    metadata.filter(|v| !v.is_null())
}

pub fn encode_metadata(metadata: Option<&Value>) -> Result<Option<String>, AppError> {
    match metadata.filter(|v| !v.is_null()) {
        Some(value) => Ok(Some(serde_json::to_string(value)?)),
        None => Ok(None),
    }
}

pub fn decode_metadata(stored: Option<&str>) -> Result<Option<Value>, AppError> {
    match stored {
        Some(text) => Ok(normalize_metadata(Some(serde_json::from_str(text)?))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_all_types() {
        for kind in SnippetType::ALL {
            assert_eq!(kind.as_str().parse::<SnippetType>().unwrap(), kind);
        }
    }

    #[test]
    fn test_parse_rejects_unknown_and_wrong_case() {
        for bad in ["", "Quote", "article", "notes"] {
            let err = bad.parse::<SnippetType>().unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_metadata_keeps_key_order() {
        let value = json!({ "zeta": 1, "alpha": { "b": [1, 2.5, null], "a": true } });
        let stored = encode_metadata(Some(&value)).unwrap().unwrap();
        assert!(stored.find("zeta").unwrap() < stored.find("alpha").unwrap());
        assert_eq!(decode_metadata(Some(&stored)).unwrap(), Some(value));
    }

    #[test]
    fn test_empty_object_is_not_null() {
        let stored = encode_metadata(Some(&json!({}))).unwrap();
        assert_eq!(stored.as_deref(), Some("{}"));
        assert_eq!(encode_metadata(None).unwrap(), None);
        assert_eq!(encode_metadata(Some(&Value::Null)).unwrap(), None);
    }

    #[test]
    fn test_snippet_serializes_type_field() {
        let now = Utc::now();
        let snippet = Snippet {
            id: Uuid::now_v7(),
            owner_id: "user-1".to_string(),
            kind: SnippetType::Link,
            content: "https://example.com".to_string(),
            metadata: None,
            created_at: now,
            updated_at: now,
        };
        let value = serde_json::to_value(&snippet).unwrap();
        assert_eq!(value["type"], "link");
        assert_eq!(value["ownerId"], "user-1");
        assert!(value["metadata"].is_null());
    }

    #[test]
    fn test_query_matches_case_insensitively() {
        let now = Utc::now();
        let snippet = Snippet {
            id: Uuid::now_v7(),
            owner_id: "u".to_string(),
            kind: SnippetType::Quote,
            content: "Hello World".to_string(),
            metadata: None,
            created_at: now,
            updated_at: now,
        };
        let query = SnippetQuery {
            kind: None,
            text: Some("WORLD".to_string()),
        };
        assert!(query.matches(&snippet));
        let query = SnippetQuery {
            kind: Some(SnippetType::Note),
            text: None,
        };
        assert!(!query.matches(&snippet));
    }
}
