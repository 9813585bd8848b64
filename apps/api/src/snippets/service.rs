use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::guard::Entity;
use crate::models::double_option;
use crate::models::image::Image;
use crate::models::now;
use crate::models::snippet::{normalize_metadata, Snippet, SnippetPatch, SnippetQuery, SnippetType};
use crate::models::tag::{normalize_tag_name, Tag, TagRef};
use crate::object_store::ObjectStorage;
use crate::store::Store;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateSnippet {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub content: Option<String>,
    pub metadata: Option<Value>,
}

/// Partial update; absent fields are left alone, `metadata: null` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSnippet {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub content: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub metadata: Option<Option<Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTag {
    pub tag_id: Option<String>,
    pub tag_name: Option<String>,
}

#[derive(Clone)]
pub struct SnippetService {
    store: Arc<dyn Store>,
    objects: Arc<dyn ObjectStorage>,
}

impl SnippetService {
    pub fn new(store: Arc<dyn Store>, objects: Arc<dyn ObjectStorage>) -> Self {
        Self { store, objects }
    }

    pub async fn create(&self, owner: &str, input: CreateSnippet) -> Result<Snippet, AppError> {
        let (kind, content) = match (input.kind, input.content) {
            (Some(kind), Some(content)) => (kind, content),
            _ => return Err(AppError::validation("Type and content are required")),
        };
        let kind: SnippetType = kind.parse()?;
        validate_content(&content)?;

        let created_at = now();
        let snippet = Snippet {
            id: Uuid::now_v7(),
            owner_id: owner.to_string(),
            kind,
            content,
            metadata: normalize_metadata(input.metadata),
            created_at,
            updated_at: created_at,
        };
        self.store.insert_snippet(&snippet).await?;

        info!("Created {} snippet {} for owner {owner}", snippet.kind, snippet.id);
        Ok(snippet)
    }

    pub async fn get(&self, owner: &str, id: Uuid) -> Result<Snippet, AppError> {
        self.store.snippet(owner, id).await
    }

    pub async fn list(&self, owner: &str, kind: Option<&str>) -> Result<Vec<Snippet>, AppError> {
        let kind = kind.map(str::parse::<SnippetType>).transpose()?;
        self.store
            .snippets(owner, &SnippetQuery { kind, text: None })
            .await
    }

    pub async fn search(&self, owner: &str, query: Option<&str>) -> Result<Vec<Snippet>, AppError> {
        let text = query
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| AppError::validation("Search query required"))?;
        self.store
            .snippets(
                owner,
                &SnippetQuery {
                    kind: None,
                    text: Some(text.to_string()),
                },
            )
            .await
    }

    pub async fn update(
        &self,
        owner: &str,
        id: Uuid,
        input: UpdateSnippet,
    ) -> Result<Snippet, AppError> {
        let kind = input
            .kind
            .as_deref()
            .map(str::parse::<SnippetType>)
            .transpose()?;
        if let Some(content) = &input.content {
            validate_content(content)?;
        }
        let patch = SnippetPatch {
            kind,
            content: input.content,
            metadata: input.metadata,
        };

        let snippet = self.store.update_snippet(owner, id, &patch).await?;
        info!("Updated snippet {id} for owner {owner}");
        Ok(snippet)
    }

    /// Deletes the snippet and everything hanging off it. Blobs of cascaded
    /// images are released best-effort.
    pub async fn delete(&self, owner: &str, id: Uuid) -> Result<(), AppError> {
        let images = self.store.delete_snippet(owner, id).await?;
        for image in &images {
            if let Err(e) = self.objects.delete(&image.external_file_id).await {
                warn!(
                    "Failed to delete blob {} of image {} (snippet {id}): {e}",
                    image.external_file_id, image.id
                );
            }
        }
        info!("Deleted snippet {id} for owner {owner} ({} images)", images.len());
        Ok(())
    }

    pub async fn add_tag(&self, owner: &str, snippet_id: Uuid, input: AddTag) -> Result<Tag, AppError> {
        let tag_ref = match (input.tag_id, input.tag_name) {
            (Some(tag_id), _) => TagRef::Id(Entity::Tag.parse_id(&tag_id)?),
            (None, Some(name)) => {
                let name = normalize_tag_name(&name);
                if name.is_empty() {
                    return Err(AppError::validation("Tag name is required"));
                }
                TagRef::Name(name)
            }
            (None, None) => {
                return Err(AppError::validation("Either tagId or tagName is required"))
            }
        };

        let tag = self.store.link_tag(owner, snippet_id, &tag_ref).await?;
        info!("Tagged snippet {snippet_id} with '{}'", tag.name);
        Ok(tag)
    }

    pub async fn list_tags(&self, owner: &str, snippet_id: Uuid) -> Result<Vec<Tag>, AppError> {
        self.store.snippet_tags(owner, snippet_id).await
    }

    pub async fn remove_tag(&self, owner: &str, snippet_id: Uuid, tag_id: Uuid) -> Result<(), AppError> {
        self.store.unlink_tag(owner, snippet_id, tag_id).await
    }

    pub async fn list_images(&self, owner: &str, snippet_id: Uuid) -> Result<Vec<Image>, AppError> {
        self.store.snippet_images(owner, snippet_id).await
    }
}

fn validate_content(content: &str) -> Result<(), AppError> {
    if content.trim().is_empty() {
        return Err(AppError::validation("Content cannot be empty"));
    }
    Ok(())
}
