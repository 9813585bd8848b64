use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::now;
use crate::models::snippet::Snippet;
use crate::models::tag::{normalize_tag_name, Tag, TagWithCount};
use crate::store::Store;

#[derive(Clone)]
pub struct TagService {
    store: Arc<dyn Store>,
}

impl TagService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create(&self, owner: &str, name: &str) -> Result<Tag, AppError> {
        let name = normalize_tag_name(name);
        if name.is_empty() {
            return Err(AppError::validation("Tag name is required"));
        }

        let tag = Tag {
            id: Uuid::now_v7(),
            owner_id: owner.to_string(),
            name,
            created_at: now(),
        };
        self.store.insert_tag(&tag).await?;

        info!("Created tag '{}' for owner {owner}", tag.name);
        Ok(tag)
    }

    pub async fn list(&self, owner: &str) -> Result<Vec<TagWithCount>, AppError> {
        self.store.tags(owner).await
    }

    /// The tag together with the owner's snippets carrying it.
    pub async fn snippets(&self, owner: &str, id: Uuid) -> Result<(Tag, Vec<Snippet>), AppError> {
        let tag = self.store.tag(owner, id).await?;
        let snippets = self.store.tagged_snippets(owner, id).await?;
        Ok((tag, snippets))
    }

    pub async fn delete(&self, owner: &str, id: Uuid) -> Result<(), AppError> {
        self.store.delete_tag(owner, id).await?;
        info!("Deleted tag {id} for owner {owner}");
        Ok(())
    }
}
