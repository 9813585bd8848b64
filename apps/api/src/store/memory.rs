//! In-process `Store` for local development and tests. Every operation runs
//! under one write (or read) lock, which gives it the same all-or-nothing
//! behaviour as a PostgreSQL transaction.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::IdentityProvider;
use crate::errors::AppError;
use crate::guard::{self, Entity};
use crate::models::collection::{Collection, CollectionPatch, CollectionWithCount};
use crate::models::image::Image;
use crate::models::now;
use crate::models::snippet::{Snippet, SnippetPatch, SnippetQuery};
use crate::models::tag::{normalize_tag_name, Tag, TagRef, TagWithCount};
use crate::models::user::Identity;
use crate::store::{
    duplicate_collection_link, duplicate_tag_link, duplicate_tag_name, image_cap_error, Store,
};

#[derive(Default)]
struct Tables {
    snippets: HashMap<Uuid, Snippet>,
    tags: HashMap<Uuid, Tag>,
    collections: HashMap<Uuid, Collection>,
    images: HashMap<Uuid, Image>,
    /// (snippet_id, tag_id)
    snippet_tags: BTreeSet<(Uuid, Uuid)>,
    /// (snippet_id, collection_id)
    snippet_collections: BTreeSet<(Uuid, Uuid)>,
    sessions: HashMap<String, (Identity, DateTime<Utc>)>,
}

impl Tables {
    fn snippet(&self, owner: &str, id: Uuid) -> Result<&Snippet, AppError> {
        guard::check(self.snippets.get(&id), Entity::Snippet, owner)
    }

    fn tag(&self, owner: &str, id: Uuid) -> Result<&Tag, AppError> {
        guard::check(self.tags.get(&id), Entity::Tag, owner)
    }

    fn collection(&self, owner: &str, id: Uuid) -> Result<&Collection, AppError> {
        guard::check(self.collections.get(&id), Entity::Collection, owner)
    }

    fn image(&self, owner: &str, id: Uuid) -> Result<&Image, AppError> {
        guard::check(self.images.get(&id), Entity::Image, owner)
    }

    fn tag_by_name(&self, owner: &str, name: &str) -> Option<&Tag> {
        let name = normalize_tag_name(name);
        self.tags
            .values()
            .find(|t| t.owner_id == owner && normalize_tag_name(&t.name) == name)
    }

    fn images_of(&self, snippet_id: Uuid) -> impl Iterator<Item = &Image> {
        self.images
            .values()
            .filter(move |i| i.snippet_id == Some(snippet_id))
    }

    /// Owner's snippets among `ids`, newest first.
    fn snippets_in<'a>(&self, owner: &str, ids: impl Iterator<Item = &'a Uuid>) -> Vec<Snippet> {
        let mut snippets: Vec<Snippet> = ids
            .filter_map(|id| self.snippets.get(id))
            .filter(|s| s.owner_id == owner)
            .cloned()
            .collect();
        newest_first(&mut snippets);
        snippets
    }
}

fn newest_first(snippets: &mut [Snippet]) {
    snippets.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session token for `identity`, as the identity provider would.
    pub fn with_session(mut self, token: &str, identity: Identity, expires_at: DateTime<Utc>) -> Self {
        self.tables
            .get_mut()
            .sessions
            .insert(token.to_string(), (identity, expires_at));
        self
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_snippet(&self, snippet: &Snippet) -> Result<(), AppError> {
        self.tables
            .write()
            .await
            .snippets
            .insert(snippet.id, snippet.clone());
        Ok(())
    }

    async fn snippet(&self, owner: &str, id: Uuid) -> Result<Snippet, AppError> {
        self.tables.read().await.snippet(owner, id).cloned()
    }

    async fn snippets(&self, owner: &str, query: &SnippetQuery) -> Result<Vec<Snippet>, AppError> {
        let tables = self.tables.read().await;
        let mut snippets: Vec<Snippet> = tables
            .snippets
            .values()
            .filter(|s| s.owner_id == owner && query.matches(s))
            .cloned()
            .collect();
        newest_first(&mut snippets);
        Ok(snippets)
    }

    async fn update_snippet(
        &self,
        owner: &str,
        id: Uuid,
        patch: &SnippetPatch,
    ) -> Result<Snippet, AppError> {
        let mut tables = self.tables.write().await;
        tables.snippet(owner, id)?;
        let snippet = tables
            .snippets
            .get_mut(&id)
            .ok_or_else(|| Entity::Snippet.not_found())?;
        patch.apply(snippet, now());
        Ok(snippet.clone())
    }

    async fn delete_snippet(&self, owner: &str, id: Uuid) -> Result<Vec<Image>, AppError> {
        let mut tables = self.tables.write().await;
        tables.snippet(owner, id)?;

        tables.snippets.remove(&id);
        tables.snippet_tags.retain(|(snippet_id, _)| *snippet_id != id);
        tables.snippet_collections.retain(|(snippet_id, _)| *snippet_id != id);
        let image_ids: Vec<Uuid> = tables.images_of(id).map(|i| i.id).collect();
        Ok(image_ids
            .into_iter()
            .filter_map(|image_id| tables.images.remove(&image_id))
            .collect())
    }

    async fn insert_tag(&self, tag: &Tag) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if tables.tag_by_name(&tag.owner_id, &tag.name).is_some() {
            return Err(duplicate_tag_name());
        }
        tables.tags.insert(tag.id, tag.clone());
        Ok(())
    }

    async fn tag(&self, owner: &str, id: Uuid) -> Result<Tag, AppError> {
        self.tables.read().await.tag(owner, id).cloned()
    }

    async fn tags(&self, owner: &str) -> Result<Vec<TagWithCount>, AppError> {
        let tables = self.tables.read().await;
        let mut tags: Vec<TagWithCount> = tables
            .tags
            .values()
            .filter(|t| t.owner_id == owner)
            .map(|t| {
                let count = tables.snippet_tags.iter().filter(|(_, tag_id)| *tag_id == t.id).count();
                TagWithCount::new(t.clone(), count as i64)
            })
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn delete_tag(&self, owner: &str, id: Uuid) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        tables.tag(owner, id)?;
        tables.tags.remove(&id);
        tables.snippet_tags.retain(|(_, tag_id)| *tag_id != id);
        Ok(())
    }

    async fn tagged_snippets(&self, owner: &str, tag_id: Uuid) -> Result<Vec<Snippet>, AppError> {
        let tables = self.tables.read().await;
        tables.tag(owner, tag_id)?;
        let ids = tables
            .snippet_tags
            .iter()
            .filter(|(_, t)| *t == tag_id)
            .map(|(snippet_id, _)| snippet_id);
        Ok(tables.snippets_in(owner, ids))
    }

    async fn link_tag(&self, owner: &str, snippet_id: Uuid, tag: &TagRef) -> Result<Tag, AppError> {
        let mut tables = self.tables.write().await;
        tables.snippet(owner, snippet_id)?;

        let tag = match tag {
            TagRef::Id(tag_id) => tables.tag(owner, *tag_id)?.clone(),
            TagRef::Name(name) => match tables.tag_by_name(owner, name).cloned() {
                Some(existing) => existing,
                None => {
                    let created = Tag {
                        id: Uuid::now_v7(),
                        owner_id: owner.to_string(),
                        name: normalize_tag_name(name),
                        created_at: now(),
                    };
                    tables.tags.insert(created.id, created.clone());
                    created
                }
            },
        };

        if !tables.snippet_tags.insert((snippet_id, tag.id)) {
            return Err(duplicate_tag_link());
        }
        Ok(tag)
    }

    async fn snippet_tags(&self, owner: &str, snippet_id: Uuid) -> Result<Vec<Tag>, AppError> {
        let tables = self.tables.read().await;
        tables.snippet(owner, snippet_id)?;
        let mut tags: Vec<Tag> = tables
            .snippet_tags
            .iter()
            .filter(|(s, _)| *s == snippet_id)
            .filter_map(|(_, tag_id)| tables.tags.get(tag_id).cloned())
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn unlink_tag(&self, owner: &str, snippet_id: Uuid, tag_id: Uuid) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        tables.snippet(owner, snippet_id)?;
        tables.snippet_tags.remove(&(snippet_id, tag_id));
        Ok(())
    }

    async fn insert_collection(&self, collection: &Collection) -> Result<(), AppError> {
        self.tables
            .write()
            .await
            .collections
            .insert(collection.id, collection.clone());
        Ok(())
    }

    async fn collection(&self, owner: &str, id: Uuid) -> Result<Collection, AppError> {
        self.tables.read().await.collection(owner, id).cloned()
    }

    async fn collections(&self, owner: &str) -> Result<Vec<CollectionWithCount>, AppError> {
        let tables = self.tables.read().await;
        let mut collections: Vec<CollectionWithCount> = tables
            .collections
            .values()
            .filter(|c| c.owner_id == owner)
            .map(|c| {
                let count = tables
                    .snippet_collections
                    .iter()
                    .filter(|(_, collection_id)| *collection_id == c.id)
                    .count();
                CollectionWithCount::new(c.clone(), count as i64)
            })
            .collect();
        collections.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(collections)
    }

    async fn update_collection(
        &self,
        owner: &str,
        id: Uuid,
        patch: &CollectionPatch,
    ) -> Result<Collection, AppError> {
        let mut tables = self.tables.write().await;
        tables.collection(owner, id)?;
        let collection = tables
            .collections
            .get_mut(&id)
            .ok_or_else(|| Entity::Collection.not_found())?;
        patch.apply(collection, now());
        Ok(collection.clone())
    }

    async fn delete_collection(&self, owner: &str, id: Uuid) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        tables.collection(owner, id)?;
        tables.collections.remove(&id);
        tables
            .snippet_collections
            .retain(|(_, collection_id)| *collection_id != id);
        Ok(())
    }

    async fn link_collection(
        &self,
        owner: &str,
        collection_id: Uuid,
        snippet_id: Uuid,
    ) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        tables.collection(owner, collection_id)?;
        tables.snippet(owner, snippet_id)?;
        if !tables.snippet_collections.insert((snippet_id, collection_id)) {
            return Err(duplicate_collection_link());
        }
        Ok(())
    }

    async fn collection_snippets(
        &self,
        owner: &str,
        collection_id: Uuid,
    ) -> Result<Vec<Snippet>, AppError> {
        let tables = self.tables.read().await;
        tables.collection(owner, collection_id)?;
        let ids = tables
            .snippet_collections
            .iter()
            .filter(|(_, c)| *c == collection_id)
            .map(|(snippet_id, _)| snippet_id);
        Ok(tables.snippets_in(owner, ids))
    }

    async fn unlink_collection(
        &self,
        owner: &str,
        collection_id: Uuid,
        snippet_id: Uuid,
    ) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        tables.collection(owner, collection_id)?;
        tables.snippet_collections.remove(&(snippet_id, collection_id));
        Ok(())
    }

    async fn snippet_image_count(&self, owner: &str, snippet_id: Uuid) -> Result<usize, AppError> {
        let tables = self.tables.read().await;
        tables.snippet(owner, snippet_id)?;
        Ok(tables.images_of(snippet_id).count())
    }

    async fn insert_image(&self, image: &Image, max_per_snippet: usize) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if let Some(snippet_id) = image.snippet_id {
            tables.snippet(&image.owner_id, snippet_id)?;
            if tables.images_of(snippet_id).count() >= max_per_snippet {
                return Err(image_cap_error(max_per_snippet));
            }
        }
        tables.images.insert(image.id, image.clone());
        Ok(())
    }

    async fn image(&self, owner: &str, id: Uuid) -> Result<Image, AppError> {
        self.tables.read().await.image(owner, id).cloned()
    }

    async fn images(&self, owner: &str) -> Result<Vec<Image>, AppError> {
        let tables = self.tables.read().await;
        let mut images: Vec<Image> = tables
            .images
            .values()
            .filter(|i| i.owner_id == owner)
            .cloned()
            .collect();
        images.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(images)
    }

    async fn snippet_images(&self, owner: &str, snippet_id: Uuid) -> Result<Vec<Image>, AppError> {
        let tables = self.tables.read().await;
        tables.snippet(owner, snippet_id)?;
        let mut images: Vec<Image> = tables.images_of(snippet_id).cloned().collect();
        images.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(images)
    }

    async fn delete_image(&self, owner: &str, id: Uuid) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        tables.image(owner, id)?;
        tables.images.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for MemoryStore {
    async fn resolve_session(&self, token: &str) -> Result<Option<Identity>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .sessions
            .get(token)
            .filter(|(_, expires_at)| *expires_at > Utc::now())
            .map(|(identity, _)| identity.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn identity(id: &str) -> Identity {
        Identity {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            name: None,
            email_verified: true,
        }
    }

    #[tokio::test]
    async fn test_session_resolution_respects_expiry() {
        let store = MemoryStore::new()
            .with_session("live", identity("alice"), Utc::now() + Duration::hours(1))
            .with_session("stale", identity("bob"), Utc::now() - Duration::seconds(1));

        let alice = store.resolve_session("live").await.unwrap().unwrap();
        assert_eq!(alice.id, "alice");
        assert!(store.resolve_session("stale").await.unwrap().is_none());
        assert!(store.resolve_session("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tag_names_unique_on_normalized_form() {
        let store = MemoryStore::new();
        let tag = |name: &str| Tag {
            id: Uuid::now_v7(),
            owner_id: "alice".to_string(),
            name: name.to_string(),
            created_at: now(),
        };
        store.insert_tag(&tag("rust")).await.unwrap();
        let err = store.insert_tag(&tag(" RUST ")).await.unwrap_err();
        assert!(matches!(err, AppError::Duplicate(_)));

        let mut other = tag("rust");
        other.owner_id = "bob".to_string();
        store.insert_tag(&other).await.unwrap();
    }

    #[tokio::test]
    async fn test_tags_sort_by_byte_order() {
        let store = MemoryStore::new();
        for name in ["ärger", "zebra", "élan", "apple"] {
            store
                .insert_tag(&Tag {
                    id: Uuid::now_v7(),
                    owner_id: "alice".to_string(),
                    name: name.to_string(),
                    created_at: now(),
                })
                .await
                .unwrap();
        }

        // Same order as `COLLATE "C"` in PostgreSQL.
        let names: Vec<String> = store
            .tags("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, ["apple", "zebra", "ärger", "élan"]);
    }
}
