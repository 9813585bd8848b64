use std::sync::Arc;

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::collection::{
    normalize_description, Collection, CollectionPatch, CollectionWithCount,
};
use crate::models::double_option;
use crate::models::now;
use crate::models::snippet::Snippet;
use crate::store::Store;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateCollection {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Partial update; `description: null` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCollection {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

#[derive(Clone)]
pub struct CollectionService {
    store: Arc<dyn Store>,
}

impl CollectionService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create(&self, owner: &str, input: CreateCollection) -> Result<Collection, AppError> {
        let name = required_name(input.name.as_deref().unwrap_or_default())?;
        let created_at = now();
        let collection = Collection {
            id: Uuid::now_v7(),
            owner_id: owner.to_string(),
            name,
            description: normalize_description(input.description.as_deref()),
            created_at,
            updated_at: created_at,
        };
        self.store.insert_collection(&collection).await?;

        info!("Created collection {} for owner {owner}", collection.id);
        Ok(collection)
    }

    pub async fn list(&self, owner: &str) -> Result<Vec<CollectionWithCount>, AppError> {
        self.store.collections(owner).await
    }

    pub async fn get(&self, owner: &str, id: Uuid) -> Result<Collection, AppError> {
        self.store.collection(owner, id).await
    }

    pub async fn update(
        &self,
        owner: &str,
        id: Uuid,
        input: UpdateCollection,
    ) -> Result<Collection, AppError> {
        let name = input.name.as_deref().map(required_name).transpose()?;
        let description = input
            .description
            .map(|d| normalize_description(d.as_deref()));

        let collection = self
            .store
            .update_collection(owner, id, &CollectionPatch { name, description })
            .await?;
        info!("Updated collection {id} for owner {owner}");
        Ok(collection)
    }

    pub async fn delete(&self, owner: &str, id: Uuid) -> Result<(), AppError> {
        self.store.delete_collection(owner, id).await?;
        info!("Deleted collection {id} for owner {owner}");
        Ok(())
    }

    pub async fn add_snippet(
        &self,
        owner: &str,
        collection_id: Uuid,
        snippet_id: Uuid,
    ) -> Result<(), AppError> {
        self.store
            .link_collection(owner, collection_id, snippet_id)
            .await?;
        info!("Added snippet {snippet_id} to collection {collection_id}");
        Ok(())
    }

    /// The collection together with its snippets, newest first.
    pub async fn snippets(
        &self,
        owner: &str,
        collection_id: Uuid,
    ) -> Result<(Collection, Vec<Snippet>), AppError> {
        let collection = self.store.collection(owner, collection_id).await?;
        let snippets = self
            .store
            .collection_snippets(owner, collection_id)
            .await?;
        Ok((collection, snippets))
    }

    pub async fn remove_snippet(
        &self,
        owner: &str,
        collection_id: Uuid,
        snippet_id: Uuid,
    ) -> Result<(), AppError> {
        self.store
            .unlink_collection(owner, collection_id, snippet_id)
            .await
    }
}

fn required_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("Collection name is required"));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snippets::service::CreateSnippet;
    use crate::test_support::{harness, Harness, ALICE, BOB};

    fn named(name: &str, description: Option<&str>) -> CreateCollection {
        CreateCollection {
            name: Some(name.to_string()),
            description: description.map(String::from),
        }
    }

    async fn snippet(h: &Harness, owner: &str) -> Snippet {
        h.state
            .snippets
            .create(
                owner,
                CreateSnippet {
                    kind: Some("summary".to_string()),
                    content: Some("chapter recap".to_string()),
                    metadata: None,
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_trims_and_requires_name() {
        let h = harness();
        let c = h
            .state
            .collections
            .create(ALICE, named("  Thesis  ", Some("   ")))
            .await
            .unwrap();
        assert_eq!(c.name, "Thesis");
        assert_eq!(c.description, None);
        assert_eq!(c.created_at, c.updated_at);

        for input in [CreateCollection::default(), named(" ", None)] {
            assert!(matches!(
                h.state.collections.create(ALICE, input).await,
                Err(AppError::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_update_partial_and_clear_description() {
        let h = harness();
        let c = h
            .state
            .collections
            .create(ALICE, named("Reading", Some("Spring list")))
            .await
            .unwrap();

        let renamed = h
            .state
            .collections
            .update(
                ALICE,
                c.id,
                UpdateCollection {
                    name: Some(" Reading 2025 ".to_string()),
                    description: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "Reading 2025");
        assert_eq!(renamed.description.as_deref(), Some("Spring list"));
        assert!(renamed.updated_at >= c.updated_at);

        let cleared = h
            .state
            .collections
            .update(
                ALICE,
                c.id,
                UpdateCollection {
                    name: None,
                    description: Some(None),
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.description, None);
        assert_eq!(cleared.name, "Reading 2025");

        assert!(matches!(
            h.state
                .collections
                .update(
                    ALICE,
                    c.id,
                    UpdateCollection {
                        name: Some("".to_string()),
                        description: None,
                    },
                )
                .await,
            Err(AppError::Validation(_))
        ));
        assert_eq!(h.state.collections.get(ALICE, c.id).await.unwrap(), cleared);
    }

    #[tokio::test]
    async fn test_add_snippet_twice_is_duplicate() {
        let h = harness();
        let c = h.state.collections.create(ALICE, named("A", None)).await.unwrap();
        let s = snippet(&h, ALICE).await;

        h.state.collections.add_snippet(ALICE, c.id, s.id).await.unwrap();
        assert!(matches!(
            h.state.collections.add_snippet(ALICE, c.id, s.id).await,
            Err(AppError::Duplicate(_))
        ));
        let (_, snippets) = h.state.collections.snippets(ALICE, c.id).await.unwrap();
        assert_eq!(snippets.len(), 1);
        assert_eq!(h.state.collections.list(ALICE).await.unwrap()[0].snippet_count, 1);
    }

    #[tokio::test]
    async fn test_add_guards_both_sides() {
        let h = harness();
        let mine = h.state.collections.create(ALICE, named("Mine", None)).await.unwrap();
        let theirs = h.state.collections.create(BOB, named("Theirs", None)).await.unwrap();
        let my_snippet = snippet(&h, ALICE).await;
        let their_snippet = snippet(&h, BOB).await;

        assert!(matches!(
            h.state.collections.add_snippet(ALICE, mine.id, their_snippet.id).await,
            Err(AppError::NotFound(ref m)) if m == "Snippet not found"
        ));
        assert!(matches!(
            h.state.collections.add_snippet(ALICE, theirs.id, my_snippet.id).await,
            Err(AppError::NotFound(ref m)) if m == "Collection not found"
        ));
        assert!(h.state.collections.snippets(ALICE, mine.id).await.unwrap().1.is_empty());
        assert!(h.state.collections.snippets(BOB, theirs.id).await.unwrap().1.is_empty());
    }

    #[tokio::test]
    async fn test_remove_snippet_twice_is_noop() {
        let h = harness();
        let c = h.state.collections.create(ALICE, named("A", None)).await.unwrap();
        let s = snippet(&h, ALICE).await;
        h.state.collections.add_snippet(ALICE, c.id, s.id).await.unwrap();

        h.state.collections.remove_snippet(ALICE, c.id, s.id).await.unwrap();
        h.state.collections.remove_snippet(ALICE, c.id, s.id).await.unwrap();

        assert!(h.state.collections.snippets(ALICE, c.id).await.unwrap().1.is_empty());
        assert_eq!(h.state.snippets.get(ALICE, s.id).await.unwrap(), s);
    }

    #[tokio::test]
    async fn test_delete_keeps_snippets_and_hides_from_others() {
        let h = harness();
        let c = h.state.collections.create(ALICE, named("A", None)).await.unwrap();
        let s = snippet(&h, ALICE).await;
        h.state.collections.add_snippet(ALICE, c.id, s.id).await.unwrap();

        assert!(matches!(
            h.state.collections.get(BOB, c.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            h.state.collections.delete(BOB, c.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            h.state
                .collections
                .update(
                    BOB,
                    c.id,
                    UpdateCollection {
                        name: Some("Hijacked".to_string()),
                        description: None,
                    },
                )
                .await,
            Err(AppError::NotFound(ref m)) if m == "Collection not found"
        ));
        assert!(matches!(
            h.state.collections.remove_snippet(BOB, c.id, s.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(h.state.collections.list(BOB).await.unwrap().is_empty());
        assert_eq!(h.state.collections.get(ALICE, c.id).await.unwrap(), c);
        let (_, linked) = h.state.collections.snippets(ALICE, c.id).await.unwrap();
        assert_eq!(linked.iter().map(|s| s.id).collect::<Vec<_>>(), vec![s.id]);

        h.state.collections.delete(ALICE, c.id).await.unwrap();
        assert!(matches!(
            h.state.collections.get(ALICE, c.id).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(h.state.snippets.get(ALICE, s.id).await.unwrap(), s);
    }
}
