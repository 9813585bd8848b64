//! Entity store: persistence for snippets, tags, collections, images and
//! their junction rows.
//!
//! Every method is one atomic, owner-scoped operation: the ownership guard,
//! the mutation and any cascade either all happen or none do. Services add
//! input validation on top and never talk to the database directly.
//!
//! `AppState` holds an `Arc<dyn Store>`, chosen at startup via `STORAGE_BACKEND`.

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::collection::{Collection, CollectionPatch, CollectionWithCount};
use crate::models::image::Image;
use crate::models::snippet::{Snippet, SnippetPatch, SnippetQuery};
use crate::models::tag::{Tag, TagRef, TagWithCount};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    // ── Snippets ────────────────────────────────────────────────────────────

    async fn insert_snippet(&self, snippet: &Snippet) -> Result<(), AppError>;

    async fn snippet(&self, owner: &str, id: Uuid) -> Result<Snippet, AppError>;

    /// Owner's snippets matching `query`, newest first.
    async fn snippets(&self, owner: &str, query: &SnippetQuery) -> Result<Vec<Snippet>, AppError>;

    async fn update_snippet(
        &self,
        owner: &str,
        id: Uuid,
        patch: &SnippetPatch,
    ) -> Result<Snippet, AppError>;

    /// Deletes the snippet with its tag links, collection links and images.
    /// Returns the removed images so their blobs can be released.
    async fn delete_snippet(&self, owner: &str, id: Uuid) -> Result<Vec<Image>, AppError>;

    // ── Tags ────────────────────────────────────────────────────────────────

    /// Fails with `Duplicate` if the owner already has a tag with this name.
    async fn insert_tag(&self, tag: &Tag) -> Result<(), AppError>;

    async fn tag(&self, owner: &str, id: Uuid) -> Result<Tag, AppError>;

    /// Owner's tags with their linked-snippet counts, by name.
    async fn tags(&self, owner: &str) -> Result<Vec<TagWithCount>, AppError>;

    async fn delete_tag(&self, owner: &str, id: Uuid) -> Result<(), AppError>;

    /// Owner's snippets linked to the tag, newest first.
    async fn tagged_snippets(&self, owner: &str, tag_id: Uuid) -> Result<Vec<Snippet>, AppError>;

    /// Links a tag onto a snippet, creating the tag first for `TagRef::Name`
    /// when the owner has none by that name. `Duplicate` if already linked.
    async fn link_tag(&self, owner: &str, snippet_id: Uuid, tag: &TagRef) -> Result<Tag, AppError>;

    async fn snippet_tags(&self, owner: &str, snippet_id: Uuid) -> Result<Vec<Tag>, AppError>;

    /// Removing a link that does not exist is not an error.
    async fn unlink_tag(&self, owner: &str, snippet_id: Uuid, tag_id: Uuid) -> Result<(), AppError>;

    // ── Collections ─────────────────────────────────────────────────────────

    async fn insert_collection(&self, collection: &Collection) -> Result<(), AppError>;

    async fn collection(&self, owner: &str, id: Uuid) -> Result<Collection, AppError>;

    /// Owner's collections with their snippet counts, newest first.
    async fn collections(&self, owner: &str) -> Result<Vec<CollectionWithCount>, AppError>;

    async fn update_collection(
        &self,
        owner: &str,
        id: Uuid,
        patch: &CollectionPatch,
    ) -> Result<Collection, AppError>;

    async fn delete_collection(&self, owner: &str, id: Uuid) -> Result<(), AppError>;

    /// `Duplicate` if the snippet is already in the collection.
    async fn link_collection(
        &self,
        owner: &str,
        collection_id: Uuid,
        snippet_id: Uuid,
    ) -> Result<(), AppError>;

    async fn collection_snippets(
        &self,
        owner: &str,
        collection_id: Uuid,
    ) -> Result<Vec<Snippet>, AppError>;

    /// Removing a snippet that is not in the collection is not an error.
    async fn unlink_collection(
        &self,
        owner: &str,
        collection_id: Uuid,
        snippet_id: Uuid,
    ) -> Result<(), AppError>;

    // ── Images ──────────────────────────────────────────────────────────────

    async fn snippet_image_count(&self, owner: &str, snippet_id: Uuid) -> Result<usize, AppError>;

    /// Inserts the image row. When attached to a snippet, the snippet is guarded
    /// and the per-snippet cap is checked in the same transaction.
    async fn insert_image(&self, image: &Image, max_per_snippet: usize) -> Result<(), AppError>;

    async fn image(&self, owner: &str, id: Uuid) -> Result<Image, AppError>;

    /// Owner's images, oldest first.
    async fn images(&self, owner: &str) -> Result<Vec<Image>, AppError>;

    async fn snippet_images(&self, owner: &str, snippet_id: Uuid) -> Result<Vec<Image>, AppError>;

    async fn delete_image(&self, owner: &str, id: Uuid) -> Result<(), AppError>;
}

pub(crate) fn image_cap_error(max_per_snippet: usize) -> AppError {
    AppError::validation(format!("Maximum {max_per_snippet} images per snippet"))
}

pub(crate) fn duplicate_tag_link() -> AppError {
    AppError::duplicate("Tag already added to snippet")
}

pub(crate) fn duplicate_tag_name() -> AppError {
    AppError::duplicate("Tag already exists")
}

pub(crate) fn duplicate_collection_link() -> AppError {
    AppError::duplicate("Snippet already in collection")
}
