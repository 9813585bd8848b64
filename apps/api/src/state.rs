use std::sync::Arc;

use crate::auth::IdentityProvider;
use crate::collections::CollectionService;
use crate::config::Config;
use crate::images::ImageService;
use crate::object_store::ObjectStorage;
use crate::snippets::SnippetService;
use crate::store::Store;
use crate::tags::TagService;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub snippets: SnippetService,
    pub tags: TagService,
    pub collections: CollectionService,
    pub images: ImageService,
    /// Resolves session tokens for the `AuthUser` extractor.
    pub identity: Arc<dyn IdentityProvider>,
    pub config: Config,
}

impl AppState {
    /// Wires every service to the same store and object storage.
    pub fn new(
        store: Arc<dyn Store>,
        identity: Arc<dyn IdentityProvider>,
        objects: Arc<dyn ObjectStorage>,
        config: Config,
    ) -> Self {
        AppState {
            snippets: SnippetService::new(store.clone(), objects.clone()),
            tags: TagService::new(store.clone()),
            collections: CollectionService::new(store.clone()),
            images: ImageService::new(store, objects, config.images.clone()),
            identity,
            config,
        }
    }
}
