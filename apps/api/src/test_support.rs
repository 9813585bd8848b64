//! Shared fixtures: the full service graph over in-memory backends, with a
//! live session for each of two owners.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{Duration, Utc};

use crate::config::Config;
use crate::images::Upload;
use crate::models::user::Identity;
use crate::object_store::{MemoryObjectStorage, ObjectStorage};
use crate::state::AppState;
use crate::store::MemoryStore;

pub const ALICE: &str = "alice";
pub const BOB: &str = "bob";
pub const ALICE_TOKEN: &str = "alice-session";
pub const BOB_TOKEN: &str = "bob-session";

pub struct Harness {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub objects: Arc<MemoryObjectStorage>,
}

pub fn harness() -> Harness {
    let objects = Arc::new(MemoryObjectStorage::new());
    let mut h = harness_with_objects(objects.clone());
    h.objects = objects;
    h
}

/// Like [`harness`] but with a custom object store. `Harness::objects` is
/// then a fresh, unused memory store.
pub fn harness_with_objects(objects: Arc<dyn ObjectStorage>) -> Harness {
    let expires_at = Utc::now() + Duration::hours(1);
    let store = Arc::new(
        MemoryStore::new()
            .with_session(ALICE_TOKEN, identity(ALICE), expires_at)
            .with_session(BOB_TOKEN, identity(BOB), expires_at),
    );
    let state = AppState::new(store.clone(), store.clone(), objects, Config::default());
    Harness {
        state,
        store,
        objects: Arc::new(MemoryObjectStorage::new()),
    }
}

pub fn identity(id: &str) -> Identity {
    Identity {
        id: id.to_string(),
        email: format!("{id}@example.com"),
        name: Some(id.to_string()),
        email_verified: true,
    }
}

/// A 16-byte file carrying the PNG signature.
pub fn png_upload() -> Upload {
    Upload {
        bytes: Bytes::from_static(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"),
        declared_type: Some("image/png".to_string()),
        file_name: Some("figure.png".to_string()),
    }
}
