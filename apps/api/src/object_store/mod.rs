//! Boundary to the external object store that holds image binaries.
//! The core persists only what `put` returns: a durable file id, a URL and
//! the stored byte size.

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::AppError;

pub mod memory;
pub mod s3;

pub use memory::MemoryObjectStorage;
pub use s3::S3ObjectStorage;

#[derive(Debug, Clone)]
pub struct PutObject {
    /// Folder hint, e.g. `stash-it/<owner>`.
    pub folder: String,
    pub file_name: String,
    pub content_type: String,
    pub tags: Vec<String>,
    pub bytes: Bytes,
}

impl PutObject {
    pub fn key(&self) -> String {
        format!("{}/{}", self.folder.trim_end_matches('/'), self.file_name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub file_id: String,
    pub url: String,
    pub byte_size: i64,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(&self, object: PutObject) -> Result<StoredObject, AppError>;

    async fn delete(&self, file_id: &str) -> Result<(), AppError>;
}
