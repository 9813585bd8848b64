use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

use crate::errors::AppError;
use crate::object_store::{ObjectStorage, PutObject, StoredObject};

/// Keeps blobs in process memory. URLs use the `memory://` scheme.
#[derive(Default)]
pub struct MemoryObjectStorage {
    objects: Mutex<HashMap<String, Bytes>>,
}

impl MemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn contains(&self, file_id: &str) -> bool {
        self.objects.lock().await.contains_key(file_id)
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn put(&self, object: PutObject) -> Result<StoredObject, AppError> {
        let key = object.key();
        let byte_size = object.bytes.len() as i64;
        self.objects.lock().await.insert(key.clone(), object.bytes);
        Ok(StoredObject {
            url: format!("memory://{key}"),
            file_id: key,
            byte_size,
        })
    }

    async fn delete(&self, file_id: &str) -> Result<(), AppError> {
        match self.objects.lock().await.remove(file_id) {
            Some(_) => Ok(()),
            None => Err(AppError::Storage(format!("object {file_id} does not exist"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_delete() {
        let storage = MemoryObjectStorage::new();
        let stored = storage
            .put(PutObject {
                folder: "stash-it/alice/".to_string(),
                file_name: "a.png".to_string(),
                content_type: "image/png".to_string(),
                tags: vec!["user-upload".to_string()],
                bytes: Bytes::from_static(b"\x89PNG"),
            })
            .await
            .unwrap();

        assert_eq!(stored.file_id, "stash-it/alice/a.png");
        assert_eq!(stored.url, "memory://stash-it/alice/a.png");
        assert_eq!(stored.byte_size, 4);
        assert!(storage.contains(&stored.file_id).await);

        storage.delete(&stored.file_id).await.unwrap();
        assert!(!storage.contains(&stored.file_id).await);
        assert!(storage.delete(&stored.file_id).await.is_err());
    }
}
