use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::images::validation::{extension_for, validate_upload, DEFAULT_MAX_BYTES};
use crate::models::image::{Image, ImageStats};
use crate::models::now;
use crate::object_store::{ObjectStorage, PutObject};
use crate::store::{image_cap_error, Store};

/// Upload limits and placement.
#[derive(Debug, Clone)]
pub struct ImagePolicy {
    pub max_bytes: usize,
    pub max_per_snippet: usize,
    /// Top-level folder in the object store; blobs land under `<prefix>/<owner>`.
    pub folder_prefix: String,
}

impl Default for ImagePolicy {
    fn default() -> Self {
        ImagePolicy {
            max_bytes: DEFAULT_MAX_BYTES,
            max_per_snippet: 3,
            folder_prefix: "stash-it".to_string(),
        }
    }
}

/// A file received from the client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub bytes: Bytes,
    pub declared_type: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Clone)]
pub struct ImageService {
    store: Arc<dyn Store>,
    objects: Arc<dyn ObjectStorage>,
    policy: ImagePolicy,
}

impl ImageService {
    pub fn new(store: Arc<dyn Store>, objects: Arc<dyn ObjectStorage>, policy: ImagePolicy) -> Self {
        Self {
            store,
            objects,
            policy,
        }
    }

    pub fn policy(&self) -> &ImagePolicy {
        &self.policy
    }

    /// Validates the file, stores the blob, then records the image.
    ///
    /// The snippet guard and the per-snippet cap run before the upload and
    /// again, atomically, with the insert. A blob whose row could not be
    /// written is deleted best-effort.
    pub async fn upload(
        &self,
        owner: &str,
        upload: Upload,
        snippet_id: Option<Uuid>,
    ) -> Result<Image, AppError> {
        let content_type = validate_upload(
            &upload.bytes,
            upload.declared_type.as_deref(),
            self.policy.max_bytes,
        )?;

        if let Some(snippet_id) = snippet_id {
            let existing = self.store.snippet_image_count(owner, snippet_id).await?;
            if existing >= self.policy.max_per_snippet {
                return Err(image_cap_error(self.policy.max_per_snippet));
            }
        }

        let id = Uuid::now_v7();
        let stored = self
            .objects
            .put(PutObject {
                folder: format!("{}/{owner}", self.policy.folder_prefix),
                file_name: format!("{id}{}", extension_for(&content_type)),
                content_type,
                tags: vec!["user-upload".to_string(), owner.to_string()],
                bytes: upload.bytes,
            })
            .await?;

        let image = Image {
            id,
            owner_id: owner.to_string(),
            snippet_id,
            external_file_id: stored.file_id,
            external_url: stored.url,
            file_size_bytes: stored.byte_size,
            created_at: now(),
        };

        if let Err(e) = self
            .store
            .insert_image(&image, self.policy.max_per_snippet)
            .await
        {
            if let Err(cleanup) = self.objects.delete(&image.external_file_id).await {
                warn!(
                    "Failed to release orphaned blob {}: {cleanup}",
                    image.external_file_id
                );
            }
            return Err(e);
        }

        info!(
            "Uploaded image {} from '{}' ({} bytes) for owner {owner}",
            image.id,
            upload.file_name.as_deref().unwrap_or("unnamed"),
            image.file_size_bytes
        );
        Ok(image)
    }

    pub async fn get(&self, owner: &str, id: Uuid) -> Result<Image, AppError> {
        self.store.image(owner, id).await
    }

    pub async fn list(&self, owner: &str) -> Result<(Vec<Image>, ImageStats), AppError> {
        let images = self.store.images(owner).await?;
        let stats = ImageStats::from_images(&images);
        Ok((images, stats))
    }

    /// Removes the image row. Failure to delete the external blob is logged
    /// and does not fail the operation.
    pub async fn delete(&self, owner: &str, id: Uuid) -> Result<(), AppError> {
        let image = self.store.image(owner, id).await?;

        if let Err(e) = self.objects.delete(&image.external_file_id).await {
            warn!(
                "External delete failed for image {id} ({}): {e}",
                image.external_file_id
            );
        }

        self.store.delete_image(owner, id).await?;
        info!("Deleted image {id} for owner {owner}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::StoredObject;
    use crate::snippets::service::CreateSnippet;
    use crate::test_support::{harness, harness_with_objects, png_upload, Harness, ALICE, BOB};
    use async_trait::async_trait;

    /// Object store whose every call fails.
    struct BrokenStorage;

    #[async_trait]
    impl ObjectStorage for BrokenStorage {
        async fn put(&self, _object: PutObject) -> Result<StoredObject, AppError> {
            Err(AppError::Storage("upload refused".to_string()))
        }

        async fn delete(&self, _file_id: &str) -> Result<(), AppError> {
            Err(AppError::Storage("delete refused".to_string()))
        }
    }

    async fn snippet(h: &Harness, owner: &str) -> Uuid {
        h.state
            .snippets
            .create(
                owner,
                CreateSnippet {
                    kind: Some("source".to_string()),
                    content: Some("figure 3".to_string()),
                    metadata: None,
                },
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_upload_stores_blob_under_owner_folder() {
        let h = harness();
        let sid = snippet(&h, ALICE).await;
        let image = h
            .state
            .images
            .upload(ALICE, png_upload(), Some(sid))
            .await
            .unwrap();

        assert_eq!(image.snippet_id, Some(sid));
        assert_eq!(image.owner_id, ALICE);
        assert_eq!(
            image.external_file_id,
            format!("stash-it/{ALICE}/{}.png", image.id)
        );
        assert_eq!(image.file_size_bytes, png_upload().bytes.len() as i64);
        assert!(h.objects.contains(&image.external_file_id).await);
        assert_eq!(h.state.images.get(ALICE, image.id).await.unwrap(), image);
    }

    #[tokio::test]
    async fn test_upload_without_snippet() {
        let h = harness();
        let image = h.state.images.upload(ALICE, png_upload(), None).await.unwrap();
        assert_eq!(image.snippet_id, None);
    }

    #[tokio::test]
    async fn test_fourth_image_rejected_and_first_three_intact() {
        let h = harness();
        let sid = snippet(&h, ALICE).await;
        let mut uploaded = Vec::new();
        for _ in 0..3 {
            uploaded.push(
                h.state
                    .images
                    .upload(ALICE, png_upload(), Some(sid))
                    .await
                    .unwrap(),
            );
        }

        let err = h
            .state
            .images
            .upload(ALICE, png_upload(), Some(sid))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "Maximum 3 images per snippet"));

        let mut attached: Vec<Uuid> = h
            .state
            .snippets
            .list_images(ALICE, sid)
            .await
            .unwrap()
            .iter()
            .map(|i| i.id)
            .collect();
        let mut expected: Vec<Uuid> = uploaded.iter().map(|i| i.id).collect();
        attached.sort();
        expected.sort();
        assert_eq!(attached, expected);
        assert_eq!(h.objects.len().await, 3);
    }

    #[tokio::test]
    async fn test_upload_to_foreign_snippet_is_not_found() {
        let h = harness();
        let sid = snippet(&h, BOB).await;
        let err = h
            .state
            .images
            .upload(ALICE, png_upload(), Some(sid))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m == "Snippet not found"));
        assert_eq!(h.objects.len().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_file_never_reaches_storage() {
        let h = harness();
        let upload = Upload {
            bytes: Bytes::from_static(b"plain text, not an image"),
            declared_type: Some("text/plain".to_string()),
            file_name: Some("notes.txt".to_string()),
        };
        assert!(matches!(
            h.state.images.upload(ALICE, upload, None).await,
            Err(AppError::Validation(_))
        ));
        assert_eq!(h.objects.len().await, 0);
    }

    #[tokio::test]
    async fn test_storage_failure_is_internal_and_records_nothing() {
        let h = harness_with_objects(Arc::new(BrokenStorage));
        let err = h.state.images.upload(ALICE, png_upload(), None).await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert!(h.state.images.list(ALICE).await.unwrap().0.is_empty());
    }

    #[tokio::test]
    async fn test_delete_survives_external_failure() {
        let h = harness_with_objects(Arc::new(BrokenStorage));
        let image = Image {
            id: Uuid::now_v7(),
            owner_id: ALICE.to_string(),
            snippet_id: None,
            external_file_id: "stash-it/alice/lost.png".to_string(),
            external_url: "https://cdn.example.com/stash-it/alice/lost.png".to_string(),
            file_size_bytes: 10,
            created_at: now(),
        };
        h.store.insert_image(&image, 3).await.unwrap();

        h.state.images.delete(ALICE, image.id).await.unwrap();
        assert!(matches!(
            h.state.images.get(ALICE, image.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_is_guarded_and_frees_a_slot() {
        let h = harness();
        let sid = snippet(&h, ALICE).await;
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(h.state.images.upload(ALICE, png_upload(), Some(sid)).await.unwrap());
        }

        assert!(matches!(
            h.state.images.delete(BOB, ids[0].id).await,
            Err(AppError::NotFound(ref m)) if m == "Image not found"
        ));
        assert!(matches!(
            h.state.images.get(BOB, ids[0].id).await,
            Err(AppError::NotFound(ref m)) if m == "Image not found"
        ));
        assert_eq!(h.state.images.get(ALICE, ids[0].id).await.unwrap(), ids[0]);
        assert!(h.objects.contains(&ids[0].external_file_id).await);
        h.state.images.delete(ALICE, ids[0].id).await.unwrap();
        assert!(!h.objects.contains(&ids[0].external_file_id).await);

        h.state.images.upload(ALICE, png_upload(), Some(sid)).await.unwrap();
        assert_eq!(h.state.snippets.list_images(ALICE, sid).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_list_reports_stats_for_owner_only() {
        let h = harness();
        h.state.images.upload(ALICE, png_upload(), None).await.unwrap();
        h.state.images.upload(ALICE, png_upload(), None).await.unwrap();
        h.state.images.upload(BOB, png_upload(), None).await.unwrap();

        let (images, stats) = h.state.images.list(ALICE).await.unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.total_bytes, 2 * png_upload().bytes.len() as i64);
        assert_eq!(stats.total_mb, "0.00");
        assert!(images.iter().all(|i| i.owner_id == ALICE));
    }
}
