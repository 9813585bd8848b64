use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::info;

use crate::errors::AppError;
use crate::object_store::{ObjectStorage, PutObject, StoredObject};

/// S3 / MinIO backed object storage. The file id is the object key; the URL is
/// the key under the configured public base URL.
#[derive(Clone)]
pub struct S3ObjectStorage {
    client: S3Client,
    bucket: String,
    public_url: String,
}

impl S3ObjectStorage {
    pub fn new(client: S3Client, bucket: String, public_url: String) -> Self {
        Self {
            client,
            bucket,
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_url, key)
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    async fn put(&self, object: PutObject) -> Result<StoredObject, AppError> {
        let key = object.key();
        let byte_size = object.bytes.len() as i64;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(object.bytes))
            .content_type(&object.content_type)
            .metadata("tags", object.tags.join(","))
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 upload failed: {e}")))?;

        info!("Uploaded image to s3://{}/{}", self.bucket, key);

        Ok(StoredObject {
            url: self.url_for(&key),
            file_id: key,
            byte_size,
        })
    }

    async fn delete(&self, file_id: &str) -> Result<(), AppError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(file_id)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 delete failed: {e}")))?;

        info!("Deleted s3://{}/{}", self.bucket, file_id);
        Ok(())
    }
}
