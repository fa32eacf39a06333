use std::collections::HashMap;

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ServerSideEncryption;
use chrono::{DateTime, Utc};

use super::object_store::{ObjectStore, ObjectStoreError, ObjectSummary, StoredObject};
use super::run_blocking;

pub struct S3ObjectStore {
    bucket: String,
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    pub fn new(bucket: impl Into<String>, client: aws_sdk_s3::Client) -> Self {
        Self {
            bucket: bucket.into(),
            client,
        }
    }
}

impl ObjectStore for S3ObjectStore {
    fn put_object(
        &self,
        key: &str,
        body: &[u8],
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<(), ObjectStoreError> {
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body.to_vec()))
            .content_type(content_type)
            .set_metadata(Some(metadata.clone()))
            .server_side_encryption(ServerSideEncryption::Aes256);

        run_blocking(async move { request.send().await })
            .map(|_| ())
            .map_err(|error| {
                ObjectStoreError::Backend(format!("failed to write {key} to s3: {error}"))
            })
    }

    fn get_object(&self, key: &str) -> Result<StoredObject, ObjectStoreError> {
        let request = self.client.get_object().bucket(&self.bucket).key(key);

        run_blocking(async move {
            let output = match request.send().await {
                Ok(output) => output,
                Err(error) => {
                    let missing = error
                        .as_service_error()
                        .map(|service| service.is_no_such_key())
                        .unwrap_or(false);
                    return Err(if missing {
                        ObjectStoreError::NotFound {
                            key: key.to_string(),
                        }
                    } else {
                        ObjectStoreError::Backend(format!("failed to read {key} from s3: {error}"))
                    });
                }
            };
            let metadata = output.metadata().cloned().unwrap_or_default();
            let body = output
                .body
                .collect()
                .await
                .map_err(|error| {
                    ObjectStoreError::Backend(format!("failed to stream {key} from s3: {error}"))
                })?
                .into_bytes()
                .to_vec();
            Ok(StoredObject { body, metadata })
        })
    }

    fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectSummary>, ObjectStoreError> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take());
            let output = run_blocking(async move { request.send().await }).map_err(|error| {
                ObjectStoreError::Backend(format!("failed to list {prefix} in s3: {error}"))
            })?;

            for object in output.contents() {
                let Some(key) = object.key() else {
                    continue;
                };
                let last_modified = object
                    .last_modified()
                    .and_then(|at| DateTime::<Utc>::from_timestamp(at.secs(), at.subsec_nanos()))
                    .unwrap_or_default();
                objects.push(ObjectSummary {
                    key: key.to_string(),
                    size: object.size().unwrap_or_default().max(0) as u64,
                    last_modified,
                    storage_class: object
                        .storage_class()
                        .map(|class| class.as_str().to_string()),
                });
            }

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string())
                }
                _ => return Ok(objects),
            }
        }
    }
}
