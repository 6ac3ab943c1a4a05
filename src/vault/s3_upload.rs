// coverme/src/vault/s3_upload.rs
use anyhow::{Context, Result, anyhow};
use aws_sdk_s3 as s3;
use s3::error::DisplayErrorContext;
use s3::primitives::ByteStream;
use s3::types::ObjectCannedAcl;
use std::path::Path;
use tokio::sync::OnceCell;

use super::{ServiceConfig, UploadResult, Vault, remote_name};

/// S3-compatible object storage bucket.
#[derive(Debug)]
pub struct S3Vault {
    bucket: String,
    service: ServiceConfig,
    client: OnceCell<s3::Client>,
}

impl S3Vault {
    pub fn new(bucket: String, service: ServiceConfig) -> Self {
        Self {
            bucket,
            service,
            client: OnceCell::new(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn client(&self) -> &s3::Client {
        self.client
            .get_or_init(|| async {
                let sdk_config = self.service.load().await;
                s3::Client::new(&sdk_config)
            })
            .await
    }
}

impl Vault for S3Vault {
    /// Uploads a file as a private object.
    async fn upload(&self, archive: &Path, upload_name: Option<&str>) -> Result<UploadResult> {
        let key = remote_name(archive, upload_name);
        tracing::info!(
            "Uploading {} to S3 bucket {} with key {}",
            archive.display(),
            self.bucket,
            key
        );

        let body = ByteStream::from_path(archive)
            .await
            .with_context(|| format!("Failed to create ByteStream from file: {}", archive.display()))?;

        let output = self
            .client()
            .await
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .acl(ObjectCannedAcl::Private)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                anyhow!(
                    "Failed to upload file {} to S3 bucket {} with key {}: {}",
                    archive.display(),
                    self.bucket,
                    key,
                    DisplayErrorContext(&e)
                )
            })?;

        let mut result = UploadResult::ok([("bucket", self.bucket.clone()), ("key", key)]);
        if let Some(etag) = output.e_tag() {
            result.data.insert("etag".to_string(), etag.to_string());
        }
        Ok(result)
    }
}
