// coverme/src/vault/glacier_upload.rs
use anyhow::{Context, Result, anyhow};
use aws_sdk_glacier as glacier;
use glacier::error::DisplayErrorContext;
use glacier::primitives::ByteStream;
use std::path::Path;
use tokio::sync::OnceCell;

use super::{ServiceConfig, UploadResult, Vault, remote_name};

/// Account id meaning "the account that owns the credentials".
const CURRENT_ACCOUNT: &str = "-";

/// Glacier vault. Archives are stored as single-request uploads and
/// identified by the returned archive id; the upload name becomes the
/// archive description.
#[derive(Debug)]
pub struct GlacierVault {
    vault_name: String,
    account: String,
    service: ServiceConfig,
    client: OnceCell<glacier::Client>,
}

impl GlacierVault {
    pub fn new(vault_name: String, account: Option<String>, service: ServiceConfig) -> Self {
        Self {
            vault_name,
            account: account
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| CURRENT_ACCOUNT.to_string()),
            service,
            client: OnceCell::new(),
        }
    }

    pub fn vault_name(&self) -> &str {
        &self.vault_name
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    async fn client(&self) -> &glacier::Client {
        self.client
            .get_or_init(|| async {
                let sdk_config = self.service.load().await;
                glacier::Client::new(&sdk_config)
            })
            .await
    }
}

impl Vault for GlacierVault {
    async fn upload(&self, archive: &Path, upload_name: Option<&str>) -> Result<UploadResult> {
        let description = remote_name(archive, upload_name);
        tracing::info!(
            "Uploading {} to Glacier vault {} as {}",
            archive.display(),
            self.vault_name,
            description
        );

        let body = ByteStream::from_path(archive)
            .await
            .with_context(|| format!("Failed to create ByteStream from file: {}", archive.display()))?;

        let output = self
            .client()
            .await
            .upload_archive()
            .account_id(&self.account)
            .vault_name(&self.vault_name)
            .archive_description(&description)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                anyhow!(
                    "Failed to upload file {} to Glacier vault {}: {}",
                    archive.display(),
                    self.vault_name,
                    DisplayErrorContext(&e)
                )
            })?;

        let Some(archive_id) = output.archive_id() else {
            tracing::warn!("⚠️ Glacier accepted {} but returned no archive id", description);
            return Ok(UploadResult::failed());
        };

        let mut result = UploadResult::ok([
            ("vault", self.vault_name.clone()),
            ("archive_id", archive_id.to_string()),
            ("description", description),
        ]);
        if let Some(location) = output.location() {
            result.data.insert("location".to_string(), location.to_string());
        }
        Ok(result)
    }
}
