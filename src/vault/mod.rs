// coverme/src/vault/mod.rs
pub(crate) mod glacier_upload;
pub(crate) mod s3_upload;

use anyhow::Result;
use aws_config::SdkConfig;
use aws_sdk_s3::config::{Credentials, Region};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::Path;

use crate::config::RawVault;
use crate::errors::SpecError;

pub use glacier_upload::GlacierVault;
pub use s3_upload::S3Vault;

/// Outcome of one upload. `data` carries the storage identifier on success
/// (`key` for object stores, `archive_id` for cold stores).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadResult {
    pub success: bool,
    pub data: BTreeMap<String, String>,
}

impl UploadResult {
    pub fn ok<K: Into<String>, V: Into<String>>(data: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            success: true,
            data: data.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn failed() -> Self {
        Self::default()
    }
}

/// A remote destination that accepts archive files.
pub trait Vault {
    /// Streams `archive` to the destination. `upload_name` replaces the file's
    /// own name as the remote key when given.
    fn upload(
        &self,
        archive: &Path,
        upload_name: Option<&str>,
    ) -> impl Future<Output = Result<UploadResult>> + Send;
}

/// Remote name for `archive`: the explicit name, else the file's base name.
pub fn remote_name(archive: &Path, upload_name: Option<&str>) -> String {
    match upload_name {
        Some(name) => name.to_string(),
        None => archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }
}

/// AWS session settings shared by every vault service.
#[derive(Clone, Default)]
pub struct ServiceConfig {
    pub region: Option<String>,
    pub profile: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint_url: Option<String>,
}

impl ServiceConfig {
    /// Explicit keys win over the named profile, which wins over the ambient
    /// credential chain.
    pub async fn load(&self) -> SdkConfig {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &self.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &self.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(key_id), Some(secret)) => {
                loader = loader.credentials_provider(Credentials::new(
                    key_id, secret, None, // session_token
                    None, // expiry
                    "Static",
                ));
            }
            _ => {
                if let Some(profile) = &self.profile {
                    loader = loader.profile_name(profile);
                }
            }
        }
        loader.load().await
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("region", &self.region)
            .field("profile", &self.profile)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "***"))
            .field("endpoint_url", &self.endpoint_url)
            .finish()
    }
}

/// Every supported destination.
#[derive(Debug)]
pub enum VaultKind {
    ObjectStore(S3Vault),
    ColdStore(GlacierVault),
}

impl VaultKind {
    /// Builds the vault named `key`. No network access happens here; the
    /// session is established on first upload.
    pub fn from_config(key: &str, raw: RawVault) -> Result<Self, SpecError> {
        let fail = |message: String| SpecError::Vault {
            key: key.to_string(),
            message,
        };

        let service = ServiceConfig {
            region: raw.region,
            profile: raw.profile,
            access_key_id: raw.access_key_id,
            secret_access_key: raw.secret_access_key,
            endpoint_url: raw.endpoint_url,
        };
        let name = || {
            raw.name
                .clone()
                .filter(|n| !n.is_empty())
                .ok_or_else(|| fail("Key `name` is missing".into()))
        };

        match raw.service.as_deref() {
            Some("s3") => Ok(VaultKind::ObjectStore(S3Vault::new(name()?, service))),
            Some("glacier") => Ok(VaultKind::ColdStore(GlacierVault::new(
                name()?,
                raw.account.clone(),
                service,
            ))),
            Some(other) => Err(fail(format!("Unknown vault service `{}`", other))),
            None => Err(fail("Key `service` is missing".into())),
        }
    }
}

impl Vault for VaultKind {
    async fn upload(&self, archive: &Path, upload_name: Option<&str>) -> Result<UploadResult> {
        match self {
            VaultKind::ObjectStore(vault) => vault.upload(archive, upload_name).await,
            VaultKind::ColdStore(vault) => vault.upload(archive, upload_name).await,
        }
    }
}

impl fmt::Display for VaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VaultKind::ObjectStore(vault) => write!(f, "s3://{}", vault.bucket()),
            VaultKind::ColdStore(vault) => write!(f, "glacier:{}", vault.vault_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(service: Option<&str>, name: Option<&str>) -> RawVault {
        RawVault {
            service: service.map(str::to_string),
            name: name.map(str::to_string),
            region: Some("eu-west-1".into()),
            ..Default::default()
        }
    }

    #[test]
    fn builds_each_service() {
        let s3 = VaultKind::from_config("main", raw(Some("s3"), Some("bucket"))).unwrap();
        assert_eq!(s3.to_string(), "s3://bucket");

        let glacier = VaultKind::from_config("cold", raw(Some("glacier"), Some("archive"))).unwrap();
        assert_eq!(glacier.to_string(), "glacier:archive");
    }

    #[test]
    fn rejects_missing_name_and_unknown_service() {
        let err = VaultKind::from_config("main", raw(Some("s3"), None)).unwrap_err();
        assert_eq!(err.to_string(), "Vault `main`: Key `name` is missing");

        let err = VaultKind::from_config("main", raw(Some("ftp"), Some("x"))).unwrap_err();
        assert_eq!(err.to_string(), "Vault `main`: Unknown vault service `ftp`");

        let err = VaultKind::from_config("main", raw(None, Some("x"))).unwrap_err();
        assert_eq!(err.to_string(), "Vault `main`: Key `service` is missing");
    }

    #[test]
    fn remote_name_prefers_explicit_name() {
        let archive = Path::new("/tmp/run/app-2024.zip");
        assert_eq!(remote_name(archive, Some("db/app.zip")), "db/app.zip");
        assert_eq!(remote_name(archive, None), "app-2024.zip");
    }

    #[test]
    fn secrets_are_not_debug_printed() {
        let config = ServiceConfig {
            access_key_id: Some("AKIA".into()),
            secret_access_key: Some("hunter2".into()),
            ..Default::default()
        };
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
