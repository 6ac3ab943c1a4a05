//! Config-driven backups of databases and directories.
//!
//! A run reads a [`config::BackupSpec`], archives every configured source
//! into a temp directory and uploads each archive to its vaults (S3 buckets
//! or Glacier vaults), optionally keeping a local copy.

pub mod backup;
pub mod config;
pub mod errors;
pub mod logging;
pub mod utils;
pub mod vault;

pub use backup::{ArchiveRegistry, BackupRun, RunReport, SourceOutcome};
pub use config::{BackupSpec, ConfigFormat};
pub use errors::{ConfigError, SpecError, TemplateError};
pub use utils::context::RunContext;
pub use vault::{UploadResult, Vault, VaultKind};
