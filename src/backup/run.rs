// coverme/src/backup/run.rs
use anyhow::{Context, Result};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

use super::archive::ArchiveRegistry;
use super::source::{ALL_VAULTS, BackupSource};
use crate::config::{BackupSpec, Defaults};
use crate::utils::context::RunContext;
use crate::utils::{create_private_dir, move_file};
use crate::vault::{UploadResult, Vault, VaultKind};

const TEMP_PREFIX: &str = "coverme-";
const SOURCE_PREFIX: &str = "source-";

/// Result of uploading one archive to one vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultUpload {
    pub vault: String,
    pub result: std::result::Result<UploadResult, String>,
}

impl VaultUpload {
    pub fn succeeded(&self) -> bool {
        matches!(&self.result, Ok(r) if r.success)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    Archived {
        upload_name: String,
        uploads: Vec<VaultUpload>,
        retained: Option<PathBuf>,
    },
    NothingToUpload,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub source: String,
    pub outcome: SourceOutcome,
}

/// Per-source outcomes of one run, in configuration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub sources: Vec<SourceReport>,
}

impl RunReport {
    fn uploads(&self) -> impl Iterator<Item = &VaultUpload> {
        self.sources.iter().flat_map(|s| match &s.outcome {
            SourceOutcome::Archived { uploads, .. } => uploads.as_slice(),
            _ => &[][..],
        })
    }

    pub fn uploads_succeeded(&self) -> usize {
        self.uploads().filter(|u| u.succeeded()).count()
    }

    pub fn uploads_failed(&self) -> usize {
        self.uploads().filter(|u| !u.succeeded()).count()
    }

    pub fn count(&self, pred: impl Fn(&SourceOutcome) -> bool) -> usize {
        self.sources.iter().filter(|s| pred(&s.outcome)).count()
    }
}

/// One pass over every configured source, bounded by one temp directory.
pub struct BackupRun<V: Vault = VaultKind> {
    defaults: Defaults,
    sources: Vec<BackupSource>,
    vaults: IndexMap<String, V>,
    ctx: RunContext,
    registry: ArchiveRegistry,
}

impl BackupRun<VaultKind> {
    pub fn from_spec(spec: BackupSpec, ctx: RunContext, registry: ArchiveRegistry) -> Self {
        Self::new(spec.defaults, spec.sources, spec.vaults, ctx, registry)
    }
}

impl<V: Vault> BackupRun<V> {
    pub fn new(
        defaults: Defaults,
        sources: Vec<BackupSource>,
        vaults: IndexMap<String, V>,
        ctx: RunContext,
        registry: ArchiveRegistry,
    ) -> Self {
        Self {
            defaults,
            sources,
            vaults,
            ctx,
            registry,
        }
    }

    /// Target vault keys for `keys`, with `*` expanded to every configured
    /// vault. Each vault appears at most once.
    pub fn resolve_vault_keys<'a>(&'a self, keys: &'a [String]) -> Vec<&'a str> {
        if keys.iter().any(|k| k == ALL_VAULTS) {
            return self.vaults.keys().map(String::as_str).collect();
        }
        let mut resolved: Vec<&str> = Vec::with_capacity(keys.len());
        for key in keys {
            if !resolved.contains(&key.as_str()) {
                resolved.push(key);
            }
        }
        resolved
    }

    /// Archives and uploads every source in order. A failing source is
    /// recorded in the report and never stops the run; only setup errors are
    /// returned. The run's temp directory is removed when this returns.
    pub async fn run(&self) -> Result<RunReport> {
        let base_dir = &self.defaults.tmpdir;
        create_private_dir(base_dir)?;
        let base_dir = base_dir
            .canonicalize()
            .with_context(|| format!("Failed to resolve temp directory: {}", base_dir.display()))?;
        let temp_dir = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempdir_in(&base_dir)
            .with_context(|| format!("Failed to create run directory in {}", base_dir.display()))?;
        tracing::debug!("📂 Run directory created at: {}", temp_dir.path().display());

        let mut report = RunReport::default();
        for source in &self.sources {
            let outcome = match self.process(source, temp_dir.path()).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("❌ Backup of {} failed: {:#}", source, e);
                    SourceOutcome::Failed(format!("{e:#}"))
                }
            };
            report.sources.push(SourceReport {
                source: source.to_string(),
                outcome,
            });
        }

        let path = temp_dir.path().to_path_buf();
        if let Err(e) = temp_dir.close() {
            tracing::warn!("⚠️ Failed to remove run directory {}: {}", path.display(), e);
        }

        tracing::info!(
            "🎉 Backup run finished: {} archived, {} with nothing to upload, {} failed; {} uploads succeeded, {} failed",
            report.count(|o| matches!(o, SourceOutcome::Archived { .. })),
            report.count(|o| matches!(o, SourceOutcome::NothingToUpload)),
            report.count(|o| matches!(o, SourceOutcome::Failed(_))),
            report.uploads_succeeded(),
            report.uploads_failed(),
        );
        Ok(report)
    }

    async fn process(&self, source: &BackupSource, temp_dir: &Path) -> Result<SourceOutcome> {
        tracing::info!("🚀 Backing up {}", source);
        // Expanded once so the dump, the archive and the upload share one name.
        let base_name = source.base_name(&self.ctx)?;
        // Sources whose names render alike must not share files. Removed on
        // return, after the local copy has been taken.
        let work_dir = tempfile::Builder::new()
            .prefix(SOURCE_PREFIX)
            .tempdir_in(temp_dir)
            .with_context(|| format!("Failed to create work directory in {}", temp_dir.display()))?;

        let Some(archive) = source.archive(&self.ctx, &self.registry, work_dir.path(), &base_name)? else {
            tracing::warn!("Nothing to upload from source {}", source);
            return Ok(SourceOutcome::NothingToUpload);
        };
        tracing::info!("✓ Archived {}", archive.path.display());

        let upload_name = source.archive_full_name(&archive.base_name, &self.registry);
        let mut uploads = Vec::new();
        for key in self.resolve_vault_keys(source.vault_keys()) {
            uploads.push(self.upload_to(key, &archive.path, &upload_name).await);
        }

        // A failed local copy is logged; the upload results stand.
        let retained = match source.local_dir().or(self.defaults.localdir.as_deref()) {
            Some(dir) => {
                let dest = dir.join(&upload_name);
                match move_file(&archive.path, &dest) {
                    Ok(()) => {
                        tracing::info!("✅ Kept local copy at {}", dest.display());
                        Some(dest)
                    }
                    Err(e) => {
                        tracing::error!("❌ Failed to keep local copy of {}: {:#}", upload_name, e);
                        None
                    }
                }
            }
            None => None,
        };

        Ok(SourceOutcome::Archived {
            upload_name,
            uploads,
            retained,
        })
    }

    async fn upload_to(&self, key: &str, archive: &Path, upload_name: &str) -> VaultUpload {
        let result = match self.vaults.get(key) {
            None => Err(format!("Vault `{}` is not configured", key)),
            Some(vault) => match vault.upload(archive, Some(upload_name)).await {
                Ok(result) if result.success => Ok(result),
                Ok(result) => {
                    tracing::debug!("Unsuccessful upload data: {:?}", result.data);
                    Err("vault reported an unsuccessful upload".to_string())
                }
                Err(e) => Err(format!("{e:#}")),
            },
        };

        match &result {
            Ok(_) => tracing::info!("✅ Uploaded {} to vault `{}`", upload_name, key),
            Err(e) => tracing::error!("❌ Upload of {} to vault `{}` failed: {}", upload_name, key, e),
        }
        VaultUpload {
            vault: key.to_string(),
            result,
        }
    }
}
