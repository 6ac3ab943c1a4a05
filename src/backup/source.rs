// coverme/src/backup/source.rs
use anyhow::{Context, Result};
use indexmap::IndexMap;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use super::archive::{Archive, ArchiveInput, ArchiveRegistry};
use super::db_dump::{DatabaseUrl, Engine, mysqldump_command, pg_dump_command, run_dump};
use crate::config::{Defaults, OneOrMany, RawSource};
use crate::errors::SpecError;
use crate::utils::context::RunContext;
use crate::utils::find_executable;
use crate::utils::template::{NameTemplate, expand_all};

/// Vault key that stands for every configured vault.
pub const ALL_VAULTS: &str = "*";

#[derive(Debug, Clone)]
pub struct DatabaseSource {
    pub url: DatabaseUrl,
    pub options: Vec<String>,
    /// Dump tool override; looked up on `PATH` when unset.
    pub program: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DirectorySource {
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub enum SourceKind {
    Database(DatabaseSource),
    Directory(DirectorySource),
}

/// One configured data origin. Produces at most one archive per run.
#[derive(Debug, Clone)]
pub struct BackupSource {
    name: NameTemplate,
    tags: String,
    to: Vec<String>,
    format: String,
    local_dir: Option<PathBuf>,
    kind: SourceKind,
}

impl BackupSource {
    pub fn from_config<V>(
        index: usize,
        raw: RawSource,
        defaults: &Defaults,
        vaults: &IndexMap<String, V>,
        registry: &ArchiveRegistry,
        ctx: &RunContext,
    ) -> Result<Self, SpecError> {
        let fail = |message: String| SpecError::Source { index, message };

        let kind = match raw.kind.as_deref() {
            Some("database") => {
                let url = raw
                    .url
                    .as_deref()
                    .ok_or_else(|| fail("Key `url` is missing for database source".into()))?;
                let url = DatabaseUrl::parse(url).map_err(fail)?;
                let program = match url.engine {
                    Engine::Postgres => defaults.pg_dump.clone(),
                    Engine::MySql => defaults.mysqldump.clone(),
                };
                SourceKind::Database(DatabaseSource {
                    url,
                    options: raw.options.map(OneOrMany::into_args).unwrap_or_default(),
                    program,
                })
            }
            Some("dir") => {
                let path = raw
                    .path
                    .filter(|p| !p.as_os_str().is_empty())
                    .ok_or_else(|| fail("Key `path` is missing for dir source".into()))?;
                SourceKind::Directory(DirectorySource { path })
            }
            Some(other) => return Err(fail(format!("Unknown backup type `{}`", other))),
            None => return Err(fail("Key `type` is missing".into())),
        };

        let pattern = raw
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| fail("Key `name` is missing".into()))?;
        let name = NameTemplate::parse(&pattern)
            .map_err(|source| SpecError::SourceTemplate { index, source })?;
        let tags = raw.tags.unwrap_or_default();
        // Surfaces missing environment variables before anything runs.
        let rendered = name
            .render(ctx, &tags)
            .map_err(|source| SpecError::SourceTemplate { index, source })?;
        check_base_name(&rendered).map_err(fail)?;

        let to = raw
            .to
            .map(OneOrMany::into_vec)
            .unwrap_or_else(|| vec![ALL_VAULTS.to_string()]);
        if let Some(unknown) = to
            .iter()
            .find(|key| key.as_str() != ALL_VAULTS && !vaults.contains_key(key.as_str()))
        {
            return Err(fail(format!("Unknown vault `{}` in `to`", unknown)));
        }

        let format = raw.format.unwrap_or_else(|| defaults.format.clone());
        if !registry.contains(&format) {
            return Err(fail(format!("Unknown archive format `{}`", format)));
        }

        Ok(Self {
            name,
            tags,
            to,
            format,
            local_dir: raw.localdir,
            kind,
        })
    }

    pub fn kind(&self) -> &SourceKind {
        &self.kind
    }

    /// Expanded archive base name (no extension). Reads the clock on every
    /// call, so a run expands it once per source and reuses the result.
    pub fn base_name(&self, ctx: &RunContext) -> Result<String> {
        let name = self.name.render(ctx, &self.tags)?;
        check_base_name(&name).map_err(anyhow::Error::msg)?;
        Ok(name)
    }

    /// Configured destinations, possibly containing [`ALL_VAULTS`].
    pub fn vault_keys(&self) -> &[String] {
        &self.to
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    /// Base name plus the archive extension, used as the remote key.
    pub fn archive_full_name(&self, base_name: &str, registry: &ArchiveRegistry) -> String {
        format!("{}{}", base_name, registry.extension(&self.format))
    }

    pub fn local_dir(&self) -> Option<&Path> {
        self.local_dir.as_deref()
    }

    /// Captures the source's data under `data_dir`. `None` means there is
    /// nothing to archive.
    pub fn copy_data(&self, ctx: &RunContext, data_dir: &Path) -> Result<Option<ArchiveInput>> {
        match &self.kind {
            SourceKind::Database(db) => {
                let program = find_executable(db.url.engine.tool(), db.program.as_deref())?;
                let dump_file = data_dir.join(
                    data_dir
                        .file_name()
                        .map(PathBuf::from)
                        .unwrap_or_else(|| PathBuf::from(&db.url.database)),
                );
                let options = expand_all(&db.options, ctx, &self.tags)
                    .context("Failed to expand dump options")?;

                let cmd = match db.url.engine {
                    Engine::Postgres => pg_dump_command(&program, &db.url, &options, &dump_file),
                    Engine::MySql => mysqldump_command(&program, &db.url, &options, &dump_file),
                };
                let dumped = run_dump(cmd, &db.url)?;
                Ok(dumped.then(|| ArchiveInput::contents_of(data_dir)))
            }
            SourceKind::Directory(dir) => {
                let path = std::path::absolute(&dir.path)
                    .with_context(|| format!("Invalid directory path: {}", dir.path.display()))?;
                let (Some(root_dir), Some(member)) = (path.parent(), path.file_name()) else {
                    anyhow::bail!("Cannot archive directory without a parent: {}", path.display());
                };
                Ok(Some(ArchiveInput {
                    root_dir: root_dir.to_path_buf(),
                    member: Some(PathBuf::from(member)),
                }))
            }
        }
    }

    /// Captures data into `temp_dir/<base_name>` and compresses it into a
    /// single file next to that directory.
    pub fn archive(
        &self,
        ctx: &RunContext,
        registry: &ArchiveRegistry,
        temp_dir: &Path,
        base_name: &str,
    ) -> Result<Option<Archive>> {
        let data_dir = temp_dir.join(base_name);
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let Some(input) = self.copy_data(ctx, &data_dir)? else {
            return Ok(None);
        };

        let path = registry.make_archive(&self.format, &input, &data_dir, ctx.now())?;
        Ok(Some(Archive {
            path,
            base_name: base_name.to_string(),
            format: self.format.clone(),
        }))
    }
}

/// Base names become paths below the run directory and remote keys, so they
/// must be relative and stay below where they are joined.
fn check_base_name(name: &str) -> Result<(), String> {
    let path = Path::new(name);
    let normal = path
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if name.is_empty() || name.ends_with('/') || !normal {
        return Err(format!(
            "Name `{}` must be a relative path without `.` or `..` segments",
            name
        ));
    }
    Ok(())
}

impl fmt::Display for BackupSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SourceKind::Database(db) => write!(f, "{}", db.url),
            SourceKind::Directory(dir) => write!(f, "{}", dir.path.display()),
        }
    }
}
