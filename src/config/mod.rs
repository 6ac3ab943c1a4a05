// coverme/src/config/mod.rs
use indexmap::IndexMap;
use serde::Deserialize;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::backup::archive::ArchiveRegistry;
use crate::backup::source::BackupSource;
use crate::errors::{ConfigError, Result, SpecError, ValidationErrors};
use crate::utils::context::RunContext;
use crate::vault::VaultKind;

/// Path that makes the loader read standard input.
pub const STDIN_PATH: &str = "-";

pub const DEFAULT_FORMAT: &str = "zip";

/// Serialization of a configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// `.json` files are JSON, everything else is YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }

    /// Piped documents starting with `---` are YAML, everything else is JSON.
    pub fn sniff(content: &str) -> Self {
        if content.trim_start().starts_with("---") {
            ConfigFormat::Yaml
        } else {
            ConfigFormat::Json
        }
    }
}

// Structs for deserializing the configuration document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDefaults {
    pub tmpdir: Option<PathBuf>,
    pub localdir: Option<PathBuf>,
    pub format: Option<String>,
    pub pg_dump: Option<PathBuf>,
    pub mysqldump: Option<PathBuf>,
}

/// A single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }

    /// Free-form options: a single string is split on whitespace.
    pub fn into_args(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => s.split_whitespace().map(str::to_string).collect(),
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSource {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub url: Option<String>,
    pub path: Option<PathBuf>,
    pub name: Option<String>,
    pub tags: Option<String>,
    pub to: Option<OneOrMany>,
    pub format: Option<String>,
    pub localdir: Option<PathBuf>,
    pub options: Option<OneOrMany>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawVault {
    #[serde(alias = "type")]
    pub service: Option<String>,
    pub region: Option<String>,
    pub profile: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint_url: Option<String>,
    pub account: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfig {
    pub defaults: Option<RawDefaults>,
    pub backups: Option<Vec<RawSource>>,
    pub vaults: Option<IndexMap<String, RawVault>>,
}

impl RawConfig {
    /// Operator-facing problems keyed by section. Empty when the document can
    /// be turned into a [`BackupSpec`].
    pub fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::default();
        if self.backups.as_ref().is_none_or(Vec::is_empty) {
            errors.insert("backups", "Section `backups` is empty");
        }
        if self.vaults.as_ref().is_none_or(IndexMap::is_empty) {
            errors.insert("vaults", "Section `vaults` is empty");
        }
        errors
    }
}

/// Run-wide settings with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defaults {
    pub tmpdir: PathBuf,
    pub localdir: Option<PathBuf>,
    pub format: String,
    pub pg_dump: Option<PathBuf>,
    pub mysqldump: Option<PathBuf>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            tmpdir: std::env::temp_dir().join("coverme"),
            localdir: None,
            format: DEFAULT_FORMAT.to_string(),
            pg_dump: None,
            mysqldump: None,
        }
    }
}

impl From<RawDefaults> for Defaults {
    fn from(raw: RawDefaults) -> Self {
        let fallback = Defaults::default();
        Self {
            tmpdir: raw.tmpdir.unwrap_or(fallback.tmpdir),
            localdir: raw.localdir,
            format: raw.format.unwrap_or(fallback.format),
            pg_dump: raw.pg_dump,
            mysqldump: raw.mysqldump,
        }
    }
}

/// The validated, fully constructed configuration. Read-only for a run.
#[derive(Debug)]
pub struct BackupSpec {
    pub defaults: Defaults,
    pub sources: Vec<BackupSource>,
    pub vaults: IndexMap<String, VaultKind>,
}

impl BackupSpec {
    /// Builds every vault and source. The first failure aborts construction,
    /// so a `BackupSpec` never holds a partial source list.
    pub fn from_config(
        raw: RawConfig,
        ctx: &RunContext,
        registry: &ArchiveRegistry,
    ) -> std::result::Result<Self, SpecError> {
        let defaults = Defaults::from(raw.defaults.unwrap_or_default());
        if !registry.contains(&defaults.format) {
            return Err(SpecError::Defaults(format!(
                "Unknown archive format `{}`",
                defaults.format
            )));
        }

        let vaults = raw
            .vaults
            .unwrap_or_default()
            .into_iter()
            .map(|(key, vault)| VaultKind::from_config(&key, vault).map(|v| (key, v)))
            .collect::<std::result::Result<IndexMap<_, _>, _>>()?;

        let sources = raw
            .backups
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(index, source)| {
                BackupSource::from_config(index + 1, source, &defaults, &vaults, registry, ctx)
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            defaults,
            sources,
            vaults,
        })
    }

    /// Reads, validates and constructs the configuration at `path`
    /// (`-` for standard input).
    pub fn create_with_config(
        path: &Path,
        format: Option<ConfigFormat>,
        ctx: &RunContext,
        registry: &ArchiveRegistry,
    ) -> Result<Self> {
        let raw = load_config(path, format)?;
        let label = path.display().to_string();

        let errors = raw.validate();
        if !errors.is_empty() {
            return Err(ConfigError::Invalid {
                path: label,
                errors,
            });
        }

        Self::from_config(raw, ctx, registry).map_err(|source| ConfigError::Spec {
            path: label,
            source,
        })
    }
}

/// Loads a configuration document without validating it.
pub fn load_config(path: &Path, format: Option<ConfigFormat>) -> Result<RawConfig> {
    let label = path.display().to_string();

    if path.as_os_str() == STDIN_PATH {
        let mut content = String::new();
        std::io::stdin()
            .read_to_string(&mut content)
            .map_err(|source| ConfigError::Read {
                path: label.clone(),
                source,
            })?;
        let format = format.unwrap_or_else(|| ConfigFormat::sniff(&content));
        return parse_config(&content, format, &label);
    }

    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: label.clone(),
        source,
    })?;
    parse_config(
        &content,
        format.unwrap_or_else(|| ConfigFormat::from_path(path)),
        &label,
    )
}

pub fn parse_config(content: &str, format: ConfigFormat, label: &str) -> Result<RawConfig> {
    let parsed = match format {
        ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        ConfigFormat::Yaml => serde_yaml::from_str::<Option<RawConfig>>(content)
            .map(Option::unwrap_or_default)
            .map_err(|e| e.to_string()),
    };
    parsed.map_err(|message| ConfigError::Parse {
        path: label.to_string(),
        message,
    })
}
