// coverme/src/errors.rs
use indexmap::IndexMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading and checking a backup configuration.
///
/// All of these are fatal and surface before any source is processed.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read configuration from {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration from {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Errors in configuration file `{path}`")]
    Invalid {
        path: String,
        errors: ValidationErrors,
    },

    #[error("Invalid configuration in `{path}`: {source}")]
    Spec {
        path: String,
        #[source]
        source: SpecError,
    },
}

impl ConfigError {
    /// Section-keyed messages for operator output.
    pub fn messages(&self) -> Vec<String> {
        match self {
            ConfigError::Invalid { errors, .. } => errors.0.values().cloned().collect(),
            ConfigError::Spec { source, .. } => vec![source.to_string()],
            other => vec![other.to_string()],
        }
    }
}

/// Human readable validation messages keyed by configuration section.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub IndexMap<String, String>);

impl ValidationErrors {
    pub fn insert(&mut self, section: impl Into<String>, message: impl Into<String>) {
        self.0.insert(section.into(), message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, section: &str) -> Option<&str> {
        self.0.get(section).map(String::as_str)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (section, message) in &self.0 {
            writeln!(f, "- {section}: {message}")?;
        }
        Ok(())
    }
}

/// Name pattern errors. Unknown placeholders are reported, never dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Unbalanced `{brace}` at position {position} in name pattern `{pattern}`")]
    Syntax {
        pattern: String,
        brace: char,
        position: usize,
    },

    #[error("Unknown placeholder `{{{key}}}` in name pattern `{pattern}`")]
    UnknownPlaceholder { pattern: String, key: String },

    #[error("Environment variable `{0}` referenced by name pattern is not set")]
    MissingEnv(String),
}

/// Failures building a single source or vault from its configuration.
#[derive(Error, Debug)]
pub enum SpecError {
    #[error("Defaults: {0}")]
    Defaults(String),

    #[error("Backup #{index}: {message}")]
    Source { index: usize, message: String },

    #[error("Backup #{index}: {source}")]
    SourceTemplate {
        index: usize,
        #[source]
        source: TemplateError,
    },

    #[error("Vault `{key}`: {message}")]
    Vault { key: String, message: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
