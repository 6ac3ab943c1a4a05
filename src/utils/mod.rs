pub mod context;
pub mod template;

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use which::which;

/// Resolves a client tool: the configured path when given, otherwise the first
/// match for `name` on `PATH`.
pub fn find_executable(name: &str, configured: Option<&Path>) -> Result<PathBuf> {
    match configured {
        Some(path) => which(path).with_context(|| {
            format!("{} executable not found at configured path {}", name, path.display())
        }),
        None => which(name).with_context(|| {
            format!(
                "{} executable not found in PATH. Please ensure the client tools are installed and in your PATH.",
                name
            )
        }),
    }
}

/// Creates `dir` and its parents, restricting the leaf to the owner on unix.
pub fn create_private_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
        .create(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))
}

/// Moves `from` to `to`, replacing any existing file and creating missing
/// parent directories. Falls back to copy + remove across filesystems.
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    if to.is_file() {
        fs::remove_file(to)
            .with_context(|| format!("Failed to replace existing file: {}", to.display()))?;
    }
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)
        .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
    fs::remove_file(from).with_context(|| format!("Failed to remove {}", from.display()))?;
    Ok(())
}
