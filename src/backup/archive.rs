// coverme/src/backup/archive.rs
use anyhow::{Context, Result, anyhow};
use bzip2::write::BzEncoder;
use chrono::{Datelike, NaiveDateTime, Timelike};
use flate2::Compression;
use flate2::write::GzEncoder;
use indexmap::IndexMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tar::{Builder, EntryType, Header};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// What goes into an archive: `member` (or everything, when `None`) below
/// `root_dir`, stored with paths relative to `root_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveInput {
    pub root_dir: PathBuf,
    pub member: Option<PathBuf>,
}

impl ArchiveInput {
    pub fn contents_of(dir: &Path) -> Self {
        Self {
            root_dir: dir.to_path_buf(),
            member: None,
        }
    }
}

/// A compressed file produced for one source during one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    pub path: PathBuf,
    pub base_name: String,
    pub format: String,
}

/// Writes one archive format.
pub trait ArchiveCodec: Send + Sync {
    fn write(&self, input: &ArchiveInput, dest: &Path, mtime: NaiveDateTime) -> Result<()>;
}

#[derive(Clone)]
struct Format {
    extension: Option<String>,
    codec: Arc<dyn ArchiveCodec>,
}

/// Format tag to extension and codec. Starts with `zip`, `tar`, `gztar` and
/// `bztar`; more can be registered per registry instance.
#[derive(Clone)]
pub struct ArchiveRegistry {
    formats: IndexMap<String, Format>,
}

impl Default for ArchiveRegistry {
    fn default() -> Self {
        let mut registry = Self {
            formats: IndexMap::new(),
        };
        registry.register("zip", Some(".zip"), ZipCodec);
        registry.register("tar", Some(".tar"), TarCodec(TarCompression::None));
        registry.register("gztar", Some(".tar.gz"), TarCodec(TarCompression::Gzip));
        registry.register("bztar", Some(".tar.bz2"), TarCodec(TarCompression::Bzip2));
        registry
    }
}

impl ArchiveRegistry {
    /// Adds or replaces a format. Without an extension, names fall back to
    /// `.<tag>`.
    pub fn register(
        &mut self,
        tag: &str,
        extension: Option<&str>,
        codec: impl ArchiveCodec + 'static,
    ) {
        self.formats.insert(
            tag.to_string(),
            Format {
                extension: extension.map(str::to_string),
                codec: Arc::new(codec),
            },
        );
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.formats.contains_key(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.formats.keys().map(String::as_str)
    }

    /// File extension for `tag`, including the leading dot.
    pub fn extension(&self, tag: &str) -> String {
        match self.formats.get(tag).and_then(|f| f.extension.as_deref()) {
            Some(ext) => ext.to_string(),
            None => {
                tracing::warn!("⚠️ No extension registered for archive format `{}`, using `.{}`", tag, tag);
                format!(".{tag}")
            }
        }
    }

    /// Writes `input` to `<base_path><extension>` and returns that path.
    pub fn make_archive(
        &self,
        tag: &str,
        input: &ArchiveInput,
        base_path: &Path,
        mtime: NaiveDateTime,
    ) -> Result<PathBuf> {
        let format = self
            .formats
            .get(tag)
            .ok_or_else(|| anyhow!("Unknown archive format `{}`", tag))?;

        let mut dest = OsString::from(base_path.as_os_str());
        dest.push(self.extension(tag));
        let dest = PathBuf::from(dest);

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create parent directory for archive: {}", parent.display())
            })?;
        }

        tracing::debug!(
            "Creating {} archive from {} to {}",
            tag,
            input.root_dir.display(),
            dest.display()
        );
        format.codec.write(input, &dest, mtime)?;
        Ok(dest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TarCompression {
    None,
    Gzip,
    Bzip2,
}

/// Tar archives, optionally gzip or bzip2 compressed.
#[derive(Debug, Clone, Copy)]
pub struct TarCodec(pub TarCompression);

impl ArchiveCodec for TarCodec {
    fn write(&self, input: &ArchiveInput, dest: &Path, mtime: NaiveDateTime) -> Result<()> {
        let entries = collect_entries(input)?;
        let file = File::create(dest)
            .with_context(|| format!("Failed to create archive file: {}", dest.display()))?;
        let mtime = mtime.and_utc().timestamp().max(0) as u64;

        match self.0 {
            TarCompression::None => {
                let mut inner = write_tar(file, &entries, mtime, dest)?;
                inner.flush()?;
            }
            TarCompression::Gzip => {
                let enc = GzEncoder::new(file, Compression::default());
                write_tar(enc, &entries, mtime, dest)?.finish().with_context(|| {
                    format!("Failed to finish Gzip encoding for archive: {}", dest.display())
                })?;
            }
            TarCompression::Bzip2 => {
                let enc = BzEncoder::new(file, bzip2::Compression::default());
                write_tar(enc, &entries, mtime, dest)?.finish().with_context(|| {
                    format!("Failed to finish Bzip2 encoding for archive: {}", dest.display())
                })?;
            }
        }
        Ok(())
    }
}

fn write_tar<W: Write>(writer: W, entries: &[Entry], mtime: u64, dest: &Path) -> Result<W> {
    let mut tar_builder = Builder::new(writer);

    for entry in entries {
        let mut header = Header::new_gnu();
        header.set_mtime(mtime);
        header.set_uid(0);
        header.set_gid(0);

        let appended = match &entry.kind {
            EntryKind::Dir => {
                header.set_entry_type(EntryType::Directory);
                header.set_mode(0o755);
                header.set_size(0);
                tar_builder.append_data(&mut header, &entry.name, io::empty())
            }
            EntryKind::File { executable } => {
                let file = File::open(&entry.path)
                    .with_context(|| format!("Failed to open {}", entry.path.display()))?;
                let len = file.metadata()?.len();
                header.set_entry_type(EntryType::Regular);
                header.set_mode(if *executable { 0o755 } else { 0o644 });
                header.set_size(len);
                tar_builder.append_data(&mut header, &entry.name, file)
            }
            EntryKind::Symlink(target) => {
                header.set_entry_type(EntryType::Symlink);
                header.set_mode(0o777);
                header.set_size(0);
                tar_builder.append_link(&mut header, &entry.name, target)
            }
        };
        appended.with_context(|| format!("Failed to append {} to archive", entry.path.display()))?;
    }

    tar_builder.into_inner().with_context(|| {
        format!("Failed to finish tar stream for archive: {}", dest.display())
    })
}

/// Zip archives with deflate compression.
#[derive(Debug, Clone, Copy)]
pub struct ZipCodec;

impl ArchiveCodec for ZipCodec {
    fn write(&self, input: &ArchiveInput, dest: &Path, mtime: NaiveDateTime) -> Result<()> {
        let entries = collect_entries(input)?;
        let file = File::create(dest)
            .with_context(|| format!("Failed to create archive file: {}", dest.display()))?;
        let mut zip = ZipWriter::new(file);

        // Zip timestamps cannot predate 1980.
        let stamp = zip::DateTime::from_date_and_time(
            mtime.year().clamp(1980, 2107) as u16,
            mtime.month() as u8,
            mtime.day() as u8,
            mtime.hour() as u8,
            mtime.minute() as u8,
            mtime.second().min(59) as u8,
        )
        .unwrap_or_default();

        for entry in &entries {
            let name = entry.zip_name();
            let appended = match &entry.kind {
                EntryKind::Dir => zip.add_directory(name, zip_options(stamp, 0o755)),
                EntryKind::File { executable } => {
                    let mode = if *executable { 0o755 } else { 0o644 };
                    zip.start_file(name, zip_options(stamp, mode))?;
                    let mut src = File::open(&entry.path)
                        .with_context(|| format!("Failed to open {}", entry.path.display()))?;
                    io::copy(&mut src, &mut zip).with_context(|| {
                        format!("Failed to write {} to archive", entry.path.display())
                    })?;
                    Ok(())
                }
                EntryKind::Symlink(target) => zip.add_symlink(
                    name,
                    target.to_string_lossy().into_owned(),
                    zip_options(stamp, 0o777),
                ),
            };
            appended.with_context(|| format!("Failed to append {} to archive", entry.path.display()))?;
        }

        zip.finish()
            .with_context(|| format!("Failed to finish zip archive: {}", dest.display()))?;
        Ok(())
    }
}

fn zip_options(stamp: zip::DateTime, mode: u32) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(stamp)
        .unix_permissions(mode)
}

#[derive(Debug)]
enum EntryKind {
    Dir,
    File { executable: bool },
    Symlink(PathBuf),
}

#[derive(Debug)]
struct Entry {
    path: PathBuf,
    name: PathBuf,
    kind: EntryKind,
}

impl Entry {
    fn zip_name(&self) -> String {
        let parts: Vec<_> = self
            .name
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect();
        parts.join("/")
    }
}

/// Walks the input in file-name order so identical trees give identical archives.
fn collect_entries(input: &ArchiveInput) -> Result<Vec<Entry>> {
    let start = match &input.member {
        Some(member) => input.root_dir.join(member),
        None => input.root_dir.clone(),
    };
    if fs::symlink_metadata(&start).is_err() {
        return Err(anyhow!("Source for archival does not exist: {}", start.display()));
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(&start).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk directory: {}", start.display()))?;
        let path = entry.path();
        let name = path.strip_prefix(&input.root_dir).with_context(|| {
            format!(
                "Failed to strip prefix {} from {}",
                input.root_dir.display(),
                path.display()
            )
        })?;

        if name.as_os_str().is_empty() {
            continue;
        }

        let file_type = entry.file_type();
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink(fs::read_link(path)?)
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File {
                executable: is_executable(&entry.metadata()?),
            }
        };
        entries.push(Entry {
            path: path.to_path_buf(),
            name: name.to_path_buf(),
            kind,
        });
    }
    Ok(entries)
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}
