pub mod archive;
pub mod db_dump;
pub mod run;
pub mod source;

pub use archive::{Archive, ArchiveCodec, ArchiveInput, ArchiveRegistry};
pub use run::{BackupRun, RunReport, SourceOutcome, SourceReport, VaultUpload};
pub use source::{ALL_VAULTS, BackupSource, SourceKind};
