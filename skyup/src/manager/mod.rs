//! Selective incremental update engine.
//!
//! Downloads the device's archives, unpacks them into staging directories and
//! copies only changed files onto the device volume.
//!
//! # Architecture
//!
//! ```text
//! Updater
//!    ├── ArchivePipeline (essentials) ─┐
//!    └── ArchivePipeline (system) ─────┤
//!                                      ├── ArchiveFetcher   download into memory
//!                                      ├── ArchiveExtractor unpack into staging
//!                                      ├── ChangeDetector   skip unchanged files
//!                                      ├── ResilientWriter  atomic, retried writes
//!                                      └── ProgressHandle   per-archive progress
//! ```

mod config;
mod detector;
pub mod download;
mod error;
mod extractor;
mod installer;
mod progress;
mod retry;
mod updater;
mod writer;

pub use config::UpdaterConfig;
pub use detector::{
    embedded_index_version, ChangeDetector, FileClass, GENERIC_PREFIX_LEN, INDEX_VERSION_RANGE,
    OBJECT_HEADER_LEN,
};
pub use download::{ArchiveFetcher, DownloadProgress, HttpFetcher, NoProgress};
pub use error::{ManagerError, ManagerResult};
pub use extractor::{
    create_staging_dir, ArchiveExtractor, EntryKind, StagedEntry, StagedTree, TarExtractor,
};
pub use installer::{InstallReport, PipelineStage};
pub use progress::{ArchiveProgress, ProgressHandle, ProgressHub, ProgressSnapshot};
pub use retry::{Backoff, RetryPolicy, DEFAULT_WRITE_ATTEMPTS, STALE_HANDLE_DELAY_MS};
pub use updater::{UpdateOutcome, UpdateSummary, Updater};
pub use writer::{is_stale_handle, AtomicCommit, ResilientWriter, TempFileCommit};
