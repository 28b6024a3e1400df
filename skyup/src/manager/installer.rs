//! Per-archive update pipeline.
//!
//! This module orchestrates the workflow for one archive:
//! 1. Download the archive into memory
//! 2. Extract it into a private staging directory
//! 3. Count the staged entries
//! 4. Walk the staged tree, skipping unchanged files and writing the rest
//!
//! ```text
//! Pending ─► Fetching ─► Extracting ─► Counting ─► Installing ─► Done
//!               │            │            │            │
//!               └────────────┴────────────┴────────────┴──────► Failed
//! ```
//!
//! A failure aborts the remaining entries of this archive only.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::detector::{ChangeDetector, FileClass};
use super::download::ArchiveFetcher;
use super::error::{ManagerError, ManagerResult};
use super::extractor::{create_staging_dir, ArchiveExtractor, EntryKind, StagedEntry, StagedTree};
use super::progress::ProgressHandle;
use super::writer::ResilientWriter;
use crate::device::ArchiveKind;

/// Staged entries buffered between the tree walker and the installer.
const ENTRY_CHANNEL_CAPACITY: usize = 64;

/// Stages of an archive pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    /// Not started yet.
    #[default]
    Pending,
    /// Downloading the archive.
    Fetching,
    /// Unpacking into the staging directory.
    Extracting,
    /// Counting staged entries.
    Counting,
    /// Copying changed entries to the volume.
    Installing,
    /// Finished successfully.
    Done,
    /// Aborted by an error.
    Failed,
}

impl PipelineStage {
    /// Get a human-readable name for the stage.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Fetching => "Downloading",
            Self::Extracting => "Extracting",
            Self::Counting => "Counting",
            Self::Installing => "Installing",
            Self::Done => "Done",
            Self::Failed => "Failed",
        }
    }

    /// Whether the pipeline has stopped.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Result of one archive's pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    /// Which archive.
    pub archive: ArchiveKind,
    /// Where it was downloaded from.
    pub url: String,
    /// Archive size in bytes.
    pub bytes_downloaded: u64,
    /// Hex SHA-256 of the downloaded archive.
    pub sha256: String,
    /// Entries found in the staged tree.
    pub total_entries: usize,
    /// Entries processed.
    pub processed: usize,
    /// Files written to the volume.
    pub files_written: usize,
    /// Files left untouched because the volume already had them.
    pub files_skipped: usize,
    /// Directories created on the volume.
    pub dirs_created: usize,
    /// Entries that are neither files nor directories.
    pub other_entries: usize,
}

impl InstallReport {
    fn new(archive: ArchiveKind, url: &str) -> Self {
        Self {
            archive,
            url: url.to_string(),
            bytes_downloaded: 0,
            sha256: String::new(),
            total_entries: 0,
            processed: 0,
            files_written: 0,
            files_skipped: 0,
            dirs_created: 0,
            other_entries: 0,
        }
    }
}

/// Collaborators shared by both pipelines of an update.
#[derive(Clone)]
pub(crate) struct PipelineEnv {
    pub fetcher: Arc<dyn ArchiveFetcher>,
    pub extractor: Arc<dyn ArchiveExtractor>,
    pub writer: ResilientWriter,
    pub detector: ChangeDetector,
    pub staging_root: PathBuf,
    pub target_root: PathBuf,
    pub cancel: CancellationToken,
}

/// Update pipeline for a single archive.
pub(crate) struct ArchivePipeline {
    kind: ArchiveKind,
    url: String,
    env: PipelineEnv,
    progress: ProgressHandle,
}

impl ArchivePipeline {
    pub fn new(kind: ArchiveKind, url: String, env: PipelineEnv, progress: ProgressHandle) -> Self {
        Self {
            kind,
            url,
            env,
            progress,
        }
    }

    /// Run the pipeline to completion.
    pub async fn run(self) -> ManagerResult<InstallReport> {
        self.progress.begin();
        let mut report = InstallReport::new(self.kind, &self.url);

        match self.execute(&mut report).await {
            Ok(()) => {
                self.enter(PipelineStage::Done);
                info!(
                    archive = %self.kind,
                    processed = report.processed,
                    written = report.files_written,
                    skipped = report.files_skipped,
                    dirs_created = report.dirs_created,
                    "Archive installed"
                );
                Ok(report)
            }
            Err(e) => {
                self.enter(PipelineStage::Failed);
                error!(archive = %self.kind, error = %e, "Archive pipeline failed");
                Err(e)
            }
        }
    }

    fn enter(&self, stage: PipelineStage) {
        debug!(archive = %self.kind, stage = stage.name(), "Pipeline stage");
        self.progress.set_stage(stage);
    }

    fn check_cancelled(&self) -> ManagerResult<()> {
        if self.env.cancel.is_cancelled() {
            info!(archive = %self.kind, "Pipeline cancelled");
            return Err(ManagerError::Cancelled);
        }
        Ok(())
    }

    async fn execute(&self, report: &mut InstallReport) -> ManagerResult<()> {
        // Stage 1: download
        self.check_cancelled()?;
        self.enter(PipelineStage::Fetching);
        let archive = self.env.fetcher.fetch(&self.url, &self.progress).await?;
        self.progress.set_download(1.0);

        report.bytes_downloaded = archive.len() as u64;
        report.sha256 = format!("{:x}", Sha256::digest(&archive));
        info!(
            archive = %self.kind,
            bytes = report.bytes_downloaded,
            sha256 = %report.sha256,
            "Archive fetched"
        );

        // Stage 2: extract
        self.check_cancelled()?;
        self.enter(PipelineStage::Extracting);
        let staging = {
            let extractor = Arc::clone(&self.env.extractor);
            let staging_root = self.env.staging_root.clone();
            let kind = self.kind;
            tokio::task::spawn_blocking(move || {
                let staging = create_staging_dir(&staging_root, kind)?;
                extractor.extract(&archive, staging.path())?;
                Ok::<_, ManagerError>(staging)
            })
            .await??
        };
        let tree = StagedTree::new(staging.path());
        debug!(archive = %self.kind, staging = %tree.root().display(), "Archive extracted");

        // Stage 3: count
        self.check_cancelled()?;
        self.enter(PipelineStage::Counting);
        let total = {
            let tree = tree.clone();
            tokio::task::spawn_blocking(move || tree.count_entries()).await??
        };
        report.total_entries = total;
        info!(archive = %self.kind, entries = total, "Staged tree counted");

        // Stage 4: install
        self.enter(PipelineStage::Installing);
        self.install(&tree, report).await?;

        // The staging directory goes away with `staging`.
        drop(staging);
        Ok(())
    }

    /// Walk the staged tree and bring the volume up to date.
    async fn install(&self, tree: &StagedTree, report: &mut InstallReport) -> ManagerResult<()> {
        let (tx, mut rx) = mpsc::channel::<ManagerResult<StagedEntry>>(ENTRY_CHANNEL_CAPACITY);
        let walker = {
            let tree = tree.clone();
            tokio::task::spawn_blocking(move || {
                for entry in tree.entries() {
                    if tx.blocking_send(entry).is_err() {
                        // Installer stopped early.
                        break;
                    }
                }
            })
        };

        let total = report.total_entries.max(1) as f32;
        let mut label = String::new();

        while let Some(entry) = rx.recv().await {
            self.check_cancelled()?;
            let entry = entry?;

            self.install_entry(&entry, report).await?;

            report.processed += 1;
            label = entry.relative.to_string_lossy().into_owned();
            self.progress
                .set_install(report.processed as f32 / total, &label);
        }

        walker.await?;
        self.progress.set_install(1.0, &label);
        Ok(())
    }

    async fn install_entry(&self, entry: &StagedEntry, report: &mut InstallReport) -> ManagerResult<()> {
        let target = self.env.target_root.join(&entry.relative);

        match entry.kind {
            EntryKind::Directory => {
                if ensure_dir(&target).await? {
                    report.dirs_created += 1;
                    debug!(path = %entry.relative.display(), "Created directory");
                }
            }
            EntryKind::File => {
                let staged = tokio::fs::read(&entry.path)
                    .await
                    .map_err(|e| ManagerError::ReadFailed {
                        path: entry.path.clone(),
                        source: e,
                    })?;
                let staged = Bytes::from(staged);

                if self.is_unchanged(&staged, &entry.relative, &target).await? {
                    report.files_skipped += 1;
                    debug!(path = %entry.relative.display(), "Unchanged, skipped");
                } else {
                    self.env.writer.write(staged, &target).await?;
                    report.files_written += 1;
                    debug!(path = %entry.relative.display(), "Written");
                }
            }
            EntryKind::Other => {
                report.other_entries += 1;
                debug!(path = %entry.relative.display(), "Not a file or directory, not copied");
            }
        }
        Ok(())
    }

    async fn is_unchanged(&self, staged: &Bytes, relative: &Path, target: &Path) -> ManagerResult<bool> {
        let detector = self.env.detector;
        let class = FileClass::from_path(relative);
        let staged = staged.clone();
        let target = target.to_path_buf();
        let unchanged =
            tokio::task::spawn_blocking(move || detector.is_equivalent(&staged, &target, class))
                .await?;
        Ok(unchanged)
    }
}

/// Create `path` on the volume if absent. Returns whether it was created.
async fn ensure_dir(path: &Path) -> ManagerResult<bool> {
    if tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        return Ok(false);
    }
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| ManagerError::CreateDirFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceContext, DeviceType};
    use crate::manager::download::DownloadProgress;
    use crate::manager::extractor::TarExtractor;
    use crate::manager::progress::ProgressHub;
    use crate::manager::retry::RetryPolicy;
    use futures::future::BoxFuture;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    struct StaticFetcher(Bytes);

    impl ArchiveFetcher for StaticFetcher {
        fn fetch<'a>(
            &'a self,
            _url: &'a str,
            progress: &'a dyn DownloadProgress,
        ) -> BoxFuture<'a, ManagerResult<Bytes>> {
            Box::pin(async move {
                progress.on_fraction(0.5);
                progress.on_complete(self.0.len() as u64);
                Ok(self.0.clone())
            })
        }
    }

    fn tar_bytes(files: &[(&str, &[u8])]) -> Bytes {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, path, *data).unwrap();
        }
        Bytes::from(builder.into_inner().unwrap())
    }

    struct Fixture {
        staging: TempDir,
        volume: TempDir,
        hub: ProgressHub,
        cancel: CancellationToken,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                staging: TempDir::new().unwrap(),
                volume: TempDir::new().unwrap(),
                hub: ProgressHub::new(),
                cancel: CancellationToken::new(),
            }
        }

        fn pipeline(&self, archive: Bytes) -> ArchivePipeline {
            let env = PipelineEnv {
                fetcher: Arc::new(StaticFetcher(archive)),
                extractor: Arc::new(TarExtractor::new()),
                writer: ResilientWriter::new(RetryPolicy::fixed(3, Duration::from_millis(1))),
                detector: ChangeDetector::new(DeviceContext::new(DeviceType::Five, 1234)),
                staging_root: self.staging.path().to_path_buf(),
                target_root: self.volume.path().to_path_buf(),
                cancel: self.cancel.clone(),
            };
            ArchivePipeline::new(
                ArchiveKind::System,
                "memory://system.tar".to_string(),
                env,
                self.hub.handle(ArchiveKind::System),
            )
        }
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(PipelineStage::Fetching.name(), "Downloading");
        assert_eq!(PipelineStage::Done.name(), "Done");
        assert!(PipelineStage::Failed.is_terminal());
        assert!(!PipelineStage::Installing.is_terminal());
        assert_eq!(PipelineStage::default(), PipelineStage::Pending);
    }

    #[tokio::test]
    async fn test_pipeline_installs_fresh_volume() {
        let fixture = Fixture::new();
        let archive = tar_bytes(&[("sys/fw.bin", b"firmware"), ("readme.txt", b"hello")]);

        let report = fixture.pipeline(archive.clone()).run().await.unwrap();

        // readme.txt, sys, sys/fw.bin
        assert_eq!(report.total_entries, 3);
        assert_eq!(report.processed, 3);
        assert_eq!(report.files_written, 2);
        assert_eq!(report.dirs_created, 1);
        assert_eq!(report.bytes_downloaded, archive.len() as u64);
        assert_eq!(report.sha256.len(), 64);

        let volume = fixture.volume.path();
        assert_eq!(fs::read(volume.join("sys/fw.bin")).unwrap(), b"firmware");
        assert_eq!(fs::read(volume.join("readme.txt")).unwrap(), b"hello");

        let progress = fixture.hub.snapshot().system;
        assert_eq!(progress.stage, PipelineStage::Done);
        assert_eq!(progress.download, 1.0);
        assert_eq!(progress.install, 1.0);
        assert_eq!(progress.current_file, "sys/fw.bin");
    }

    #[tokio::test]
    async fn test_second_run_skips_everything() {
        let fixture = Fixture::new();
        let archive = tar_bytes(&[("a.txt", b"same"), ("d/b.oob", b"HEADER123456body")]);

        fixture.pipeline(archive.clone()).run().await.unwrap();
        let report = fixture.pipeline(archive).run().await.unwrap();

        assert_eq!(report.files_written, 0);
        assert_eq!(report.files_skipped, 2);
        assert_eq!(report.dirs_created, 0);
        assert_eq!(report.processed, 3);
    }

    #[tokio::test]
    async fn test_empty_archive_completes() {
        let fixture = Fixture::new();
        let report = fixture.pipeline(tar_bytes(&[])).run().await.unwrap();

        assert_eq!(report.total_entries, 0);
        let progress = fixture.hub.snapshot().system;
        assert_eq!(progress.install, 1.0);
        assert_eq!(progress.stage, PipelineStage::Done);
    }

    #[tokio::test]
    async fn test_malformed_archive_fails_pipeline() {
        let fixture = Fixture::new();
        let err = fixture
            .pipeline(Bytes::from_static(b"definitely not a tarball"))
            .run()
            .await
            .unwrap_err();

        assert!(err.is_extraction());
        assert_eq!(fixture.hub.snapshot().system.stage, PipelineStage::Failed);
    }

    #[tokio::test]
    async fn test_cancelled_pipeline_stops() {
        let fixture = Fixture::new();
        fixture.cancel.cancel();

        let err = fixture
            .pipeline(tar_bytes(&[("a.txt", b"x")]))
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, ManagerError::Cancelled));
        assert!(!fixture.volume.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_directory_blocked_by_file_fails() {
        let fixture = Fixture::new();
        fs::write(fixture.volume.path().join("d"), b"a file where a dir belongs").unwrap();

        let err = fixture
            .pipeline(tar_bytes(&[("d/x.txt", b"x")]))
            .run()
            .await
            .unwrap_err();

        assert!(err.is_write());
    }

    #[tokio::test]
    async fn test_ensure_dir_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("a/b");
        assert!(ensure_dir(&dir).await.unwrap());
        assert!(!ensure_dir(&dir).await.unwrap());
        assert!(dir.is_dir());
    }
}
