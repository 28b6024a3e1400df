//! Runs both archive pipelines against a device volume.
//!
//! The essentials and system archives are updated by two independent tasks.
//! A failure in one does not stop the other; the caller receives both
//! outcomes, or a single error chosen as the most recent failure.

use std::path::Path;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::config::UpdaterConfig;
use super::detector::ChangeDetector;
use super::download::{ArchiveFetcher, HttpFetcher};
use super::error::{ManagerError, ManagerResult};
use super::extractor::{ArchiveExtractor, TarExtractor};
use super::installer::{ArchivePipeline, InstallReport, PipelineEnv};
use super::progress::ProgressHub;
use super::writer::ResilientWriter;
use crate::device::{ArchiveKind, DeviceContext};

/// Outcome of both pipelines, in completion order.
#[derive(Debug)]
pub struct UpdateOutcome {
    /// Essentials pipeline result.
    pub essentials: ManagerResult<InstallReport>,
    /// System pipeline result.
    pub system: ManagerResult<InstallReport>,
    completion_order: Vec<ArchiveKind>,
}

impl UpdateOutcome {
    /// Whether both pipelines reached `Done`.
    pub fn is_success(&self) -> bool {
        self.essentials.is_ok() && self.system.is_ok()
    }

    /// Result for the given archive.
    pub fn result(&self, kind: ArchiveKind) -> &ManagerResult<InstallReport> {
        match kind {
            ArchiveKind::Essentials => &self.essentials,
            ArchiveKind::System => &self.system,
        }
    }

    /// Archives in the order their pipelines finished.
    pub fn completion_order(&self) -> &[ArchiveKind] {
        &self.completion_order
    }

    /// Collapse into a summary, or the error of the pipeline that failed last.
    pub fn into_summary(self) -> ManagerResult<UpdateSummary> {
        let last_failed = self
            .completion_order
            .iter()
            .rev()
            .copied()
            .find(|kind| self.result(*kind).is_err());

        let Self {
            essentials, system, ..
        } = self;

        match last_failed {
            Some(ArchiveKind::Essentials) => Err(take_err(essentials)),
            Some(ArchiveKind::System) => Err(take_err(system)),
            None => Ok(UpdateSummary {
                essentials: essentials?,
                system: system?,
            }),
        }
    }
}

fn take_err(result: ManagerResult<InstallReport>) -> ManagerError {
    match result {
        Err(e) => e,
        Ok(_) => ManagerError::TaskFailed("pipeline reported success".to_string()),
    }
}

/// Reports of a fully successful update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateSummary {
    /// Essentials archive report.
    pub essentials: InstallReport,
    /// System archive report.
    pub system: InstallReport,
}

impl UpdateSummary {
    /// Files written across both archives.
    pub fn files_written(&self) -> usize {
        self.essentials.files_written + self.system.files_written
    }

    /// Files skipped across both archives.
    pub fn files_skipped(&self) -> usize {
        self.essentials.files_skipped + self.system.files_skipped
    }

    /// Bytes downloaded across both archives.
    pub fn bytes_downloaded(&self) -> u64 {
        self.essentials.bytes_downloaded + self.system.bytes_downloaded
    }
}

/// Selective incremental updater for a device volume.
///
/// # Example
///
/// ```ignore
/// let updater = Updater::new(UpdaterConfig::default())?;
/// let mut progress = updater.progress().subscribe();
/// let summary = updater.run(&context, Path::new("/media/SKYTRAXX")).await?;
/// ```
pub struct Updater {
    config: UpdaterConfig,
    fetcher: Arc<dyn ArchiveFetcher>,
    extractor: Arc<dyn ArchiveExtractor>,
    progress: ProgressHub,
    cancel: CancellationToken,
}

impl Updater {
    /// Create an updater that downloads over HTTP.
    pub fn new(config: UpdaterConfig) -> ManagerResult<Self> {
        let fetcher = HttpFetcher::with_timeouts(config.connect_timeout, config.read_timeout)?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    /// Create an updater with a custom archive source.
    pub fn with_fetcher(config: UpdaterConfig, fetcher: Arc<dyn ArchiveFetcher>) -> Self {
        Self {
            config,
            fetcher,
            extractor: Arc::new(TarExtractor::new()),
            progress: ProgressHub::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Progress state for UIs to subscribe to.
    pub fn progress(&self) -> &ProgressHub {
        &self.progress
    }

    /// Token that cancels a running update.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Update the volume and return the outcome of each pipeline.
    ///
    /// # Errors
    ///
    /// Fails up front with [`ManagerError::VolumeUnavailable`] if
    /// `target_root` is not an existing directory. Pipeline errors are
    /// reported inside the [`UpdateOutcome`].
    pub async fn run_detailed(
        &self,
        device: &DeviceContext,
        target_root: &Path,
    ) -> ManagerResult<UpdateOutcome> {
        let is_dir = tokio::fs::metadata(target_root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(ManagerError::VolumeUnavailable {
                path: target_root.to_path_buf(),
            });
        }

        let urls = device.device_type.archive_urls(&self.config.base_url);
        let writer = ResilientWriter::new(self.config.write_policy.clone())
            .with_cancellation(self.cancel.clone());
        info!(
            device = %device.device_type,
            software_version = device.software_version,
            volume = %target_root.display(),
            write_attempts = writer.policy().max_attempts(),
            "Starting update"
        );

        let env = PipelineEnv {
            fetcher: Arc::clone(&self.fetcher),
            extractor: Arc::clone(&self.extractor),
            writer,
            detector: ChangeDetector::new(*device),
            staging_root: self.config.staging_dir.clone(),
            target_root: target_root.to_path_buf(),
            cancel: self.cancel.clone(),
        };

        let mut pending = FuturesUnordered::new();
        for kind in ArchiveKind::ALL {
            let pipeline = ArchivePipeline::new(
                kind,
                urls.get(kind).to_string(),
                env.clone(),
                self.progress.handle(kind),
            );
            let handle = tokio::spawn(pipeline.run());
            pending.push(async move { (kind, handle.await) });
        }

        let mut essentials = None;
        let mut system = None;
        let mut completion_order = Vec::with_capacity(ArchiveKind::ALL.len());

        while let Some((kind, joined)) = pending.next().await {
            let result = joined.map_err(ManagerError::from).and_then(|r| r);
            if let Err(e) = &result {
                warn!(archive = %kind, error = %e, "Archive update failed");
            }
            completion_order.push(kind);
            match kind {
                ArchiveKind::Essentials => essentials = Some(result),
                ArchiveKind::System => system = Some(result),
            }
        }

        let missing = || ManagerError::TaskFailed("pipeline did not report".to_string());
        Ok(UpdateOutcome {
            essentials: essentials.unwrap_or_else(|| Err(missing())),
            system: system.unwrap_or_else(|| Err(missing())),
            completion_order,
        })
    }

    /// Update the volume.
    ///
    /// # Errors
    ///
    /// Returns the most recent pipeline failure if either archive failed.
    pub async fn run(&self, device: &DeviceContext, target_root: &Path) -> ManagerResult<UpdateSummary> {
        let summary = self.run_detailed(device, target_root).await?.into_summary()?;
        info!(
            written = summary.files_written(),
            skipped = summary.files_skipped(),
            bytes = summary.bytes_downloaded(),
            "Update complete"
        );
        Ok(summary)
    }
}
