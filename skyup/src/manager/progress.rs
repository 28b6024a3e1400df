//! Progress state shared between the update pipelines and a UI.
//!
//! The [`ProgressHub`] is the single owner of the progress state. Each
//! pipeline receives a [`ProgressHandle`] that can only modify the fields of
//! its own archive; UIs call [`ProgressHub::subscribe`] and render the
//! [`ProgressSnapshot`]s they receive.
//!
//! ```text
//! essentials pipeline ──ProgressHandle──┐
//!                                       ├──► watch::Sender ──► UI receivers
//! system pipeline ─────ProgressHandle───┘
//! ```

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use super::download::DownloadProgress;
use super::installer::PipelineStage;
use crate::device::ArchiveKind;

/// Progress of a single archive.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArchiveProgress {
    /// Download fraction in `[0, 1]`.
    pub download: f32,
    /// Install fraction (`processed / total` entries) in `[0, 1]`.
    pub install: f32,
    /// Relative path of the entry processed last.
    pub current_file: String,
    /// Current pipeline stage.
    pub stage: PipelineStage,
}

impl ArchiveProgress {
    /// Both counters at 100%.
    pub fn is_done(&self) -> bool {
        whole_percent(self.download) == 100 && whole_percent(self.install) == 100
    }
}

/// Point-in-time view of both archives' progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    /// Essentials archive progress.
    pub essentials: ArchiveProgress,
    /// System archive progress.
    pub system: ArchiveProgress,
}

impl ProgressSnapshot {
    /// Progress of the given archive.
    pub fn archive(&self, kind: ArchiveKind) -> &ArchiveProgress {
        match kind {
            ArchiveKind::Essentials => &self.essentials,
            ArchiveKind::System => &self.system,
        }
    }

    fn archive_mut(&mut self, kind: ArchiveKind) -> &mut ArchiveProgress {
        match kind {
            ArchiveKind::Essentials => &mut self.essentials,
            ArchiveKind::System => &mut self.system,
        }
    }

    /// True iff all four counters are at 100%.
    pub fn is_done(&self) -> bool {
        self.essentials.is_done() && self.system.is_done()
    }
}

/// Whole percent of a fraction, truncated.
fn whole_percent(fraction: f32) -> u32 {
    (fraction.clamp(0.0, 1.0) * 100.0) as u32
}

fn clamp_fraction(fraction: f32) -> f32 {
    if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    }
}

/// Owner of the progress state.
#[derive(Debug, Clone)]
pub struct ProgressHub {
    tx: Arc<watch::Sender<ProgressSnapshot>>,
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressHub {
    /// Create a hub with all counters at zero.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ProgressSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    /// Subscribe to snapshot updates.
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.tx.subscribe()
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.tx.borrow().clone()
    }

    /// Writer handle for one archive.
    pub fn handle(&self, kind: ArchiveKind) -> ProgressHandle {
        ProgressHandle {
            kind,
            tx: Arc::clone(&self.tx),
        }
    }

    /// Reset every counter before a retry from scratch.
    pub fn reset(&self) {
        self.tx.send_replace(ProgressSnapshot::default());
    }
}

/// Writer for the progress fields of a single archive.
///
/// Fractions are clamped to `[0, 1]` and never move backwards within a run.
#[derive(Debug, Clone)]
pub struct ProgressHandle {
    kind: ArchiveKind,
    tx: Arc<watch::Sender<ProgressSnapshot>>,
}

impl ProgressHandle {
    /// The archive this handle writes to.
    pub fn kind(&self) -> ArchiveKind {
        self.kind
    }

    /// Clear this archive's fields at the start of a run.
    pub fn begin(&self) {
        let kind = self.kind;
        self.tx.send_modify(|snapshot| {
            *snapshot.archive_mut(kind) = ArchiveProgress::default();
        });
    }

    /// Record a stage transition.
    pub fn set_stage(&self, stage: PipelineStage) {
        let kind = self.kind;
        self.tx.send_modify(|snapshot| snapshot.archive_mut(kind).stage = stage);
    }

    /// Record download progress.
    pub fn set_download(&self, fraction: f32) {
        let kind = self.kind;
        let fraction = clamp_fraction(fraction);
        self.tx.send_modify(|snapshot| {
            let archive = snapshot.archive_mut(kind);
            archive.download = archive.download.max(fraction);
        });
    }

    /// Record install progress and the entry just processed.
    pub fn set_install(&self, fraction: f32, current_file: &str) {
        let kind = self.kind;
        let fraction = clamp_fraction(fraction);
        self.tx.send_modify(|snapshot| {
            let archive = snapshot.archive_mut(kind);
            archive.install = archive.install.max(fraction);
            archive.current_file.clear();
            archive.current_file.push_str(current_file);
        });
    }

    /// Current progress of this archive.
    pub fn current(&self) -> ArchiveProgress {
        self.tx.borrow().archive(self.kind).clone()
    }
}

impl DownloadProgress for ProgressHandle {
    fn on_fraction(&self, fraction: f32) {
        self.set_download(fraction);
    }

    fn on_complete(&self, _total_bytes: u64) {
        self.set_download(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_hub_is_not_done() {
        let hub = ProgressHub::new();
        let snapshot = hub.snapshot();
        assert!(!snapshot.is_done());
        assert_eq!(snapshot.essentials.stage, PipelineStage::Pending);
    }

    #[test]
    fn test_handles_only_touch_their_archive() {
        let hub = ProgressHub::new();
        let essentials = hub.handle(ArchiveKind::Essentials);

        essentials.set_download(0.5);
        essentials.set_install(0.25, "maps/alps.oab");

        let snapshot = hub.snapshot();
        assert_eq!(snapshot.essentials.download, 0.5);
        assert_eq!(snapshot.essentials.install, 0.25);
        assert_eq!(snapshot.essentials.current_file, "maps/alps.oab");
        assert_eq!(snapshot.system, ArchiveProgress::default());
    }

    #[test]
    fn test_done_requires_all_four_counters() {
        let hub = ProgressHub::new();
        let essentials = hub.handle(ArchiveKind::Essentials);
        let system = hub.handle(ArchiveKind::System);

        essentials.set_download(1.0);
        essentials.set_install(1.0, "a");
        system.set_download(1.0);
        assert!(!hub.snapshot().is_done());

        system.set_install(0.999, "b");
        assert!(!hub.snapshot().is_done());

        system.set_install(1.0, "c");
        assert!(hub.snapshot().is_done());
    }

    #[test]
    fn test_fractions_are_monotonic_and_clamped() {
        let hub = ProgressHub::new();
        let system = hub.handle(ArchiveKind::System);

        system.set_download(0.6);
        system.set_download(0.4);
        assert_eq!(system.current().download, 0.6);

        system.set_download(7.0);
        assert_eq!(system.current().download, 1.0);

        system.set_install(f32::NAN, "x");
        assert_eq!(system.current().install, 0.0);
    }

    #[test]
    fn test_begin_and_reset() {
        let hub = ProgressHub::new();
        let essentials = hub.handle(ArchiveKind::Essentials);
        let system = hub.handle(ArchiveKind::System);
        essentials.set_download(1.0);
        system.set_download(1.0);

        essentials.begin();
        assert_eq!(hub.snapshot().essentials.download, 0.0);
        assert_eq!(hub.snapshot().system.download, 1.0);

        hub.reset();
        assert_eq!(hub.snapshot(), ProgressSnapshot::default());
    }

    #[tokio::test]
    async fn test_subscribers_observe_updates() {
        let hub = ProgressHub::new();
        let mut rx = hub.subscribe();
        let handle = hub.handle(ArchiveKind::Essentials);

        handle.set_stage(PipelineStage::Fetching);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().essentials.stage, PipelineStage::Fetching);
    }

    #[test]
    fn test_download_progress_impl_completes() {
        let hub = ProgressHub::new();
        let handle = hub.handle(ArchiveKind::System);
        handle.on_fraction(0.3);
        handle.on_complete(1024);
        assert_eq!(handle.current().download, 1.0);
    }
}
