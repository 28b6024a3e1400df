//! Terminal progress bars fed from progress snapshots.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use skyup::device::ArchiveKind;
use skyup::manager::{ArchiveProgress, PipelineStage, ProgressSnapshot};

const BAR_LENGTH: u64 = 100;
const MAX_LABEL_LEN: usize = 48;

/// Download and install bars for one archive.
#[derive(Clone)]
struct ArchiveBars {
    download: ProgressBar,
    install: ProgressBar,
}

/// Four bars: download and install for each archive.
#[derive(Clone)]
pub struct ProgressDisplay {
    _multi: MultiProgress,
    essentials: ArchiveBars,
    system: ArchiveBars,
}

impl ProgressDisplay {
    /// Create and draw the bars.
    pub fn new() -> Self {
        let multi = MultiProgress::new();
        let style = ProgressStyle::default_bar()
            .template("{prefix:>22} [{bar:40.cyan/blue}] {pos:>3}% {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");

        let bar = |prefix: String| {
            let pb = multi.add(ProgressBar::new(BAR_LENGTH));
            pb.set_style(style.clone());
            pb.set_prefix(prefix);
            pb
        };

        let bars = |kind: ArchiveKind| ArchiveBars {
            download: bar(format!("{} download", kind)),
            install: bar(format!("{} install", kind)),
        };

        let essentials = bars(ArchiveKind::Essentials);
        let system = bars(ArchiveKind::System);

        Self {
            _multi: multi,
            essentials,
            system,
        }
    }

    fn bars(&self, kind: ArchiveKind) -> &ArchiveBars {
        match kind {
            ArchiveKind::Essentials => &self.essentials,
            ArchiveKind::System => &self.system,
        }
    }

    /// Move the bars to the snapshot's values.
    pub fn render(&self, snapshot: &ProgressSnapshot) {
        for kind in ArchiveKind::ALL {
            let progress = snapshot.archive(kind);
            let bars = self.bars(kind);
            bars.download.set_position(percent(progress.download));
            bars.download.set_message(progress.stage.name());
            bars.install.set_position(percent(progress.install));
            bars.install.set_message(shorten(&progress.current_file));
        }
    }

    /// Final render; failed archives are left abandoned.
    pub fn finish(&self, snapshot: &ProgressSnapshot) {
        self.render(snapshot);
        for kind in ArchiveKind::ALL {
            let progress: &ArchiveProgress = snapshot.archive(kind);
            let bars = self.bars(kind);
            if progress.stage == PipelineStage::Done {
                bars.download.finish();
                bars.install.finish_with_message("done");
            } else {
                bars.download.abandon();
                bars.install.abandon_with_message(progress.stage.name());
            }
        }
    }
}

impl Default for ProgressDisplay {
    fn default() -> Self {
        Self::new()
    }
}

/// Whole percent, truncated like the completion check.
fn percent(fraction: f32) -> u64 {
    (fraction.clamp(0.0, 1.0) * BAR_LENGTH as f32) as u64
}

/// Keep the tail of long paths.
fn shorten(label: &str) -> String {
    let chars: Vec<char> = label.chars().collect();
    if chars.len() <= MAX_LABEL_LEN {
        return label.to_string();
    }
    let tail: String = chars[chars.len() - (MAX_LABEL_LEN - 3)..].iter().collect();
    format!("...{}", tail)
}
