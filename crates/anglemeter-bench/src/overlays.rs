//! Overlay renderer that writes one SVG file per frame.

use std::fs;
use std::path::{Path, PathBuf};

use anglemeter_export::{SvgMetadata, to_overlay_svg};
use anglemeter_pipeline::Dimensions;
use anglemeter_pipeline::overlay::{FrameOverlay, OverlayRenderer};
use tracing::warn;

/// File name for a frame's overlay, e.g. `frame_000042.svg`.
pub fn overlay_file_name(frame_index: u64) -> String {
    format!("frame_{frame_index:06}.svg")
}

/// Writes each frame's overlay into a directory.
///
/// A failed write is logged and counted but does not stop the run:
/// overlays are a visual aid, the angle log is the output.
#[derive(Debug)]
pub struct SvgDirectory {
    dir: PathBuf,
    dimensions: Dimensions,
    config_json: Option<String>,
    written: u64,
    failed: u64,
}

impl SvgDirectory {
    pub fn new(dir: &Path, dimensions: Dimensions, config_json: Option<String>) -> Self {
        Self {
            dir: dir.to_path_buf(),
            dimensions,
            config_json,
            written: 0,
            failed: 0,
        }
    }

    pub const fn written(&self) -> u64 {
        self.written
    }

    pub const fn failed(&self) -> u64 {
        self.failed
    }
}

impl OverlayRenderer for SvgDirectory {
    fn render(&mut self, overlay: &FrameOverlay) {
        let path = self.dir.join(overlay_file_name(overlay.frame_index));
        let title = format!("frame {}", overlay.frame_index);
        let metadata = SvgMetadata {
            title: Some(&title),
            description: None,
            config_json: self.config_json.as_deref(),
        };
        let svg = to_overlay_svg(overlay, self.dimensions, &metadata);
        match fs::write(&path, svg) {
            Ok(()) => self.written += 1,
            Err(e) => {
                self.failed += 1;
                warn!(path = %path.display(), error = %e, "failed to write overlay");
            }
        }
    }
}
