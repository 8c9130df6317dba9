//! Detector that replays recorded detector output.
//!
//! A capture is a sequence of [`CapturedFrame`]s, each holding the
//! orientation code and per-role point sets a live detector produced for
//! one video frame. Replaying a capture drives the pipeline exactly as
//! the live detector would, which makes runs reproducible and lets the
//! measurement cost be benchmarked without video decoding.
//!
//! Frames recorded without an orientation code inherit the last known
//! one through [`ReplayState`], the same way a live detector keeps its
//! classification stable across frames where the object is ambiguous.

use serde::{Deserialize, Serialize};

use crate::detector::Detector;
use crate::types::{Dimensions, OrientationCode, Point};

/// Detector output recorded for one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapturedFrame {
    /// Orientation code, if the detector reported one.
    #[serde(default)]
    pub dir: Option<i32>,
    /// Candidate points per line role, already partitioned.
    #[serde(default)]
    pub point_sets: Vec<Vec<Point>>,
}

/// Temporal context of a [`ReplayDetector`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayState {
    /// Orientation used for the most recent frame.
    pub last_orientation: OrientationCode,
    /// Frames scanned so far.
    pub frames_scanned: u64,
}

/// [`Detector`] over [`CapturedFrame`]s.
///
/// Points outside the configured frame are discarded, as a live detector
/// would never report them.
#[derive(Debug, Default)]
pub struct ReplayDetector {
    size: Option<Dimensions>,
    state: ReplayState,
    selected: Vec<Vec<Point>>,
}

impl ReplayDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn in_frame(&self, p: Point) -> bool {
        self.size.is_none_or(|size| {
            p.x >= 0.0
                && p.y >= 0.0
                && p.x < f64::from(size.width)
                && p.y < f64::from(size.height)
        })
    }
}

impl Detector for ReplayDetector {
    type Image = CapturedFrame;
    type State = ReplayState;

    fn configure(&mut self, size: Dimensions) {
        self.size = Some(size);
    }

    fn restore_state(&mut self, state: &ReplayState) {
        self.state = state.clone();
        self.selected.clear();
    }

    fn scan(&mut self, image: &CapturedFrame) -> OrientationCode {
        let dir = image
            .dir
            .map_or(self.state.last_orientation, OrientationCode);
        self.state.last_orientation = dir;
        self.state.frames_scanned += 1;

        self.selected = image
            .point_sets
            .iter()
            .map(|set| set.iter().copied().filter(|p| self.in_frame(*p)).collect())
            .collect();
        dir
    }

    fn select_points(&mut self, _dir: OrientationCode) -> Vec<Vec<Point>> {
        std::mem::take(&mut self.selected)
    }

    fn save_state(&self) -> ReplayState {
        self.state.clone()
    }
}
