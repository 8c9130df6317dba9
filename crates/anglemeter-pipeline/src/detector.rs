//! Contract for the upstream point detector.
//!
//! The detector turns a frame into an orientation code and one candidate
//! point set per line role. How it does so is out of scope here; the
//! pipeline relies only on this trait and on the call order:
//!
//! 1. [`configure`](Detector::configure) once, at pipeline construction.
//! 2. Per frame, exactly once each and in this order:
//!    [`restore_state`](Detector::restore_state),
//!    [`scan`](Detector::scan),
//!    [`select_points`](Detector::select_points),
//!    [`save_state`](Detector::save_state).
//! 3. [`shutdown`](Detector::shutdown) once, when the run ends.
//!
//! Step 3 happens only through `FramePipeline::run` or
//! `FramePipeline::shutdown`. A pipeline that is dropped without either
//! never calls it, so detectors holding OS resources should also release
//! them in `Drop`.
//!
//! The detector's temporal state is handed to the pipeline after every
//! frame and handed back before the next one, so the pipeline owns it
//! between frames and frame N always restores what frame N-1 saved.

use std::fmt;

use crate::types::{Dimensions, OrientationCode, Point};

/// An upstream detector context.
pub trait Detector {
    /// Decoded frame type the detector scans.
    type Image;

    /// Temporal context carried between frames.
    type State: Clone + Default + fmt::Debug;

    /// Set the frame size. Called once before the first frame.
    fn configure(&mut self, size: Dimensions);

    /// Load the state saved after the previous frame.
    fn restore_state(&mut self, state: &Self::State);

    /// Process `image` and report its orientation code.
    fn scan(&mut self, image: &Self::Image) -> OrientationCode;

    /// Candidate points for each line role, in role order.
    ///
    /// Missing trailing sets are treated as empty.
    fn select_points(&mut self, dir: OrientationCode) -> Vec<Vec<Point>>;

    /// Snapshot the state to carry into the next frame.
    fn save_state(&self) -> Self::State;

    /// Release detector resources. Called once when the run ends.
    ///
    /// Not called if the owning pipeline is dropped without being shut
    /// down.
    fn shutdown(&mut self) {}
}
