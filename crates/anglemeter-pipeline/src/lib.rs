//! anglemeter-pipeline: robust line fitting and angle measurement (sans-IO).
//!
//! Measures, frame by frame, the orientation of one or more linear edges
//! reported by an upstream point detector:
//!
//! restore detector state -> scan -> select points ->
//! (RANSAC line fit -> angle) per line role -> frame record.
//!
//! This crate has **no I/O dependencies**. Frames come from any iterator,
//! records go to any [`RecordSink`], overlays to any
//! [`OverlayRenderer`](overlay::OverlayRenderer). File formats live in
//! `anglemeter-export`, and the command-line driver in `anglemeter-bench`.

pub mod angle;
pub mod detector;
pub mod diagnostics;
pub mod fit;
pub mod overlay;
pub mod pipeline;
pub mod prefetch;
pub mod replay;
pub mod types;

pub use angle::{AngleError, line_angle};
pub use detector::Detector;
pub use diagnostics::{Clock, RunDiagnostics, StdClock};
pub use fit::{FitError, LineFit, LineFitter, fit_line};
pub use pipeline::{
    FrameOutcome, FramePipeline, NeverStop, Phase, RecordSink, StopSignal, measure_line,
};
pub use types::{
    ANGLE_SENTINEL, Color, Dimensions, FitResult, FrameRecord, LineModel, LineRole, MeasureConfig,
    OrientationCode, PipelineError, Point, RansacConfig, RoleFailure, Termination, Vector,
};
