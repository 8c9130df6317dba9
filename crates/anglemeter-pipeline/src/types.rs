//! Shared types for the anglemeter measurement pipeline.

use std::fmt;
use std::ops::{Neg, Sub};

use serde::{Deserialize, Serialize};

use crate::angle::AngleError;
use crate::fit::FitError;

/// Vectors shorter than this are treated as zero-length.
pub const NORMAL_EPSILON: f64 = 1e-9;

/// A 2D point in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// The point reached by moving `t` units along `v` from `self`.
    #[must_use]
    pub fn offset(self, v: Vector, t: f64) -> Self {
        Self::new(v.x.mul_add(t, self.x), v.y.mul_add(t, self.y))
    }
}

impl Sub for Point {
    type Output = Vector;

    fn sub(self, rhs: Self) -> Vector {
        Vector::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// A 2D direction or displacement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    pub x: f64,
    pub y: f64,
}

impl Vector {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn dot(self, other: Self) -> f64 {
        self.x.mul_add(other.x, self.y * other.y)
    }

    /// Euclidean length.
    #[must_use]
    pub fn norm(self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Unit vector in the same direction, or `None` when the length is
    /// below [`NORMAL_EPSILON`].
    #[must_use]
    pub fn normalized(self) -> Option<Self> {
        let n = self.norm();
        if n < NORMAL_EPSILON || !n.is_finite() {
            return None;
        }
        Some(Self::new(self.x / n, self.y / n))
    }

    /// The vector rotated a quarter turn: `(-y, x)`.
    #[must_use]
    pub const fn perpendicular(self) -> Self {
        Self::new(-self.y, self.x)
    }
}

impl Neg for Vector {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

/// A line given by a unit normal and one point lying on it.
///
/// The reference point is not unique: any point `p` with
/// `normal · (p - reference) == 0` describes the same line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineModel {
    /// Unit normal. Models built through [`LineModel::new`] always have
    /// unit length; a hand-assembled model may not.
    pub normal: Vector,
    /// A point on the line.
    pub reference: Point,
}

impl LineModel {
    /// Build a model, normalizing `normal`.
    ///
    /// Returns `None` when `normal` has (near) zero length.
    #[must_use]
    pub fn new(normal: Vector, reference: Point) -> Option<Self> {
        Some(Self {
            normal: normal.normalized()?,
            reference,
        })
    }

    /// The line through two points, with `a` as reference.
    ///
    /// Returns `None` when the points coincide.
    #[must_use]
    pub fn through(a: Point, b: Point) -> Option<Self> {
        Self::new((b - a).perpendicular(), a)
    }

    /// Unit tangent `(n.y, -n.x)`.
    #[must_use]
    pub const fn direction(&self) -> Vector {
        Vector::new(self.normal.y, -self.normal.x)
    }

    /// Signed perpendicular distance from `p` to the line.
    #[must_use]
    pub fn signed_distance(&self, p: Point) -> f64 {
        self.normal.dot(p - self.reference)
    }

    /// Perpendicular distance from `p` to the line.
    #[must_use]
    pub fn distance(&self, p: Point) -> f64 {
        self.signed_distance(p).abs()
    }

    /// Endpoints of a drawable segment centered on the reference point.
    #[must_use]
    pub fn segment_through(&self, half_length: f64) -> (Point, Point) {
        let d = self.direction();
        (
            self.reference.offset(d, -half_length),
            self.reference.offset(d, half_length),
        )
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Per-frame orientation code reported by the upstream detector.
///
/// Negative codes mean the detector saw the object mirrored relative to
/// its reference labeling; zero and positive codes mean it did not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrientationCode(pub i32);

impl OrientationCode {
    #[must_use]
    pub const fn is_mirrored(self) -> bool {
        self.0 < 0
    }
}

impl From<i32> for OrientationCode {
    fn from(code: i32) -> Self {
        Self(code)
    }
}

impl fmt::Display for OrientationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An sRGB color used for overlay rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLUE: Self = Self::new(0, 0, 255);
    pub const GREEN: Self = Self::new(0, 255, 0);
    pub const RED: Self = Self::new(255, 0, 0);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// CSS hex notation, e.g. `#00ff00`.
    #[must_use]
    pub fn hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// One measured line role: which point set it consumes (its position in
/// the role list) and how it is drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineRole {
    /// Short label shown next to the angle, e.g. `Line1`.
    pub label: String,
    /// Overlay color for the line, reference marker and label.
    pub color: Color,
    /// Where the angle label is anchored in the overlay.
    pub label_anchor: Point,
}

impl LineRole {
    #[must_use]
    pub fn new(label: impl Into<String>, color: Color, label_anchor: Point) -> Self {
        Self {
            label: label.into(),
            color,
            label_anchor,
        }
    }

    /// The two roles measured by default: `Line1` and `Line2`.
    #[must_use]
    pub fn default_roles() -> Vec<Self> {
        vec![
            Self::new("Line1", Color::BLUE, Point::new(10.0, 30.0)),
            Self::new("Line2", Color::GREEN, Point::new(10.0, 60.0)),
        ]
    }
}

/// RANSAC tuning parameters, constant for a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    /// Maximum perpendicular distance (pixels) for a point to count as
    /// an inlier.
    pub inlier_threshold: f64,
    /// Upper bound on sampling iterations.
    pub max_iterations: usize,
    /// Sampling stops once the best candidate explains at least this
    /// fraction of the points.
    pub target_inlier_fraction: f64,
}

impl RansacConfig {
    pub const DEFAULT_INLIER_THRESHOLD: f64 = 1.5;
    pub const DEFAULT_MAX_ITERATIONS: usize = 5000;
    pub const DEFAULT_TARGET_INLIER_FRACTION: f64 = 0.9;

    #[must_use]
    pub const fn with_inlier_threshold(mut self, threshold: f64) -> Self {
        self.inlier_threshold = threshold;
        self
    }

    #[must_use]
    pub const fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    #[must_use]
    pub const fn with_target_inlier_fraction(mut self, fraction: f64) -> Self {
        self.target_inlier_fraction = fraction;
        self
    }
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            inlier_threshold: Self::DEFAULT_INLIER_THRESHOLD,
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
            target_inlier_fraction: Self::DEFAULT_TARGET_INLIER_FRACTION,
        }
    }
}

/// Configuration for a measurement run.
///
/// Everything here is fixed at startup. Use [`MeasureConfig::validate`]
/// before handing a deserialized config to the pipeline;
/// [`FramePipeline::new`](crate::FramePipeline::new) calls it too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasureConfig {
    /// Frame size passed to the detector and the angle calculator.
    pub dimensions: Dimensions,
    /// Line fitter tuning.
    pub ransac: RansacConfig,
    /// RNG seed for the line fitter. `None` seeds from entropy.
    pub seed: Option<u64>,
    /// Measured line roles, in point-set order.
    pub roles: Vec<LineRole>,
    /// Half length (pixels) of the overlay segment drawn for each line.
    pub overlay_half_length: f64,
}

impl MeasureConfig {
    pub const DEFAULT_WIDTH: u32 = 640;
    pub const DEFAULT_HEIGHT: u32 = 480;
    pub const DEFAULT_OVERLAY_HALF_LENGTH: f64 = 2000.0;

    /// Check the invariants the pipeline relies on.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first
    /// offending field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.dimensions.width == 0 || self.dimensions.height == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "image dimensions must be non-zero, got {}x{}",
                self.dimensions.width, self.dimensions.height
            )));
        }
        if !(self.ransac.inlier_threshold > 0.0 && self.ransac.inlier_threshold.is_finite()) {
            return Err(PipelineError::InvalidConfig(format!(
                "inlier_threshold must be positive and finite, got {}",
                self.ransac.inlier_threshold
            )));
        }
        if self.ransac.max_iterations == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_iterations must be at least 1".to_owned(),
            ));
        }
        let fraction = self.ransac.target_inlier_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "target_inlier_fraction must be in (0, 1], got {fraction}"
            )));
        }
        if self.roles.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "at least one line role is required".to_owned(),
            ));
        }
        if !(self.overlay_half_length >= 0.0 && self.overlay_half_length.is_finite()) {
            return Err(PipelineError::InvalidConfig(format!(
                "overlay_half_length must be non-negative and finite, got {}",
                self.overlay_half_length
            )));
        }
        Ok(())
    }
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            dimensions: Dimensions {
                width: Self::DEFAULT_WIDTH,
                height: Self::DEFAULT_HEIGHT,
            },
            ransac: RansacConfig::default(),
            seed: None,
            roles: LineRole::default_roles(),
            overlay_half_length: Self::DEFAULT_OVERLAY_HALF_LENGTH,
        }
    }
}

/// Angle logged for a role whose measurement failed.
pub const ANGLE_SENTINEL: f64 = 0.0;

/// Outcome of one fit-then-measure cycle for one line role.
#[derive(Debug, Clone, PartialEq)]
pub enum FitResult {
    /// A line was fitted and its angle computed.
    Measured {
        model: LineModel,
        /// Angle in degrees.
        angle: f64,
        /// Number of inliers supporting the model.
        inliers: usize,
    },
    /// No usable line this frame.
    Failed(RoleFailure),
}

impl FitResult {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Measured { .. })
    }

    #[must_use]
    pub const fn model(&self) -> Option<&LineModel> {
        match self {
            Self::Measured { model, .. } => Some(model),
            Self::Failed(_) => None,
        }
    }

    #[must_use]
    pub const fn angle(&self) -> Option<f64> {
        match self {
            Self::Measured { angle, .. } => Some(*angle),
            Self::Failed(_) => None,
        }
    }

    /// The measured angle, or [`ANGLE_SENTINEL`] on failure.
    #[must_use]
    pub fn angle_or_sentinel(&self) -> f64 {
        self.angle().unwrap_or(ANGLE_SENTINEL)
    }
}

/// Why a role produced no angle this frame.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoleFailure {
    /// The fitter found no line. Expected whenever the edge is not
    /// visible.
    #[error(transparent)]
    Fit(#[from] FitError),

    /// The angle calculator was handed a model it cannot measure.
    /// This is a caller bug, not a missing edge.
    #[error("logic error: {0}")]
    Logic(#[from] AngleError),
}

impl RoleFailure {
    #[must_use]
    pub const fn is_logic_error(&self) -> bool {
        matches!(self, Self::Logic(_))
    }
}

/// One row of the persisted angle log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Zero-based frame counter, strictly increasing.
    pub frame_index: u64,
    /// One angle per configured role, in role order. Failed roles hold
    /// [`ANGLE_SENTINEL`].
    pub angles: Vec<f64>,
    /// Wall time spent measuring this frame, in milliseconds.
    pub compute_ms: f64,
}

impl FrameRecord {
    /// Angle of the role at `role` (zero-based), or the sentinel when
    /// there is no such role.
    #[must_use]
    pub fn angle(&self, role: usize) -> f64 {
        self.angles.get(role).copied().unwrap_or(ANGLE_SENTINEL)
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// The frame source is exhausted. This is the normal ending.
    EndOfInput,
    /// An external stop signal was observed between frames.
    StopRequested,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfInput => f.write_str("end of input"),
            Self::StopRequested => f.write_str("stop requested"),
        }
    }
}

/// Errors that end a measurement run.
///
/// Per-role fit failures are not errors at this level; they are
/// recorded as [`FitResult::Failed`] and the run continues.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Run configuration is invalid.
    #[error("invalid measurement configuration: {0}")]
    InvalidConfig(String),

    /// Writing or flushing the angle log failed. Fatal for the run.
    #[error("failed to persist frame records: {0}")]
    Persistence(#[from] std::io::Error),
}
