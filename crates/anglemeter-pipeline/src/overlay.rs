//! Overlay geometry handed to the rendering collaborator.
//!
//! The pipeline does not draw. After each frame it builds a
//! [`FrameOverlay`] describing what to draw (a long segment through each
//! fitted line, a marker at its reference point, and an angle label) and
//! passes it to an [`OverlayRenderer`], if one is attached. Rendering
//! runs outside the measured interval.

use serde::{Deserialize, Serialize};

use crate::types::{Color, FitResult, LineRole, Point};

/// Everything to draw for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameOverlay {
    pub frame_index: u64,
    /// One entry per role, in role order.
    pub roles: Vec<RoleOverlay>,
}

/// Overlay for one line role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleOverlay {
    pub label: String,
    pub color: Color,
    pub label_anchor: Point,
    /// `None` when the role was not measured this frame.
    pub line: Option<OverlayLine>,
}

/// A measured line, ready to draw.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayLine {
    pub start: Point,
    pub end: Point,
    pub reference: Point,
    /// Angle in degrees.
    pub angle: f64,
}

impl RoleOverlay {
    /// Build the overlay for one role's result.
    #[must_use]
    pub fn new(role: &LineRole, result: &FitResult, half_length: f64) -> Self {
        let line = match result {
            FitResult::Measured { model, angle, .. } => {
                let (start, end) = model.segment_through(half_length);
                Some(OverlayLine {
                    start,
                    end,
                    reference: model.reference,
                    angle: *angle,
                })
            }
            FitResult::Failed(_) => None,
        };
        Self {
            label: role.label.clone(),
            color: role.color,
            label_anchor: role.label_anchor,
            line,
        }
    }

    /// Label text, e.g. `Line1: 12.500000`. `None` when unmeasured.
    #[must_use]
    pub fn caption(&self) -> Option<String> {
        self.line
            .map(|line| format!("{}: {:.6}", self.label, line.angle))
    }
}

/// Receives one overlay per processed frame.
pub trait OverlayRenderer {
    fn render(&mut self, overlay: &FrameOverlay);
}

impl OverlayRenderer for Vec<FrameOverlay> {
    fn render(&mut self, overlay: &FrameOverlay) {
        self.push(overlay.clone());
    }
}
