//! Angle of a fitted line relative to the image.
//!
//! ## Convention
//!
//! - Angles are in degrees, counter-clockwise as seen on screen. Image
//!   `y` grows downward, so the `y` component is negated before
//!   measuring.
//! - The reference axis is the image's longer axis: horizontal for
//!   landscape and square frames, vertical for portrait frames.
//! - The base angle is the line's tangent angle from the reference axis,
//!   wrapped into `[-90, 90)`. A line has no direction, so `n` and `-n`
//!   give the same value.
//! - A mirrored orientation code ([`OrientationCode::is_mirrored`])
//!   reflects the base angle: `wrap(-base)`. For identical geometry,
//!   frames with codes `d >= 0` and `-d < 0` therefore report angles of
//!   opposite sign, except at the branch cut `-90`, which maps to itself.

use crate::types::{Dimensions, LineModel, OrientationCode, Vector};

/// The angle calculator was called with a model it cannot measure.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum AngleError {
    /// The model's normal has (near) zero length. Only models from a
    /// successful fit may be measured.
    #[error("line normal has near-zero length ({magnitude})")]
    DegenerateInput { magnitude: f64 },
}

/// Axis from which angles are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceAxis {
    Horizontal,
    Vertical,
}

impl ReferenceAxis {
    /// The longer axis of an image of `size`.
    #[must_use]
    pub const fn for_image(size: Dimensions) -> Self {
        if size.height > size.width {
            Self::Vertical
        } else {
            Self::Horizontal
        }
    }
}

/// Signed angle of `model` in degrees, in `[-90, 90)`.
///
/// # Errors
///
/// Returns [`AngleError::DegenerateInput`] when the normal has (near)
/// zero length.
pub fn line_angle(
    model: &LineModel,
    dir: OrientationCode,
    image_size: Dimensions,
) -> Result<f64, AngleError> {
    let Some(normal) = model.normal.normalized() else {
        return Err(AngleError::DegenerateInput {
            magnitude: model.normal.norm(),
        });
    };

    // Tangent (n.y, -n.x) with the y axis flipped to point up.
    let tangent = Vector::new(normal.y, normal.x);
    let from_horizontal = tangent.y.atan2(tangent.x).to_degrees();
    let from_axis = match ReferenceAxis::for_image(image_size) {
        ReferenceAxis::Horizontal => from_horizontal,
        ReferenceAxis::Vertical => from_horizontal - 90.0,
    };

    let base = wrap_half_turn(from_axis);
    Ok(if dir.is_mirrored() {
        wrap_half_turn(-base)
    } else {
        base
    })
}

/// Wrap an angle in degrees into `[-90, 90)`.
#[must_use]
pub fn wrap_half_turn(degrees: f64) -> f64 {
    let wrapped = (degrees + 90.0).rem_euclid(180.0) - 90.0;
    // rem_euclid rounds up to exactly 180 for inputs a hair below -90.
    if wrapped >= 90.0 { -90.0 } else { wrapped }
}
