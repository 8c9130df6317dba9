//! RANSAC line fitting with a total-least-squares refinement.
//!
//! Sampling draws two distinct points per iteration, builds the line
//! through them, and scores it by the number of points within
//! [`RansacConfig::inlier_threshold`]. The best-scoring candidate's
//! inliers are then refit with orthogonal regression (eigenvector of the
//! 2x2 covariance matrix), which removes the noise of the two-point
//! sample.
//!
//! Randomness is injected: [`fit_line`] takes any [`rand::Rng`], and
//! [`LineFitter`] owns a seedable [`StdRng`]. For exactly collinear
//! input every valid sample produces the same inlier set, so the refined
//! line does not depend on the seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::{LineModel, Point, RansacConfig, Vector};

/// Fewest points from which a line can be determined.
pub const MIN_POINTS: usize = 2;

/// Fewest inliers for the best candidate to be accepted.
pub const MIN_VIABLE_INLIERS: usize = 2;

/// Why no line could be fitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FitError {
    /// Fewer than [`MIN_POINTS`] candidate points.
    #[error("need at least {required} points to fit a line, got {actual}")]
    InsufficientPoints { required: usize, actual: usize },

    /// No sampled candidate gathered [`MIN_VIABLE_INLIERS`] inliers
    /// (for example, every point sits at the same coordinates).
    #[error("best line candidate has {inliers} inliers, need at least {required}")]
    Degenerate { inliers: usize, required: usize },
}

/// A successful fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    /// Refined line with a unit, canonically signed normal.
    pub model: LineModel,
    /// Inlier count of the best sampled candidate.
    pub inliers: usize,
    /// Sampling iterations actually run.
    pub iterations: usize,
}

/// Fit a line to `points` using RANSAC.
///
/// # Errors
///
/// Returns [`FitError::InsufficientPoints`] for fewer than two points and
/// [`FitError::Degenerate`] when no candidate reaches
/// [`MIN_VIABLE_INLIERS`]. Both are ordinary outcomes (no edge visible).
pub fn fit_line<R: Rng + ?Sized>(
    points: &[Point],
    config: &RansacConfig,
    rng: &mut R,
) -> Result<LineFit, FitError> {
    let n = points.len();
    if n < MIN_POINTS {
        return Err(FitError::InsufficientPoints {
            required: MIN_POINTS,
            actual: n,
        });
    }

    let threshold = config.inlier_threshold;
    let target = target_inlier_count(n, config.target_inlier_fraction);

    let mut best: Option<(LineModel, usize)> = None;
    let mut iterations = 0;

    for _ in 0..config.max_iterations {
        iterations += 1;

        // Two distinct indices: draw the second from the n - 1 others.
        let i = rng.gen_range(0..n);
        let mut j = rng.gen_range(0..n - 1);
        if j >= i {
            j += 1;
        }

        // Coincident samples span no line.
        let Some(candidate) = LineModel::through(points[i], points[j]) else {
            continue;
        };

        let count = count_inliers(points, &candidate, threshold);
        if best.is_none_or(|(_, best_count)| count > best_count) {
            best = Some((candidate, count));
            if count >= target {
                break;
            }
        }
    }

    let (candidate, inliers) = match best {
        Some((candidate, count)) if count >= MIN_VIABLE_INLIERS => (candidate, count),
        other => {
            return Err(FitError::Degenerate {
                inliers: other.map_or(0, |(_, count)| count),
                required: MIN_VIABLE_INLIERS,
            });
        }
    };

    let support: Vec<Point> = points
        .iter()
        .copied()
        .filter(|p| candidate.distance(*p) <= threshold)
        .collect();
    let model = refine_line(&support).unwrap_or(candidate);

    Ok(LineFit {
        model: canonical_sign(model),
        inliers,
        iterations,
    })
}

/// Total-least-squares line through `points`.
///
/// The normal is the eigenvector of the smallest eigenvalue of the
/// scatter matrix; the reference point is the centroid. Returns `None`
/// for fewer than two points or when all points coincide.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn refine_line(points: &[Point]) -> Option<LineModel> {
    if points.len() < MIN_POINTS {
        return None;
    }

    let n = points.len() as f64;
    let (sum_x, sum_y) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let centroid = Point::new(sum_x / n, sum_y / n);

    // Scatter = | sxx  sxy |
    //           | sxy  syy |
    let (sxx, syy, sxy) = points.iter().fold((0.0, 0.0, 0.0), |(xx, yy, xy), p| {
        let dx = p.x - centroid.x;
        let dy = p.y - centroid.y;
        (dx.mul_add(dx, xx), dy.mul_add(dy, yy), dx.mul_add(dy, xy))
    });

    if sxx + syy < f64::EPSILON {
        return None;
    }

    // Major-axis angle of the scatter ellipse.
    let theta = 0.5 * (2.0 * sxy).atan2(sxx - syy);
    let normal = Vector::new(-theta.sin(), theta.cos());
    LineModel::new(normal, centroid)
}

/// Flip the normal so `y >= 0` (and `x >= 0` when `y == 0`).
fn canonical_sign(model: LineModel) -> LineModel {
    let n = model.normal;
    if n.y < 0.0 || (n.y == 0.0 && n.x < 0.0) {
        LineModel {
            normal: -n,
            ..model
        }
    } else {
        model
    }
}

fn count_inliers(points: &[Point], line: &LineModel, threshold: f64) -> usize {
    points
        .iter()
        .filter(|p| line.distance(**p) <= threshold)
        .count()
}

/// Inlier count at which sampling may stop early.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
// Point counts stay far below 2^52, and the fraction is in (0, 1].
fn target_inlier_count(n: usize, fraction: f64) -> usize {
    let target = (n as f64 * fraction).ceil();
    (target.max(1.0) as usize).min(n)
}

/// Line fitter owning its configuration and random source.
#[derive(Debug, Clone)]
pub struct LineFitter<R = StdRng> {
    config: RansacConfig,
    rng: R,
}

impl LineFitter<StdRng> {
    /// Fitter seeded from OS entropy.
    #[must_use]
    pub fn new(config: RansacConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Fitter with a reproducible sampling sequence.
    #[must_use]
    pub fn with_seed(config: RansacConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> LineFitter<R> {
    #[must_use]
    pub const fn with_rng(config: RansacConfig, rng: R) -> Self {
        Self { config, rng }
    }

    #[must_use]
    pub const fn config(&self) -> &RansacConfig {
        &self.config
    }

    /// Fit one point set. See [`fit_line`].
    ///
    /// # Errors
    ///
    /// Same as [`fit_line`].
    pub fn fit(&mut self, points: &[Point]) -> Result<LineFit, FitError> {
        fit_line(points, &self.config, &mut self.rng)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cross(a: Vector, b: Vector) -> f64 {
        a.x.mul_add(b.y, -(a.y * b.x))
    }

    /// `count` points spaced `step` apart along the line through `origin`
    /// with direction angle `angle` (radians).
    fn points_on_line(origin: Point, angle: f64, count: usize, step: f64) -> Vec<Point> {
        let dir = Vector::new(angle.cos(), angle.sin());
        (0..count)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let t = i as f64 * step;
                origin.offset(dir, t)
            })
            .collect()
    }

    #[test]
    fn empty_input_is_insufficient() {
        let mut fitter = LineFitter::with_seed(RansacConfig::default(), 1);
        assert_eq!(
            fitter.fit(&[]),
            Err(FitError::InsufficientPoints {
                required: 2,
                actual: 0
            })
        );
    }

    #[test]
    fn single_point_is_insufficient() {
        let mut fitter = LineFitter::with_seed(RansacConfig::default(), 1);
        let result = fitter.fit(&[Point::new(3.0, 4.0)]);
        assert!(matches!(
            result,
            Err(FitError::InsufficientPoints { actual: 1, .. })
        ));
    }

    #[test]
    fn coincident_points_are_degenerate() {
        let config = RansacConfig::default().with_max_iterations(50);
        let mut fitter = LineFitter::with_seed(config, 1);
        let points = vec![Point::new(5.0, 5.0); 10];
        assert_eq!(
            fitter.fit(&points),
            Err(FitError::Degenerate {
                inliers: 0,
                required: 2
            })
        );
    }

    #[test]
    fn two_points_fit_exactly() {
        let mut fitter = LineFitter::with_seed(RansacConfig::default(), 9);
        let fit = fitter
            .fit(&[Point::new(0.0, 0.0), Point::new(10.0, 10.0)])
            .unwrap();
        assert_eq!(fit.inliers, 2);
        let expected = Vector::new(-1.0, 1.0).normalized().unwrap();
        assert!(cross(fit.model.normal, expected).abs() < 1e-9);
    }

    #[test]
    fn horizontal_line_has_vertical_normal() {
        let points = points_on_line(Point::new(20.0, 100.0), 0.0, 40, 5.0);
        let mut fitter = LineFitter::with_seed(RansacConfig::default(), 3);
        let fit = fitter.fit(&points).unwrap();
        assert!((fit.model.normal.y - 1.0).abs() < 1e-9);
        assert!(fit.model.distance(Point::new(0.0, 100.0)) < 1e-9);
    }

    #[test]
    fn vertical_line_normal_is_canonical() {
        let points = points_on_line(Point::new(50.0, 0.0), std::f64::consts::FRAC_PI_2, 30, 4.0);
        let mut fitter = LineFitter::with_seed(RansacConfig::default(), 3);
        let fit = fitter.fit(&points).unwrap();
        assert!(fit.model.normal.x.abs() > 1.0 - 1e-9);
        assert!(fit.model.normal.y >= 0.0);
        assert!(fit.model.distance(Point::new(50.0, 400.0)) < 1e-6);
    }

    #[test]
    fn collinear_input_stops_after_first_valid_sample() {
        let points = points_on_line(Point::new(0.0, 0.0), 0.3, 50, 2.0);
        let mut fitter = LineFitter::with_seed(RansacConfig::default(), 11);
        let fit = fitter.fit(&points).unwrap();
        assert_eq!(fit.inliers, 50);
        assert_eq!(fit.iterations, 1);
    }

    #[test]
    fn recovers_line_among_far_outliers() {
        // 90 points on y = 0.5x + 10, 10 outliers far below it.
        let mut points: Vec<Point> = (0..90)
            .map(|i| {
                let x = f64::from(i) * 4.0;
                Point::new(x, 0.5f64.mul_add(x, 10.0))
            })
            .collect();
        points.extend((0..10).map(|i| Point::new(f64::from(i) * 37.0, 900.0 - f64::from(i))));

        let config = RansacConfig::default();
        let mut fitter = LineFitter::with_seed(config, 42);
        let fit = fitter.fit(&points).unwrap();

        assert_eq!(fit.inliers, 90);
        for p in &points[..90] {
            assert!(fit.model.distance(*p) <= config.inlier_threshold);
        }
        for p in &points[90..] {
            assert!(fit.model.distance(*p) > config.inlier_threshold);
        }
        let truth = Vector::new(-0.5, 1.0).normalized().unwrap();
        assert!(cross(fit.model.normal, truth).abs() < 1e-6);
    }

    #[test]
    fn refinement_averages_out_noise() {
        // Alternating +/-0.4 px jitter around y = 200.
        let points: Vec<Point> = (0..60)
            .map(|i| {
                let jitter = if i % 2 == 0 { 0.4 } else { -0.4 };
                Point::new(f64::from(i) * 5.0, 200.0 + jitter)
            })
            .collect();
        let mut fitter = LineFitter::with_seed(RansacConfig::default(), 5);
        let fit = fitter.fit(&points).unwrap();
        assert!((fit.model.normal.y - 1.0).abs() < 1e-3);
        assert!((fit.model.reference.y - 200.0).abs() < 0.05);
    }

    #[test]
    fn refine_line_rejects_coincident_points() {
        let p = Point::new(1.0, 2.0);
        assert!(refine_line(&[p, p, p]).is_none());
        assert!(refine_line(&[p]).is_none());
    }

    #[test]
    fn same_seed_same_result() {
        let mut points = points_on_line(Point::new(10.0, 10.0), 1.1, 40, 3.0);
        points.push(Point::new(600.0, 20.0));
        points.push(Point::new(5.0, 470.0));
        let config = RansacConfig::default();
        let a = LineFitter::with_seed(config, 77).fit(&points).unwrap();
        let b = LineFitter::with_seed(config, 77).fit(&points).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn target_inlier_count_is_clamped() {
        assert_eq!(target_inlier_count(10, 0.9), 9);
        assert_eq!(target_inlier_count(10, 1.0), 10);
        assert_eq!(target_inlier_count(3, 0.01), 1);
    }

    proptest! {
        #[test]
        fn exact_fit_is_seed_independent(
            seed in any::<u64>(),
            angle in 0.0f64..std::f64::consts::PI,
            count in 2usize..60,
            ox in 0.0f64..640.0,
            oy in 0.0f64..480.0,
        ) {
            let points = points_on_line(Point::new(ox, oy), angle, count, 3.0);
            let truth = Vector::new(-angle.sin(), angle.cos());

            let fit = LineFitter::with_seed(RansacConfig::default(), seed)
                .fit(&points)
                .unwrap();
            prop_assert!(cross(fit.model.normal, truth).abs() < 1e-3);
            prop_assert!((fit.model.normal.norm() - 1.0).abs() < 1e-9);
            prop_assert_eq!(fit.inliers, count);

            let other = LineFitter::with_seed(RansacConfig::default(), seed.wrapping_add(1))
                .fit(&points)
                .unwrap();
            prop_assert!(cross(fit.model.normal, other.model.normal).abs() < 1e-9);
            prop_assert!(fit.model.distance(other.model.reference) < 1e-6);
        }
    }
}
