//! Run diagnostics: per-role success counts and compute latency.
//!
//! [`RunDiagnostics`] is filled in by [`FramePipeline::run`] as frames
//! are processed and returned when the run ends. It is permanent
//! instrumentation for tuning RANSAC parameters and comparing captures.
//!
//! Latency is measured through the [`Clock`] trait so tests can drive
//! time by hand. [`StdClock`] uses `web_time::Instant`, which is
//! `std::time::Instant` on native targets and `performance.now()` on
//! WASM.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.
//!
//! [`FramePipeline::run`]: crate::FramePipeline::run

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::FrameOutcome;
use crate::types::{FitResult, LineRole, RoleFailure, Termination};

/// Monotonic time source for the per-frame stopwatch.
pub trait Clock {
    type Instant;

    fn now(&self) -> Self::Instant;

    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] implementation backed by [`web_time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StdClock;

impl Clock for StdClock {
    type Instant = web_time::Instant;

    fn now(&self) -> web_time::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &web_time::Instant) -> Duration {
        since.elapsed()
    }
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected over one measurement run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDiagnostics {
    /// Frames processed (and records written).
    pub frames: u64,
    /// One entry per configured role, in role order.
    pub roles: Vec<RoleDiagnostics>,
    /// Sum of all per-frame compute durations (seconds).
    #[serde(with = "duration_serde")]
    pub total_compute: Duration,
    /// Shortest per-frame compute time in milliseconds.
    pub min_compute_ms: Option<f64>,
    /// Longest per-frame compute time in milliseconds.
    pub max_compute_ms: Option<f64>,
    /// Why the run ended. `None` while still running.
    pub termination: Option<Termination>,
}

/// Outcome counts for one line role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDiagnostics {
    pub label: String,
    /// Frames with a measured angle.
    pub measured: u64,
    /// Frames where no line was found.
    pub missed: u64,
    /// Frames where the angle calculator rejected the model.
    pub logic_errors: u64,
}

impl RunDiagnostics {
    /// Empty diagnostics for a run over `roles`.
    #[must_use]
    pub fn new(roles: &[LineRole]) -> Self {
        Self {
            frames: 0,
            roles: roles
                .iter()
                .map(|role| RoleDiagnostics {
                    label: role.label.clone(),
                    measured: 0,
                    missed: 0,
                    logic_errors: 0,
                })
                .collect(),
            total_compute: Duration::ZERO,
            min_compute_ms: None,
            max_compute_ms: None,
            termination: None,
        }
    }

    /// Fold one processed frame into the totals.
    pub fn record(&mut self, outcome: &FrameOutcome) {
        self.frames += 1;
        self.total_compute += outcome.compute;

        let ms = duration_ms(outcome.compute);
        self.min_compute_ms = Some(self.min_compute_ms.map_or(ms, |m| m.min(ms)));
        self.max_compute_ms = Some(self.max_compute_ms.map_or(ms, |m| m.max(ms)));

        for (role, result) in self.roles.iter_mut().zip(&outcome.results) {
            match result {
                FitResult::Measured { .. } => role.measured += 1,
                FitResult::Failed(RoleFailure::Fit(_)) => role.missed += 1,
                FitResult::Failed(RoleFailure::Logic(_)) => role.logic_errors += 1,
            }
        }
    }

    /// Mean per-frame compute time in milliseconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_compute_ms(&self) -> Option<f64> {
        (self.frames > 0).then(|| duration_ms(self.total_compute) / self.frames as f64)
    }

    /// Human-readable multi-line summary.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Measurement Run Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Frames: {}  |  Ended: {}",
            self.frames,
            self.termination
                .map_or_else(|| "running".to_owned(), |t| t.to_string()),
        ));
        match (self.min_compute_ms, self.mean_compute_ms(), self.max_compute_ms) {
            (Some(min), Some(mean), Some(max)) => lines.push(format!(
                "Compute: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms"
            )),
            _ => lines.push("Compute: no frames".to_owned()),
        }
        lines.push(String::new());

        lines.push(format!(
            "{:<16} {:>10} {:>10} {:>12} {:>9}",
            "Role", "Measured", "Missed", "Logic errs", "Hit %"
        ));
        lines.push("-".repeat(60));
        for role in &self.roles {
            #[allow(clippy::cast_precision_loss)]
            let hit = if self.frames > 0 {
                role.measured as f64 / self.frames as f64 * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "{:<16} {:>10} {:>10} {:>12} {:>8.1}%",
                role.label, role.measured, role.missed, role.logic_errors, hit
            ));
        }

        lines.join("\n")
    }
}

/// Milliseconds as `f64`, the unit of the `compute_ms` log column.
#[must_use]
pub fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
