//! Frame pipeline: drives detector, line fitter and angle calculator
//! once per frame and emits one [`FrameRecord`] per frame.
//!
//! ```text
//! Init -> { RestoreState -> Scan -> SelectPoints -> FitLine(role)... -> Emit } -> Terminated
//! ```
//!
//! The stopwatch starts immediately before `RestoreState` and stops
//! immediately after the last `FitLine`, so frame acquisition, record
//! persistence and overlay rendering never count towards `compute_ms`.
//!
//! Roles are independent: a failed fit in one role records
//! [`ANGLE_SENTINEL`](crate::types::ANGLE_SENTINEL) for that role and
//! leaves the others untouched. The only error that ends a run is a
//! failure to persist records.
//!
//! ```rust
//! # use anglemeter_pipeline::{FrameRecord, FramePipeline, MeasureConfig, NeverStop, PipelineError};
//! # use anglemeter_pipeline::replay::{CapturedFrame, ReplayDetector};
//! # fn run(frames: Vec<CapturedFrame>) -> Result<(), PipelineError> {
//! let pipeline = FramePipeline::new(ReplayDetector::new(), MeasureConfig::default())?;
//! let mut records: Vec<FrameRecord> = Vec::new();
//! let diagnostics = pipeline.run(frames, &NeverStop, &mut records, None)?;
//! assert_eq!(diagnostics.frames as usize, records.len());
//! # Ok(())
//! # }
//! ```

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;
use rand::rngs::StdRng;
use tracing::{debug, error, info, trace};

use crate::angle::line_angle;
use crate::detector::Detector;
use crate::diagnostics::{Clock, RunDiagnostics, StdClock, duration_ms};
use crate::fit::{FitError, LineFit, LineFitter};
use crate::overlay::{FrameOverlay, OverlayRenderer, RoleOverlay};
use crate::types::{
    Dimensions, FitResult, FrameRecord, LineRole, MeasureConfig, OrientationCode, PipelineError,
    Point, RoleFailure, Termination,
};

/// External request to end a run, checked once per frame before the
/// next frame is acquired.
pub trait StopSignal {
    fn stop_requested(&self) -> bool;
}

impl StopSignal for AtomicBool {
    fn stop_requested(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

impl<T: StopSignal + ?Sized> StopSignal for Arc<T> {
    fn stop_requested(&self) -> bool {
        (**self).stop_requested()
    }
}

impl<T: StopSignal + ?Sized> StopSignal for &T {
    fn stop_requested(&self) -> bool {
        (**self).stop_requested()
    }
}

/// A [`StopSignal`] that never fires; runs end at end of input.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverStop;

impl StopSignal for NeverStop {
    fn stop_requested(&self) -> bool {
        false
    }
}

/// Append-only destination for frame records.
pub trait RecordSink {
    /// Persist one record.
    ///
    /// # Errors
    ///
    /// Any I/O failure. The pipeline treats it as fatal.
    fn append(&mut self, record: &FrameRecord) -> io::Result<()>;

    /// Make every appended record durable.
    ///
    /// # Errors
    ///
    /// Any I/O failure. The pipeline treats it as fatal.
    fn flush(&mut self) -> io::Result<()>;
}

impl RecordSink for Vec<FrameRecord> {
    fn append(&mut self, record: &FrameRecord) -> io::Result<()> {
        self.push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Where the pipeline is in its per-frame cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    RestoreState,
    Scan,
    SelectPoints,
    FitLine { role: usize },
    Emit,
    Terminated,
}

/// Everything produced by one frame cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutcome {
    /// The row to persist.
    pub record: FrameRecord,
    /// Orientation code reported by the detector.
    pub dir: OrientationCode,
    /// Measured compute time.
    pub compute: Duration,
    /// Per-role results, in role order.
    pub results: Vec<FitResult>,
}

/// Compose a fit outcome with the angle calculator.
#[must_use]
pub fn measure_line(
    fit: Result<LineFit, FitError>,
    dir: OrientationCode,
    image_size: Dimensions,
) -> FitResult {
    match fit {
        Ok(fit) => match line_angle(&fit.model, dir, image_size) {
            Ok(angle) => FitResult::Measured {
                model: fit.model,
                angle,
                inliers: fit.inliers,
            },
            Err(e) => FitResult::Failed(RoleFailure::Logic(e)),
        },
        Err(e) => FitResult::Failed(RoleFailure::Fit(e)),
    }
}

/// Per-frame orchestrator owning the detector context and its state.
pub struct FramePipeline<D: Detector, C = StdClock, R = StdRng> {
    detector: D,
    state: D::State,
    fitter: LineFitter<R>,
    clock: C,
    config: MeasureConfig,
    next_index: u64,
    phase: Phase,
}

impl<D: Detector> FramePipeline<D> {
    /// Validate `config`, configure `detector`, and create the fitter
    /// (seeded from `config.seed`, or from entropy).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `config` fails
    /// [`MeasureConfig::validate`].
    pub fn new(mut detector: D, config: MeasureConfig) -> Result<Self, PipelineError> {
        config.validate()?;

        let fitter = match config.seed {
            Some(seed) => LineFitter::with_seed(config.ransac, seed),
            None => LineFitter::new(config.ransac),
        };
        detector.configure(config.dimensions);

        info!(
            width = config.dimensions.width,
            height = config.dimensions.height,
            roles = config.roles.len(),
            seed = ?config.seed,
            "frame pipeline initialized"
        );

        Ok(Self {
            detector,
            state: D::State::default(),
            fitter,
            clock: StdClock,
            config,
            next_index: 0,
            phase: Phase::Init,
        })
    }
}

impl<D: Detector, C, R> FramePipeline<D, C, R> {
    /// Replace the stopwatch clock.
    pub fn with_clock<C2: Clock>(self, clock: C2) -> FramePipeline<D, C2, R> {
        FramePipeline {
            detector: self.detector,
            state: self.state,
            fitter: self.fitter,
            clock,
            config: self.config,
            next_index: self.next_index,
            phase: self.phase,
        }
    }

    /// Replace the line fitter's random source.
    pub fn with_rng<R2: Rng>(self, rng: R2) -> FramePipeline<D, C, R2> {
        FramePipeline {
            detector: self.detector,
            state: self.state,
            fitter: LineFitter::with_rng(self.config.ransac, rng),
            clock: self.clock,
            config: self.config,
            next_index: self.next_index,
            phase: self.phase,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub const fn config(&self) -> &MeasureConfig {
        &self.config
    }

    #[must_use]
    pub const fn detector(&self) -> &D {
        &self.detector
    }

    /// State that the next frame will restore.
    #[must_use]
    pub const fn detector_state(&self) -> &D::State {
        &self.state
    }

    #[must_use]
    pub const fn frames_processed(&self) -> u64 {
        self.next_index
    }

    /// Overlay geometry for a processed frame.
    #[must_use]
    pub fn overlay(&self, outcome: &FrameOutcome) -> FrameOverlay {
        FrameOverlay {
            frame_index: outcome.record.frame_index,
            roles: self
                .config
                .roles
                .iter()
                .zip(&outcome.results)
                .map(|(role, result)| {
                    RoleOverlay::new(role, result, self.config.overlay_half_length)
                })
                .collect(),
        }
    }

    /// Release the detector context and return it.
    pub fn shutdown(mut self) -> D {
        self.terminate();
        self.detector
    }

    fn enter(&mut self, phase: Phase) {
        trace!(frame = self.next_index, from = ?self.phase, to = ?phase, "phase");
        self.phase = phase;
    }

    fn terminate(&mut self) {
        if self.phase != Phase::Terminated {
            self.enter(Phase::Terminated);
            self.detector.shutdown();
        }
    }
}

impl<D, C, R> FramePipeline<D, C, R>
where
    D: Detector,
    C: Clock,
    R: Rng,
{
    /// Run one full frame cycle on `image`.
    ///
    /// When frames are driven by hand instead of through [`run`](Self::run),
    /// finish with [`shutdown`](Self::shutdown). Dropping the pipeline does
    /// not call [`Detector::shutdown`].
    pub fn process_frame(&mut self, image: &D::Image) -> FrameOutcome {
        let start = self.clock.now();

        self.enter(Phase::RestoreState);
        self.detector.restore_state(&self.state);

        self.enter(Phase::Scan);
        let dir = self.detector.scan(image);

        self.enter(Phase::SelectPoints);
        let point_sets = self.detector.select_points(dir);
        self.state = self.detector.save_state();
        if point_sets.len() > self.config.roles.len() {
            trace!(
                frame = self.next_index,
                sets = point_sets.len(),
                roles = self.config.roles.len(),
                "ignoring point sets without a role"
            );
        }

        let mut results = Vec::with_capacity(self.config.roles.len());
        for role in 0..self.config.roles.len() {
            self.enter(Phase::FitLine { role });
            let points: &[Point] = point_sets.get(role).map_or(&[], Vec::as_slice);
            let fit = self.fitter.fit(points);
            results.push(measure_line(fit, dir, self.config.dimensions));
        }

        let compute = self.clock.elapsed(&start);
        self.enter(Phase::Emit);

        for (role, result) in self.config.roles.iter().zip(&results) {
            log_role(self.next_index, role, result);
        }

        let record = FrameRecord {
            frame_index: self.next_index,
            angles: results.iter().map(FitResult::angle_or_sentinel).collect(),
            compute_ms: duration_ms(compute),
        };
        debug!(
            frame = record.frame_index,
            dir = dir.0,
            angles = ?record.angles,
            compute_ms = record.compute_ms,
            "frame measured"
        );
        self.next_index += 1;

        FrameOutcome {
            record,
            dir,
            compute,
            results,
        }
    }

    /// Process `frames` until the source ends or `stop` fires.
    ///
    /// Every frame's record is appended to `sink` before the next frame
    /// is acquired; `renderer`, if given, receives each frame's overlay.
    /// On return the detector has been shut down and `sink` flushed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Persistence`] as soon as appending or
    /// flushing fails. No further frames are processed.
    pub fn run<I, S, K>(
        mut self,
        frames: I,
        stop: &S,
        sink: &mut K,
        renderer: Option<&mut dyn OverlayRenderer>,
    ) -> Result<RunDiagnostics, PipelineError>
    where
        I: IntoIterator<Item = D::Image>,
        S: StopSignal + ?Sized,
        K: RecordSink + ?Sized,
    {
        let mut diagnostics = RunDiagnostics::new(&self.config.roles);
        let driven = self.drive(frames, stop, sink, renderer, &mut diagnostics);
        let flushed = sink.flush();
        self.terminate();

        let termination = match driven {
            Ok(termination) => termination,
            Err(e) => {
                error!(frames = diagnostics.frames, error = %e, "run aborted");
                return Err(e);
            }
        };
        if let Err(e) = flushed {
            error!(frames = diagnostics.frames, error = %e, "failed to flush records");
            return Err(PipelineError::Persistence(e));
        }

        diagnostics.termination = Some(termination);
        info!(frames = diagnostics.frames, %termination, "run finished");
        Ok(diagnostics)
    }

    fn drive<I, S, K>(
        &mut self,
        frames: I,
        stop: &S,
        sink: &mut K,
        mut renderer: Option<&mut dyn OverlayRenderer>,
        diagnostics: &mut RunDiagnostics,
    ) -> Result<Termination, PipelineError>
    where
        I: IntoIterator<Item = D::Image>,
        S: StopSignal + ?Sized,
        K: RecordSink + ?Sized,
    {
        let mut frames = frames.into_iter();
        loop {
            if stop.stop_requested() {
                return Ok(Termination::StopRequested);
            }
            let Some(image) = frames.next() else {
                return Ok(Termination::EndOfInput);
            };

            let outcome = self.process_frame(&image);
            sink.append(&outcome.record)?;
            if let Some(renderer) = renderer.as_deref_mut() {
                renderer.render(&self.overlay(&outcome));
            }
            diagnostics.record(&outcome);
        }
    }
}

fn log_role(frame: u64, role: &LineRole, result: &FitResult) {
    match result {
        FitResult::Measured { angle, inliers, .. } => {
            trace!(frame, role = %role.label, angle, inliers, "line measured");
        }
        FitResult::Failed(failure @ RoleFailure::Logic(_)) => {
            error!(frame, role = %role.label, error = %failure, "angle calculator rejected a fitted line");
        }
        FitResult::Failed(failure @ RoleFailure::Fit(_)) => {
            debug!(frame, role = %role.label, reason = %failure, "no line");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;
    use crate::angle::AngleError;
    use crate::types::{LineModel, RansacConfig, Vector};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Configure(Dimensions),
        Restore(u32),
        Scan,
        Select,
        Save(u32),
        Shutdown,
    }

    /// One scripted frame: orientation plus point sets.
    #[derive(Clone)]
    struct Script {
        dir: i32,
        sets: Vec<Vec<Point>>,
        /// Simulated detector work, in milliseconds of [`ManualClock`].
        scan_ms: u64,
    }

    /// Shared fake time, advanced by hand.
    #[derive(Clone, Default)]
    struct ManualClock(Rc<Cell<Duration>>);

    impl ManualClock {
        fn advance(&self, ms: u64) {
            self.0.set(self.0.get() + Duration::from_millis(ms));
        }
    }

    impl Clock for ManualClock {
        type Instant = Duration;

        fn now(&self) -> Duration {
            self.0.get()
        }

        fn elapsed(&self, since: &Duration) -> Duration {
            self.0.get() - *since
        }
    }

    struct ScriptedDetector {
        calls: Rc<RefCell<Vec<Call>>>,
        clock: ManualClock,
        counter: u32,
        current: Option<Script>,
    }

    impl ScriptedDetector {
        fn new(clock: ManualClock) -> (Self, Rc<RefCell<Vec<Call>>>) {
            let calls = Rc::new(RefCell::new(Vec::new()));
            (
                Self {
                    calls: Rc::clone(&calls),
                    clock,
                    counter: 0,
                    current: None,
                },
                calls,
            )
        }
    }

    impl Detector for ScriptedDetector {
        type Image = Script;
        type State = u32;

        fn configure(&mut self, size: Dimensions) {
            self.calls.borrow_mut().push(Call::Configure(size));
        }

        fn restore_state(&mut self, state: &u32) {
            self.counter = *state;
            self.calls.borrow_mut().push(Call::Restore(*state));
        }

        fn scan(&mut self, image: &Script) -> OrientationCode {
            self.calls.borrow_mut().push(Call::Scan);
            self.clock.advance(image.scan_ms);
            self.counter += 1;
            self.current = Some(image.clone());
            OrientationCode(image.dir)
        }

        fn select_points(&mut self, _dir: OrientationCode) -> Vec<Vec<Point>> {
            self.calls.borrow_mut().push(Call::Select);
            self.current.take().map(|s| s.sets).unwrap_or_default()
        }

        fn save_state(&self) -> u32 {
            self.calls.borrow_mut().push(Call::Save(self.counter));
            self.counter
        }

        fn shutdown(&mut self) {
            self.calls.borrow_mut().push(Call::Shutdown);
        }
    }

    fn horizontal(y: f64) -> Vec<Point> {
        (0..30).map(|i| Point::new(f64::from(i) * 10.0, y)).collect()
    }

    fn diagonal() -> Vec<Point> {
        (0..30)
            .map(|i| Point::new(f64::from(i) * 10.0, 400.0 - f64::from(i) * 10.0))
            .collect()
    }

    fn script(sets: Vec<Vec<Point>>) -> Script {
        Script {
            dir: 1,
            sets,
            scan_ms: 0,
        }
    }

    fn seeded_config() -> MeasureConfig {
        MeasureConfig {
            seed: Some(17),
            ..MeasureConfig::default()
        }
    }

    fn scripted_pipeline(
        config: MeasureConfig,
    ) -> (
        FramePipeline<ScriptedDetector, ManualClock>,
        Rc<RefCell<Vec<Call>>>,
        ManualClock,
    ) {
        let clock = ManualClock::default();
        let (detector, calls) = ScriptedDetector::new(clock.clone());
        let pipeline = FramePipeline::new(detector, config)
            .unwrap()
            .with_clock(clock.clone());
        (pipeline, calls, clock)
    }

    #[test]
    fn invalid_config_is_rejected() {
        let (detector, calls) = ScriptedDetector::new(ManualClock::default());
        let config = MeasureConfig {
            roles: Vec::new(),
            ..MeasureConfig::default()
        };
        assert!(matches!(
            FramePipeline::new(detector, config),
            Err(PipelineError::InvalidConfig(_))
        ));
        assert!(calls.borrow().is_empty(), "detector must not be configured");
    }

    #[test]
    fn detector_calls_follow_protocol() {
        let (mut pipeline, calls, _) = scripted_pipeline(seeded_config());
        assert_eq!(pipeline.phase(), Phase::Init);

        pipeline.process_frame(&script(vec![horizontal(10.0), horizontal(50.0)]));
        pipeline.process_frame(&script(vec![horizontal(10.0), horizontal(50.0)]));
        assert_eq!(pipeline.phase(), Phase::Emit);
        let _detector = pipeline.shutdown();

        assert_eq!(
            *calls.borrow(),
            vec![
                Call::Configure(Dimensions {
                    width: 640,
                    height: 480
                }),
                Call::Restore(0),
                Call::Scan,
                Call::Select,
                Call::Save(1),
                Call::Restore(1),
                Call::Scan,
                Call::Select,
                Call::Save(2),
                Call::Shutdown,
            ]
        );
    }

    #[test]
    fn empty_role_records_sentinel_and_continues() {
        let (mut pipeline, _, _) = scripted_pipeline(seeded_config());
        let first = pipeline.process_frame(&script(vec![vec![], vec![]]));
        assert_eq!(first.record.angles, vec![0.0, 0.0]);
        assert!(matches!(
            first.results[0],
            FitResult::Failed(RoleFailure::Fit(FitError::InsufficientPoints { .. }))
        ));

        let second = pipeline.process_frame(&script(vec![horizontal(100.0), horizontal(200.0)]));
        assert_eq!(second.record.frame_index, 1);
        assert!(second.results.iter().all(FitResult::is_ok));
    }

    #[test]
    fn roles_are_independent() {
        let (mut pipeline, _, _) = scripted_pipeline(seeded_config());
        let role_two = diagonal();
        let outcome = pipeline.process_frame(&script(vec![vec![], role_two.clone()]));

        // Role two measured on its own.
        let alone = LineFitter::with_seed(RansacConfig::default(), 99)
            .fit(&role_two)
            .unwrap();
        let expected = line_angle(
            &alone.model,
            OrientationCode(1),
            MeasureConfig::default().dimensions,
        )
        .unwrap();

        assert!(outcome.record.angle(0).abs() < f64::EPSILON);
        assert!((outcome.record.angle(1) - expected).abs() < 1e-9);
        assert!((expected - 45.0).abs() < 1e-9);
    }

    #[test]
    fn missing_and_extra_point_sets() {
        let (mut pipeline, _, _) = scripted_pipeline(seeded_config());
        let short = pipeline.process_frame(&script(vec![horizontal(10.0)]));
        assert!(short.results[0].is_ok());
        assert!(!short.results[1].is_ok());

        let long = pipeline.process_frame(&script(vec![
            horizontal(10.0),
            horizontal(20.0),
            horizontal(30.0),
        ]));
        assert_eq!(long.record.angles.len(), 2);
    }

    #[test]
    fn a_third_role_needs_no_structural_change() {
        let mut config = seeded_config();
        config
            .roles
            .push(LineRole::new("Line3", crate::types::Color::RED, Point::new(10.0, 90.0)));
        let (mut pipeline, _, _) = scripted_pipeline(config);
        let outcome = pipeline.process_frame(&script(vec![
            horizontal(10.0),
            vec![],
            diagonal(),
        ]));
        assert_eq!(outcome.record.angles.len(), 3);
        assert!((outcome.record.angle(2) - 45.0).abs() < 1e-9);
    }

    #[test]
    fn compute_time_excludes_acquisition() {
        let (pipeline, _, clock) = scripted_pipeline(seeded_config());

        // Each frame costs 250 ms to acquire and 3 ms to scan.
        let source_clock = clock.clone();
        let frames = (0..4).map(move |_| {
            source_clock.advance(250);
            Script {
                dir: 1,
                sets: vec![horizontal(10.0), horizontal(20.0)],
                scan_ms: 3,
            }
        });

        let mut records: Vec<FrameRecord> = Vec::new();
        let diagnostics = pipeline
            .run(frames, &NeverStop, &mut records, None)
            .unwrap();

        assert_eq!(records.len(), 4);
        for record in &records {
            assert!((record.compute_ms - 3.0).abs() < 1e-9, "{record:?}");
        }
        assert!((diagnostics.max_compute_ms.unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn run_writes_one_record_per_frame_in_order() {
        let (pipeline, calls, _) = scripted_pipeline(seeded_config());
        let frames = vec![script(vec![horizontal(10.0), vec![]]); 5];
        let mut records: Vec<FrameRecord> = Vec::new();
        let diagnostics = pipeline
            .run(frames, &NeverStop, &mut records, None)
            .unwrap();

        let indices: Vec<u64> = records.iter().map(|r| r.frame_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(diagnostics.frames, 5);
        assert_eq!(diagnostics.termination, Some(Termination::EndOfInput));
        assert_eq!(diagnostics.roles[0].measured, 5);
        assert_eq!(diagnostics.roles[1].missed, 5);
        assert_eq!(calls.borrow().last(), Some(&Call::Shutdown));
    }

    #[test]
    fn dropping_without_shutdown_skips_detector_shutdown() {
        let (mut pipeline, calls, _) = scripted_pipeline(seeded_config());
        pipeline.process_frame(&script(vec![horizontal(10.0), horizontal(20.0)]));
        drop(pipeline);
        assert!(!calls.borrow().contains(&Call::Shutdown));

        let (mut pipeline, calls, _) = scripted_pipeline(seeded_config());
        pipeline.process_frame(&script(vec![horizontal(10.0), horizontal(20.0)]));
        let _detector = pipeline.shutdown();
        let shutdowns = calls.borrow().iter().filter(|c| **c == Call::Shutdown).count();
        assert_eq!(shutdowns, 1);
    }

    struct StopAfterFirst<'a>(&'a AtomicBool);

    impl OverlayRenderer for StopAfterFirst<'_> {
        fn render(&mut self, _overlay: &FrameOverlay) {
            self.0.store(true, Ordering::Relaxed);
        }
    }

    #[test]
    fn stop_signal_ends_run_at_frame_boundary() {
        let (pipeline, calls, _) = scripted_pipeline(seeded_config());
        let stop = AtomicBool::new(false);
        let mut renderer = StopAfterFirst(&stop);
        let frames = vec![script(vec![horizontal(10.0), horizontal(20.0)]); 10];
        let mut records: Vec<FrameRecord> = Vec::new();

        let diagnostics = pipeline
            .run(frames, &stop, &mut records, Some(&mut renderer))
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(diagnostics.termination, Some(Termination::StopRequested));
        let calls = calls.borrow();
        assert_eq!(calls.iter().filter(|c| **c == Call::Scan).count(), 1);
        assert_eq!(calls.last(), Some(&Call::Shutdown));
    }

    struct FailingSink {
        accepted: usize,
        capacity: usize,
        flushed: bool,
    }

    impl RecordSink for FailingSink {
        fn append(&mut self, _record: &FrameRecord) -> io::Result<()> {
            if self.accepted == self.capacity {
                return Err(io::Error::other("disk full"));
            }
            self.accepted += 1;
            Ok(())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushed = true;
            Ok(())
        }
    }

    #[test]
    fn persistence_failure_is_fatal() {
        let (pipeline, calls, _) = scripted_pipeline(seeded_config());
        let frames = vec![script(vec![horizontal(10.0), horizontal(20.0)]); 5];
        let mut sink = FailingSink {
            accepted: 0,
            capacity: 2,
            flushed: false,
        };

        let result = pipeline.run(frames, &NeverStop, &mut sink, None);

        assert!(matches!(result, Err(PipelineError::Persistence(_))));
        assert_eq!(sink.accepted, 2);
        assert!(sink.flushed);
        let calls = calls.borrow();
        assert_eq!(calls.iter().filter(|c| **c == Call::Scan).count(), 3);
        assert_eq!(calls.last(), Some(&Call::Shutdown));
    }

    #[test]
    fn renderer_receives_models_of_the_frame() {
        let (pipeline, _, _) = scripted_pipeline(seeded_config());
        let frames = vec![
            script(vec![horizontal(40.0), vec![]]),
            script(vec![vec![], diagonal()]),
        ];
        let mut overlays: Vec<FrameOverlay> = Vec::new();
        let mut records: Vec<FrameRecord> = Vec::new();
        pipeline
            .run(frames, &NeverStop, &mut records, Some(&mut overlays))
            .unwrap();

        assert_eq!(overlays.len(), 2);
        assert_eq!(overlays[0].frame_index, 0);
        let first = overlays[0].roles[0].line.unwrap();
        assert!((first.reference.y - 40.0).abs() < 1e-9);
        assert!(overlays[0].roles[1].line.is_none());
        assert!(overlays[1].roles[0].line.is_none());
        assert!(overlays[1].roles[1].line.is_some());
    }

    #[test]
    fn zero_normal_is_reported_as_logic_error() {
        let fit = Ok(LineFit {
            model: LineModel {
                normal: Vector::new(0.0, 0.0),
                reference: Point::new(1.0, 1.0),
            },
            inliers: 5,
            iterations: 1,
        });
        let result = measure_line(fit, OrientationCode(1), MeasureConfig::default().dimensions);
        assert_eq!(
            result,
            FitResult::Failed(RoleFailure::Logic(AngleError::DegenerateInput {
                magnitude: 0.0
            }))
        );
        assert!(result.angle_or_sentinel().abs() < f64::EPSILON);
    }

    #[test]
    fn opposite_orientations_give_opposite_angles() {
        let (mut pipeline, _, _) = scripted_pipeline(seeded_config());
        let forward = pipeline.process_frame(&Script {
            dir: 1,
            sets: vec![diagonal(), vec![]],
            scan_ms: 0,
        });
        let mirrored = pipeline.process_frame(&Script {
            dir: -1,
            sets: vec![diagonal(), vec![]],
            scan_ms: 0,
        });
        assert!((forward.record.angle(0) + mirrored.record.angle(0)).abs() < 1e-9);
    }
}
