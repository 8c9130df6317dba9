//! anglemeter-bench: replay recorded detector output through the angle
//! pipeline.
//!
//! Reads a capture (JSON lines, one frame of detector output per line),
//! measures every frame, writes the angle log as CSV and prints run
//! diagnostics. Useful for:
//!
//! - Tuning the RANSAC threshold, iteration cap and target inlier fraction
//! - Measuring per-frame compute time without video decoding
//! - Reproducing a run exactly with `--seed`
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin anglemeter-bench -- [OPTIONS] <CAPTURE_PATH>
//! ```
//!
//! Set `RUST_LOG=debug` for per-frame logging. Ctrl-C stops the current
//! run after the frame in progress; the log is flushed and no further
//! runs start.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod capture;
mod overlays;

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anglemeter_export::CsvLog;
use anglemeter_pipeline::overlay::OverlayRenderer;
use anglemeter_pipeline::prefetch::prefetch;
use anglemeter_pipeline::replay::{CapturedFrame, ReplayDetector};
use anglemeter_pipeline::{
    Dimensions, FramePipeline, MeasureConfig, RansacConfig, RunDiagnostics,
};
use clap::Parser;
use tracing::{error, info, warn};

use crate::capture::CaptureFrames;
use crate::overlays::SvgDirectory;

/// Replay a detector capture and measure line angles frame by frame.
///
/// Writes one CSV row per frame and prints timing and per-role hit
/// counts for the run.
#[derive(Parser)]
#[command(name = "anglemeter-bench", version)]
struct Cli {
    /// Path to the capture file (JSON lines of detector output).
    capture_path: PathBuf,

    /// Angle log to write. Truncated at the start of each run.
    #[arg(long, default_value = "angles.csv")]
    output: PathBuf,

    /// Write an SVG overlay per frame into this directory (first run only).
    #[arg(long)]
    overlay_dir: Option<PathBuf>,

    /// Frame width in pixels.
    #[arg(long, default_value_t = MeasureConfig::DEFAULT_WIDTH, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    width: u32,

    /// Frame height in pixels.
    #[arg(long, default_value_t = MeasureConfig::DEFAULT_HEIGHT, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    height: u32,

    /// Maximum point-to-line distance (pixels) for an inlier.
    #[arg(long, default_value_t = RansacConfig::DEFAULT_INLIER_THRESHOLD)]
    inlier_threshold: f64,

    /// RANSAC iteration cap per fit.
    #[arg(long, default_value_t = RansacConfig::DEFAULT_MAX_ITERATIONS, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    max_iterations: usize,

    /// Inlier fraction at which sampling stops early (0.0-1.0).
    #[arg(long, default_value_t = RansacConfig::DEFAULT_TARGET_INLIER_FRACTION)]
    target_inlier_fraction: f64,

    /// Seed for the line fitter. Omit for a random seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Read frames on a background thread, buffering up to DEPTH frames.
    #[arg(long, value_name = "DEPTH")]
    prefetch: Option<usize>,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<usize>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full measurement config as a JSON string.
    ///
    /// When provided, all other measurement flags are ignored.
    /// The JSON must be a valid `MeasureConfig` serialization; missing
    /// fields take their defaults.
    #[arg(long, conflicts_with = "config")]
    config_json: Option<String>,

    /// Read the measurement config from a JSON file (same rules as
    /// `--config-json`).
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Build a [`MeasureConfig`] from CLI arguments.
///
/// If `--config-json` or `--config` is provided, the JSON is parsed
/// directly and all individual parameter flags are ignored. Otherwise, a
/// config is assembled from the individual flags.
fn config_from_cli(cli: &Cli) -> Result<MeasureConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }
    if let Some(ref path) = cli.config {
        let json = fs::read_to_string(path)
            .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
        return serde_json::from_str(&json)
            .map_err(|e| format!("Error parsing {}: {e}", path.display()));
    }

    Ok(MeasureConfig {
        dimensions: Dimensions {
            width: cli.width,
            height: cli.height,
        },
        ransac: RansacConfig::default()
            .with_inlier_threshold(cli.inlier_threshold)
            .with_max_iterations(cli.max_iterations)
            .with_target_inlier_fraction(cli.target_inlier_fraction),
        seed: cli.seed,
        ..MeasureConfig::default()
    })
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Install a Ctrl-C handler that raises the returned flag.
fn stop_on_ctrl_c() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        info!("received Ctrl-C; stopping after the current frame");
        flag.store(true, Ordering::Relaxed);
    })?;
    Ok(stop)
}

/// Frames from the capture, ending at the first unreadable line.
fn capture_frames(
    path: &Path,
    max_frames: Option<usize>,
) -> Result<impl Iterator<Item = CapturedFrame> + Send + 'static, String> {
    let frames =
        CaptureFrames::open(path).map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    Ok(frames
        .map_while(|frame| {
            frame
                .map_err(|e| error!(line = e.line(), error = %e, "capture unreadable; ending input"))
                .ok()
        })
        .take(max_frames.unwrap_or(usize::MAX)))
}

/// Measure the whole capture once.
fn run_once(
    cli: &Cli,
    config: &MeasureConfig,
    stop: &AtomicBool,
    overlays: Option<&mut SvgDirectory>,
) -> Result<RunDiagnostics, String> {
    let frames = capture_frames(&cli.capture_path, cli.max_frames)?;

    let output = File::create(&cli.output)
        .map_err(|e| format!("Error creating {}: {e}", cli.output.display()))?;
    let mut log = CsvLog::new(BufWriter::new(output), config.roles.len())
        .map_err(|e| format!("Error writing {}: {e}", cli.output.display()))?;

    let pipeline = FramePipeline::new(ReplayDetector::new(), config.clone())
        .map_err(|e| format!("Pipeline error: {e}"))?;
    let renderer = overlays.map(|o| o as &mut dyn OverlayRenderer);

    let diagnostics = match cli.prefetch {
        Some(depth) => pipeline.run(prefetch(frames, depth), stop, &mut log, renderer),
        None => pipeline.run(frames, stop, &mut log, renderer),
    }
    .map_err(|e| format!("Pipeline error: {e}"))?;

    eprintln!(
        "Angles written to {} ({} rows)",
        cli.output.display(),
        log.rows_written(),
    );
    Ok(diagnostics)
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let stop = stop_on_ctrl_c().unwrap_or_else(|e| {
        warn!(error = %e, "Ctrl-C handler not installed; runs end at end of input");
        Arc::new(AtomicBool::new(false))
    });

    eprintln!("Capture: {}", cli.capture_path.display());
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut overlays = match cli.overlay_dir {
        Some(ref dir) => {
            if let Err(e) = fs::create_dir_all(dir) {
                eprintln!("Error creating {}: {e}", dir.display());
                return ExitCode::FAILURE;
            }
            let config_json = serde_json::to_string(&config).ok();
            Some(SvgDirectory::new(dir, config.dimensions, config_json))
        }
        None => None,
    };

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        // Write overlays on the first run only.
        let renderer = if run == 0 { overlays.as_mut() } else { None };

        match run_once(&cli, &config, &stop, renderer) {
            Ok(diagnostics) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }
                all_diagnostics.push(diagnostics);
            }
            Err(msg) => {
                eprintln!("{msg}");
                return ExitCode::FAILURE;
            }
        }

        if run == 0
            && let (Some(overlays), Some(dir)) = (&overlays, &cli.overlay_dir)
        {
            eprintln!(
                "Overlays written to {} ({} files, {} failed)",
                dir.display(),
                overlays.written(),
                overlays.failed(),
            );
        }

        if stop.load(Ordering::Relaxed) {
            eprintln!("Stopped after run {}/{}", run + 1, cli.runs);
            break;
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    // Print summary when multiple runs.
    if all_diagnostics.len() > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[RunDiagnostics]) {
    debug_assert!(!all_diagnostics.is_empty(), "no diagnostics to summarize");

    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let means: Vec<f64> = all_diagnostics
        .iter()
        .filter_map(RunDiagnostics::mean_compute_ms)
        .collect();
    if means.is_empty() {
        println!("No frames measured");
        return;
    }

    let min = means.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = means.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = means.iter().sum::<f64>() / means.len() as f64;

    println!("Mean compute per frame: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    // Per-role hit rates.
    println!();
    println!("{:<24} {:>12}", "Role", "Measured (%)");
    println!("{}", "-".repeat(40));

    let Some(first) = all_diagnostics.first() else {
        return;
    };
    for (i, role) in first.roles.iter().enumerate() {
        let (measured, frames) = all_diagnostics
            .iter()
            .filter_map(|d| d.roles.get(i).map(|r| (r.measured, d.frames)))
            .fold((0u64, 0u64), |(m, f), (rm, rf)| (m + rm, f + rf));
        if frames == 0 {
            continue;
        }
        let rate = 100.0 * measured as f64 / frames as f64;
        println!("{:<24} {rate:>11.1}%", role.label);
    }
}
