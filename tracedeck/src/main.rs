//! # tracedeck - Main Entry Point
//!
//! Drives one capture headlessly:
//! - **Simulated** (default): record `--record-ms` on the in-process device
//! - **Replay** (`--replay trace.json`): load a trace file as if it had just
//!   been recorded
//!
//! The capture's summary and the requested details view are printed to stdout.

// Elapsed times are converted to microseconds for the timeline
#![allow(clippy::cast_precision_loss)]

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use log::{debug, info};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracedeck::cli::{render_capture_summary, render_details, Args};
use tracedeck::recording::{DeviceBehavior, RecordingService, ReplayService, SimulatedDevice};
use tracedeck::stage::{CaptureState, CpuProfilerStage, StageAspect};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_NOINPUT: i32 = 66;

/// Main thread ID of the simulated app
const SIMULATED_PID: u32 = 4242;

/// How often the timeline advances while recording
const TICK: Duration = Duration::from_millis(20);

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}").to_lowercase();
    if msg.contains("no such file") || msg.contains("not found") {
        EXIT_NOINPUT
    } else {
        EXIT_ERROR
    }
}

/// Recording service selected by `--replay`
fn build_service(args: &Args) -> Result<Arc<dyn RecordingService>> {
    if let Some(ref path) = args.replay {
        std::fs::metadata(path)
            .with_context(|| format!("Trace file not found: {}", path.display()))?;
        return Ok(Arc::new(ReplayService::new(path)));
    }

    let record_us = Duration::from_millis(args.record_ms).as_micros() as f64;
    let behavior = DeviceBehavior { trace_duration_us: record_us.max(1.0), ..DeviceBehavior::default() };
    Ok(Arc::new(SimulatedDevice::new(SIMULATED_PID).with_behavior(behavior)))
}

fn run() -> Result<()> {
    let args = Args::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the tokio runtime")?;

    let service = build_service(&args)?;
    let mut stage = CpuProfilerStage::new(service, runtime.handle().clone(), args.stage_options());
    stage.set_profiling_configuration(args.configuration());
    stage.set_clock_type(args.clock.into());

    if !args.quiet {
        stage.on_change(StageAspect::CaptureState, |stage| {
            eprintln!("[{:?}]", stage.capture_state());
        });
    }

    info!("Recording with {}", stage.profiling_configuration());
    stage.start_capturing()?;
    if !stage.settle() {
        bail!("Timed out waiting for the device to start recording");
    }
    if stage.capture_state() != CaptureState::Capturing {
        bail!("Device refused to start recording");
    }

    // Replayed traces are already complete
    let record_for = if args.replay.is_some() {
        Duration::ZERO
    } else {
        Duration::from_millis(args.record_ms)
    };
    let origin = Instant::now();
    while origin.elapsed() < record_for {
        std::thread::sleep(TICK.min(record_for.saturating_sub(origin.elapsed())));
        stage.timeline().advance(origin.elapsed().as_micros() as f64);
        stage.process_pending();
    }
    debug!("Recorded {} us", stage.capture_elapsed_time_us());

    stage.stop_capturing()?;
    if !stage.settle() {
        bail!("Timed out waiting for the trace to be parsed");
    }

    let capture = stage.capture().cloned().ok_or_else(|| {
        let status = stage.last_capture_metadata().map(|m| m.status);
        anyhow!("No capture was produced (status: {status:?})")
    })?;
    stage.set_capture_details(Some(args.details.into()));

    if !args.quiet {
        print!("{}", render_capture_summary(&capture));
        println!();
    }
    let details = stage
        .capture_details()
        .context("No details for the selected capture")?;
    print!("{}", render_details(details, args.top));

    Ok(())
}
