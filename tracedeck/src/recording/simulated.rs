//! In-process device that records deterministic synthetic traces.
//!
//! Each stop produces a trace of one app process with three threads written
//! through [`TraceWriter`]:
//!
//! ```text
//! main          ActivityThread.main
//!               └── Choreographer.doFrame ×4 ── measure / layout / draw ── drawText
//! RenderThread  DrawFrame ×4 ── syncFrameState / flush
//! AsyncTask #1  doInBackground ── fib ── fib ── fib
//! ```
//!
//! [`DeviceBehavior`] injects failures and latency.

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracedeck_common::{ToolKind, TraceWriter};

use super::{RecordingService, StartResponse, StopResponse};
use crate::domain::{RecordingError, SessionId, TraceId};
use crate::stage::ProfilingConfiguration;

/// Failure injection and timing knobs
#[derive(Debug, Clone)]
pub struct DeviceBehavior {
    pub start_fails: bool,
    pub stop_fails: bool,
    /// Stop succeeds but reports no trace
    pub omit_trace_id: bool,
    pub fetch_fails: bool,
    /// Bytes returned for the next traces instead of a synthetic one
    pub trace_override: Option<Vec<u8>>,
    /// Wall-clock length of synthetic traces
    pub trace_duration_us: f64,
    /// Delay before every reply
    pub latency: Duration,
}

impl Default for DeviceBehavior {
    fn default() -> Self {
        Self {
            start_fails: false,
            stop_fails: false,
            omit_trace_id: false,
            fetch_fails: false,
            trace_override: None,
            trace_duration_us: 400_000.0,
            latency: Duration::ZERO,
        }
    }
}

#[derive(Debug, Default)]
struct DeviceState {
    behavior: DeviceBehavior,
    next_session: u64,
    next_trace: i64,
    active: Option<(SessionId, ProfilingConfiguration)>,
    traces: HashMap<TraceId, Vec<u8>>,
    start_requests: Vec<ProfilingConfiguration>,
    stop_requests: Vec<(SessionId, ToolKind)>,
    fetch_count: usize,
}

impl DeviceState {
    fn store_trace(&mut self, bytes: Vec<u8>) -> TraceId {
        self.next_trace += 1;
        let id = TraceId(self.next_trace);
        self.traces.insert(id, bytes);
        id
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    pid: u32,
    state: Arc<Mutex<DeviceState>>,
}

impl SimulatedDevice {
    /// Device profiling an app whose main thread ID is `pid`
    #[must_use]
    pub fn new(pid: u32) -> Self {
        Self { pid, state: Arc::new(Mutex::new(DeviceState::default())) }
    }

    #[must_use]
    pub fn with_behavior(self, behavior: DeviceBehavior) -> Self {
        self.state.lock().behavior = behavior;
        self
    }

    /// Change the behavior of subsequent requests
    pub fn update_behavior(&self, update: impl FnOnce(&mut DeviceBehavior)) {
        update(&mut self.state.lock().behavior);
    }

    /// Make `bytes` fetchable as if a recording had produced them
    pub fn add_trace(&self, bytes: Vec<u8>) -> TraceId {
        self.state.lock().store_trace(bytes)
    }

    #[must_use]
    pub fn start_requests(&self) -> Vec<ProfilingConfiguration> {
        self.state.lock().start_requests.clone()
    }

    #[must_use]
    pub fn stop_requests(&self) -> Vec<(SessionId, ToolKind)> {
        self.state.lock().stop_requests.clone()
    }

    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.state.lock().fetch_count
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.state.lock().active.is_some()
    }

    fn latency(&self) -> Duration {
        self.state.lock().behavior.latency
    }
}

async fn delay(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}

impl RecordingService for SimulatedDevice {
    fn start_recording(
        &self,
        config: &ProfilingConfiguration,
    ) -> BoxFuture<'static, Result<StartResponse, RecordingError>> {
        let state = Arc::clone(&self.state);
        let config = config.clone();
        let latency = self.latency();
        async move {
            delay(latency).await;
            let mut state = state.lock();
            state.start_requests.push(config.clone());
            if state.behavior.start_fails {
                return Err(RecordingError::StartFailed("device refused to start".to_string()));
            }
            if state.active.is_some() {
                return Err(RecordingError::StartFailed("already recording".to_string()));
            }
            state.next_session += 1;
            let session = SessionId(state.next_session);
            state.active = Some((session, config));
            Ok(StartResponse { session })
        }
        .boxed()
    }

    fn stop_recording(
        &self,
        session: SessionId,
        tool: ToolKind,
    ) -> BoxFuture<'static, Result<StopResponse, RecordingError>> {
        let state = Arc::clone(&self.state);
        let pid = self.pid;
        let latency = self.latency();
        async move {
            delay(latency).await;
            let mut state = state.lock();
            state.stop_requests.push((session, tool));
            let config = match state.active.take() {
                Some((active, config)) if active == session => config,
                Some(other) => {
                    state.active = Some(other);
                    return Err(RecordingError::StopFailed(format!("{session} is not recording")));
                }
                None => return Err(RecordingError::StopFailed("nothing is recording".to_string())),
            };
            if state.behavior.stop_fails {
                return Err(RecordingError::StopFailed("device failed to stop".to_string()));
            }
            if state.behavior.omit_trace_id {
                return Ok(StopResponse { trace_id: None });
            }

            let bytes = match state.behavior.trace_override.clone() {
                Some(bytes) => bytes,
                None => synthesize_trace(&config, pid, state.behavior.trace_duration_us)
                    .map_err(|e| RecordingError::StopFailed(e.to_string()))?,
            };
            Ok(StopResponse { trace_id: Some(state.store_trace(bytes)) })
        }
        .boxed()
    }

    fn fetch_trace(&self, trace_id: TraceId) -> BoxFuture<'static, Result<Vec<u8>, RecordingError>> {
        let state = Arc::clone(&self.state);
        let latency = self.latency();
        async move {
            delay(latency).await;
            let mut state = state.lock();
            state.fetch_count += 1;
            if state.behavior.fetch_fails {
                return Err(RecordingError::FetchFailed {
                    trace_id,
                    reason: "transfer interrupted".to_string(),
                });
            }
            state.traces.get(&trace_id).cloned().ok_or_else(|| RecordingError::FetchFailed {
                trace_id,
                reason: "unknown trace".to_string(),
            })
        }
        .boxed()
    }
}

/// Share of wall time each thread spends on CPU
const MAIN_CPU_SHARE: f64 = 0.6;
const RENDER_CPU_SHARE: f64 = 0.8;
const WORKER_CPU_SHARE: f64 = 0.9;
const FRAMES: u32 = 4;

/// Write the synthetic trace described in the module docs
///
/// # Errors
/// Returns the serialization error from `serde_json`
pub fn synthesize_trace(
    config: &ProfilingConfiguration,
    pid: u32,
    duration_us: f64,
) -> serde_json::Result<Vec<u8>> {
    let (ui, gfx) = match config.tool {
        ToolKind::Art => ("android.view.View", "android.graphics.Canvas"),
        ToolKind::Simpleperf | ToolKind::Atrace => ("libhwui.so", "libskia.so"),
    };
    let mut writer =
        TraceWriter::new(config.tool, pid).with_sampling_interval(config.sampling_interval_us);
    let (main, render, worker) = (pid, pid + 1, pid + 2);
    writer.thread(main, "main").thread(render, "RenderThread").thread(worker, "AsyncTask #1");

    let cpu = |share: f64, ts: f64| ts * share;
    let frame = duration_us / f64::from(FRAMES);

    writer.begin(main, "android.app.ActivityThread", "main", 0.0, 0.0);
    for i in 0..FRAMES {
        let start = f64::from(i) * frame;
        let at = |fraction: f64| start + frame * fraction;
        let main_cpu = |fraction: f64| cpu(MAIN_CPU_SHARE, at(fraction));

        writer
            .begin(main, "android.view.Choreographer", "doFrame", at(0.05), main_cpu(0.05))
            .begin(main, ui, "measure", at(0.10), main_cpu(0.10))
            .end(main, at(0.25), main_cpu(0.25))
            .begin(main, ui, "layout", at(0.25), main_cpu(0.25))
            .end(main, at(0.40), main_cpu(0.40))
            .begin(main, ui, "draw", at(0.40), main_cpu(0.40))
            .begin(main, gfx, "drawText", at(0.50), main_cpu(0.50))
            .end(main, at(0.70), main_cpu(0.70))
            .end(main, at(0.80), main_cpu(0.80))
            .end(main, at(0.85), main_cpu(0.85));

        let render_cpu = |fraction: f64| cpu(RENDER_CPU_SHARE, at(fraction));
        writer
            .begin(render, "android.graphics.HardwareRenderer", "DrawFrame", at(0.80), render_cpu(0.80))
            .begin(render, gfx, "syncFrameState", at(0.82), render_cpu(0.82))
            .end(render, at(0.88), render_cpu(0.88))
            .begin(render, gfx, "flush", at(0.88), render_cpu(0.88))
            .end(render, at(0.97), render_cpu(0.97))
            .end(render, at(0.98), render_cpu(0.98));
    }
    writer.end(main, duration_us, cpu(MAIN_CPU_SHARE, duration_us));

    let worker_at = |fraction: f64| duration_us * fraction;
    let worker_cpu = |fraction: f64| cpu(WORKER_CPU_SHARE, worker_at(fraction));
    writer
        .begin(worker, "android.os.AsyncTask", "doInBackground", worker_at(0.10), worker_cpu(0.10))
        .begin(worker, "com.example.Math", "fib", worker_at(0.20), worker_cpu(0.20))
        .begin(worker, "com.example.Math", "fib", worker_at(0.30), worker_cpu(0.30))
        .begin(worker, "com.example.Math", "fib", worker_at(0.40), worker_cpu(0.40))
        .end(worker, worker_at(0.50), worker_cpu(0.50))
        .end(worker, worker_at(0.60), worker_cpu(0.60))
        .end(worker, worker_at(0.70), worker_cpu(0.70))
        .end(worker, worker_at(0.90), worker_cpu(0.90));

    writer.to_bytes()
}
