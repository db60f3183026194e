//! # CPU profiler stage
//!
//! Session controller driving one recording at a time through its lifecycle
//! and exposing the resulting capture to the UI.
//!
//! ## State machine
//!
//! ```text
//!            start_capturing()         start ok
//!   Idle ───────────────────► Starting ─────────► Capturing
//!    ▲  ▲                        │ start failed       │ stop_capturing()
//!    │  └────────────────────────┘                    ▼
//!    │      stop failed / no trace / fetch failed  Stopping
//!    ├────────────────────────────────────────────────┤ trace fetched
//!    │                 parse ok                       ▼
//!    ├─────────────────────────────────────────── Parsing
//!    │                                                │ parse failed
//!    └──────────────────── ParsingFailure ◄───────────┘
//! ```
//!
//! ## Threading
//!
//! The stage lives on the main context. Service calls and parses run on the
//! tokio pool through [`MainExecutor`]; their continuations only run when the
//! owner calls [`CpuProfilerStage::process_pending`] or
//! [`CpuProfilerStage::pump_until_settled`], so every transition and
//! notification happens on the main context.

pub mod config;
pub mod metadata;
pub mod state;
pub mod timeline;

pub use config::{
    default_configuration, default_configurations, ConfigurationEntry, LongTracePolicy,
    ProfilingConfiguration, ProfilingMode, StageOptions,
};
pub use metadata::{CaptureMetadata, NOT_APPLICABLE};
pub use state::{CaptureState, CaptureStatus, DurationData, ProfilerMode, StageAspect};
pub use timeline::Timeline;

use futures::future::FutureExt;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

use crate::capture::{Capture, CaptureFuture, CaptureNode, CaptureParser, ParseOptions};
use crate::capture_model::{CaptureModel, Details, DetailsKind};
use crate::clock::{ClockProjection, ClockType};
use crate::domain::{ParseError, RecordingError, SessionId, StageError, ThreadId, TraceId, NO_THREAD};
use crate::executor::MainExecutor;
use crate::model::{AspectModel, ListenerId, Span};
use crate::recording::{RecordingService, StartResponse, StopResponse};

/// A capture parsed during this session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceInfo {
    pub trace_id: TraceId,
    pub span: Span,
}

/// Recording in progress (or being stopped)
#[derive(Debug, Clone)]
struct Recording {
    session: SessionId,
    /// Copy of the active configuration taken at start
    config: ProfilingConfiguration,
    started_at: Instant,
    /// Set when stop was requested
    duration: Option<Duration>,
}

impl Recording {
    fn duration(&self) -> Duration {
        self.duration.unwrap_or_else(|| self.started_at.elapsed())
    }
}

pub struct CpuProfilerStage {
    service: Arc<dyn RecordingService>,
    executor: MainExecutor<CpuProfilerStage>,
    parser: Arc<CaptureParser>,
    options: StageOptions,

    state: CaptureState,
    profiler_mode: ProfilerMode,
    timeline: Timeline,
    capture_model: CaptureModel,

    configurations: Vec<ProfilingConfiguration>,
    active_config: ProfilingConfiguration,
    /// Configuration handed to `start_recording`, kept until it succeeds or fails
    pending_config: Option<ProfilingConfiguration>,
    recording: Option<Recording>,
    capture_start_us: f64,
    in_progress: Vec<DurationData>,

    traces: Vec<TraceInfo>,
    last_metadata: Option<CaptureMetadata>,
    aspects: AspectModel<StageAspect, CpuProfilerStage>,
}

impl CpuProfilerStage {
    /// Stage using `service` for recordings; pooled work runs on `runtime`
    #[must_use]
    pub fn new(service: Arc<dyn RecordingService>, runtime: Handle, options: StageOptions) -> Self {
        let parser =
            Arc::new(CaptureParser::new(runtime.clone()).with_max_trace_size(options.max_trace_size));
        let timeline = Timeline::new();
        let capture_model = CaptureModel::new(timeline.selection().clone());
        let active_config = default_configuration(options.prefer_native);

        Self {
            service,
            executor: MainExecutor::new(runtime),
            parser,
            options,
            state: CaptureState::Idle,
            profiler_mode: ProfilerMode::Normal,
            timeline,
            capture_model,
            configurations: default_configurations(),
            active_config,
            pending_config: None,
            recording: None,
            capture_start_us: 0.0,
            in_progress: Vec::new(),
            traces: Vec::new(),
            last_metadata: None,
            aspects: AspectModel::new(),
        }
    }

    // =========================================================================
    // NOTIFICATIONS
    // =========================================================================

    /// Call `listener` after every change of `aspect`
    pub fn on_change(
        &mut self,
        aspect: StageAspect,
        listener: impl FnMut(&CpuProfilerStage) + 'static,
    ) -> ListenerId {
        self.aspects.add_listener(aspect, listener)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.aspects.remove_listener(id)
    }

    fn changed(&mut self, aspect: StageAspect) {
        let mut aspects = std::mem::take(&mut self.aspects);
        aspects.changed(aspect, self);
        self.aspects = aspects;
    }

    // =========================================================================
    // MAIN CONTEXT
    // =========================================================================

    /// Apply every completed continuation without blocking
    pub fn process_pending(&mut self) -> usize {
        let executor = self.executor.clone();
        executor.drain(self)
    }

    /// Apply continuations until no work is outstanding or `timeout` expires.
    /// Returns false on timeout.
    pub fn pump_until_settled(&mut self, timeout: Duration) -> bool {
        let executor = self.executor.clone();
        executor.pump_until_settled(self, timeout)
    }

    /// [`Self::pump_until_settled`] with the configured timeout
    pub fn settle(&mut self) -> bool {
        self.pump_until_settled(self.options.pump_timeout)
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    #[must_use]
    pub fn capture_state(&self) -> CaptureState {
        self.state
    }

    #[must_use]
    pub fn capture(&self) -> Option<&Arc<Capture>> {
        self.capture_model.capture()
    }

    #[must_use]
    pub fn capture_details(&self) -> Option<&Details> {
        self.capture_model.details()
    }

    #[must_use]
    pub fn details_kind(&self) -> Option<DetailsKind> {
        self.capture_model.details_kind()
    }

    #[must_use]
    pub fn selected_thread(&self) -> ThreadId {
        self.capture_model.thread()
    }

    #[must_use]
    pub fn clock_type(&self) -> ClockType {
        self.capture_model.clock_type()
    }

    #[must_use]
    pub fn capture_model(&self) -> &CaptureModel {
        &self.capture_model
    }

    #[must_use]
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    #[must_use]
    pub fn profiler_mode(&self) -> ProfilerMode {
        self.profiler_mode
    }

    #[must_use]
    pub fn profiling_configuration(&self) -> &ProfilingConfiguration {
        &self.active_config
    }

    #[must_use]
    pub fn profiling_configurations(&self) -> &[ProfilingConfiguration] {
        &self.configurations
    }

    /// Open-ended duration entry while capturing, empty otherwise
    #[must_use]
    pub fn in_progress_durations(&self) -> &[DurationData] {
        &self.in_progress
    }

    /// Microseconds recorded so far, or `-1` when not capturing
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn capture_elapsed_time_us(&self) -> i64 {
        if self.state == CaptureState::Capturing {
            (self.timeline.data_range().max() - self.capture_start_us) as i64
        } else {
            -1
        }
    }

    /// Captures parsed during this session, oldest first
    #[must_use]
    pub fn traces(&self) -> &[TraceInfo] {
        &self.traces
    }

    #[must_use]
    pub fn last_capture_metadata(&self) -> Option<&CaptureMetadata> {
        self.last_metadata.as_ref()
    }

    #[must_use]
    pub fn parser(&self) -> &Arc<CaptureParser> {
        &self.parser
    }

    // =========================================================================
    // RECORDING
    // =========================================================================

    /// Ask the device to start recording with the active configuration.
    ///
    /// # Errors
    /// [`StageError::InvalidState`] unless the stage is idle.
    pub fn start_capturing(&mut self) -> Result<(), StageError> {
        if self.state != CaptureState::Idle {
            return Err(StageError::InvalidState { operation: "start capturing", state: self.state });
        }

        let config = self.active_config.clone();
        info!("Starting capture with {config}");
        let request = self.service.start_recording(&config);
        self.pending_config = Some(config);
        self.set_state(CaptureState::Starting);
        self.executor.run_on_pool(request, Self::on_start_finished);
        Ok(())
    }

    fn on_start_finished(&mut self, result: Result<StartResponse, RecordingError>) {
        let Some(config) = self.pending_config.take() else {
            warn!("Start reply without a pending request");
            return;
        };
        match result {
            Ok(StartResponse { session }) => {
                debug!("Recording started: {session}");
                self.recording =
                    Some(Recording { session, config, started_at: Instant::now(), duration: None });
                self.capture_start_us = self.timeline.data_range().max();
                self.in_progress = vec![DurationData::in_progress(self.capture_start_us)];
                self.set_streaming(true);
                self.set_state(CaptureState::Capturing);
            }
            Err(e) => {
                warn!("{e}");
                self.set_state(CaptureState::Idle);
            }
        }
    }

    /// Ask the device to stop; the trace is then fetched and parsed.
    ///
    /// # Errors
    /// [`StageError::InvalidState`] unless a recording is in progress.
    pub fn stop_capturing(&mut self) -> Result<(), StageError> {
        let recording = match (self.state, self.recording.as_mut()) {
            (CaptureState::Capturing, Some(recording)) => recording,
            (state, _) => return Err(StageError::InvalidState { operation: "stop capturing", state }),
        };

        recording.duration = Some(recording.started_at.elapsed());
        let request = self.service.stop_recording(recording.session, recording.config.tool);
        info!("Stopping {}", recording.session);
        self.set_state(CaptureState::Stopping);
        self.executor.run_on_pool(request, Self::on_stop_finished);
        Ok(())
    }

    fn on_stop_finished(&mut self, result: Result<StopResponse, RecordingError>) {
        match result {
            Ok(StopResponse { trace_id: Some(trace_id) }) => {
                debug!("Recording stopped, fetching {trace_id}");
                let fetch = self.service.fetch_trace(trace_id);
                self.executor
                    .run_on_pool(fetch, move |stage, bytes| stage.on_trace_fetched(trace_id, bytes));
            }
            Ok(StopResponse { trace_id: None }) => self.stop_failed("device returned no trace"),
            Err(e) => self.stop_failed(&e.to_string()),
        }
    }

    fn stop_failed(&mut self, reason: &str) {
        warn!("Failed to stop capturing: {reason}");
        if let Some(recording) = self.recording.take() {
            self.record_metadata(CaptureMetadata::stop_failure(recording.config));
        }
        self.in_progress.clear();
        self.set_state(CaptureState::Idle);
    }

    fn on_trace_fetched(&mut self, trace_id: TraceId, result: Result<Vec<u8>, RecordingError>) {
        let bytes = match result {
            Ok(bytes) => bytes,
            Err(e) => return self.stop_failed(&e.to_string()),
        };
        let Some(recording) = self.recording.as_ref() else {
            warn!("Fetched {trace_id} without a recording");
            return;
        };

        let size = bytes.len();
        let tool = recording.config.tool;
        self.set_state(CaptureState::Parsing);

        let allow_oversized = size > self.parser.max_trace_size()
            && self.options.long_trace_policy.allows(size);
        let parse = self.parser.get_or_parse(
            trace_id,
            move || futures::future::ready(Ok(bytes)).boxed(),
            ParseOptions { tool, allow_oversized },
        );
        self.executor
            .run_on_pool(parse, move |stage, result| stage.on_parse_finished(trace_id, size, result));
    }

    fn on_parse_finished(
        &mut self,
        trace_id: TraceId,
        size: usize,
        result: Result<Arc<Capture>, ParseError>,
    ) {
        self.in_progress.clear();
        let Some(recording) = self.recording.take() else {
            warn!("Parsed {trace_id} without a recording");
            self.set_state(CaptureState::Idle);
            return;
        };

        match result {
            Ok(capture) => {
                info!(
                    "Parsed {trace_id}: {} threads, {:.1} ms",
                    capture.threads().len(),
                    capture.duration_us() / 1000.0
                );
                self.traces.push(TraceInfo { trace_id, span: capture.span() });
                let duration = recording.duration();
                self.record_metadata(CaptureMetadata::success(recording.config, duration, &capture));
                self.set_capture_details(Some(DetailsKind::CallChart));
                self.set_and_select_capture(Some(capture));
                self.set_state(CaptureState::Idle);
            }
            Err(e) => {
                let status = if matches!(e, ParseError::TooLarge { .. }) {
                    CaptureStatus::UserAbortedParsing
                } else {
                    CaptureStatus::ParsingFailure
                };
                warn!("Failed to parse {trace_id}: {e}");
                self.record_metadata(CaptureMetadata::parse_failure(status, recording.config, size));
                self.set_capture(None);
                self.set_state(CaptureState::ParsingFailure);
                self.set_state(CaptureState::Idle);
            }
        }
    }

    fn record_metadata(&mut self, metadata: CaptureMetadata) {
        info!("Capture metadata: {}", metadata.to_json());
        self.last_metadata = Some(metadata);
    }

    fn set_state(&mut self, state: CaptureState) {
        if self.state == state {
            return;
        }
        debug!("Capture state {:?} -> {state:?}", self.state);
        self.state = state;
        self.changed(StageAspect::CaptureState);
    }

    fn set_streaming(&mut self, streaming: bool) {
        if self.timeline.set_streaming(streaming) {
            self.changed(StageAspect::Streaming);
        }
    }

    fn set_profiler_mode(&mut self, mode: ProfilerMode) {
        if self.profiler_mode != mode {
            self.profiler_mode = mode;
            self.changed(StageAspect::ProfilerMode);
        }
    }

    // =========================================================================
    // CAPTURE SELECTION
    // =========================================================================

    /// Parse (or reuse) the capture of any trace the device knows about
    pub fn capture_future(&self, trace_id: TraceId) -> CaptureFuture {
        let service = Arc::clone(&self.service);
        self.parser.get_or_parse(
            trace_id,
            move || {
                service
                    .fetch_trace(trace_id)
                    .map(|result| result.map_err(|e| ParseError::Unavailable(e.to_string())))
                    .boxed()
            },
            ParseOptions::new(self.active_config.tool),
        )
    }

    /// Select `trace_id`'s capture once it is parsed; failures are logged
    pub fn select_trace(&mut self, trace_id: TraceId) {
        let capture = self.capture_future(trace_id);
        self.executor.run_on_pool(capture, move |stage, result| match result {
            Ok(capture) => stage.set_and_select_capture(Some(capture)),
            Err(e) => warn!("Cannot select {trace_id}: {e}"),
        });
    }

    /// Set the active capture.
    ///
    /// Switching between two captures keeps the selected thread; coming from
    /// no capture (or no thread) selects the capture's main thread. `None`
    /// clears the thread and returns to the normal layout.
    pub fn set_capture(&mut self, capture: Option<Arc<Capture>>) {
        let had_capture = self.capture_model.capture().is_some();
        if self.capture_model.set_capture(capture.clone()) {
            self.changed(StageAspect::Capture);
            self.changed(StageAspect::CaptureDetails);
        }

        match capture {
            Some(capture) => {
                if !had_capture || !self.selected_thread().is_valid() {
                    self.set_selected_thread(capture.main_thread_id());
                }
                self.set_profiler_mode(ProfilerMode::Expanded);
            }
            None => {
                self.set_selected_thread(NO_THREAD);
                self.set_profiler_mode(ProfilerMode::Normal);
            }
        }
    }

    /// Set the active capture and select its range on the timeline
    pub fn set_and_select_capture(&mut self, capture: Option<Arc<Capture>>) {
        self.set_capture(capture.clone());
        let Some(capture) = capture else {
            return;
        };

        self.set_streaming(false);
        self.timeline.view_range().set_span(capture.span());
        match capture.capture_node(capture.main_thread_id()) {
            Some(main) if self.clock_type() == ClockType::Thread => self.select_node(main),
            _ => self.timeline.selection().set_span(capture.span()),
        }
    }

    /// Select `node`'s interval, converted through the active clock
    pub fn select_node(&self, node: &CaptureNode) {
        let clock = self.clock_type();
        let projection = ClockProjection::for_node(clock, node);
        let interval = Span::new(node.start(clock), node.end(clock));
        self.timeline.selection().set_span(projection.to_selection(interval));
    }

    pub fn set_selected_thread(&mut self, thread: ThreadId) {
        if self.capture_model.set_thread(thread) {
            self.changed(StageAspect::SelectedThread);
            self.changed(StageAspect::CaptureDetails);
        }
    }

    pub fn set_capture_details(&mut self, kind: Option<DetailsKind>) {
        if self.capture_model.set_details(kind) {
            self.changed(StageAspect::CaptureDetails);
        }
    }

    /// Switch the details clock. The selection is not modified.
    pub fn set_clock_type(&mut self, clock: ClockType) {
        if self.capture_model.set_clock_type(clock) {
            self.changed(StageAspect::ClockType);
            self.changed(StageAspect::CaptureDetails);
        }
    }

    /// Select a configuration; separator and "edit" entries are ignored.
    /// Returns true if the active configuration changed.
    pub fn set_profiling_configuration(&mut self, entry: impl Into<ConfigurationEntry>) -> bool {
        match entry.into() {
            ConfigurationEntry::Config(config) if config != self.active_config => {
                debug!("Profiling configuration: {config}");
                self.active_config = config;
                self.changed(StageAspect::ProfilingConfiguration);
                true
            }
            ConfigurationEntry::Config(_) => false,
            entry @ (ConfigurationEntry::EditConfigurations | ConfigurationEntry::Separator) => {
                debug!("Ignoring non-selectable entry {entry:?}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{DeviceBehavior, SimulatedDevice};
    use std::cell::RefCell;
    use std::rc::Rc;

    const PID: u32 = 100;

    struct Fixture {
        _runtime: tokio::runtime::Runtime,
        device: SimulatedDevice,
        stage: CpuProfilerStage,
    }

    fn fixture(behavior: DeviceBehavior) -> Fixture {
        let runtime =
            tokio::runtime::Builder::new_multi_thread().worker_threads(2).enable_all().build().unwrap();
        let device = SimulatedDevice::new(PID).with_behavior(behavior);
        let stage = CpuProfilerStage::new(
            Arc::new(device.clone()),
            runtime.handle().clone(),
            StageOptions::default(),
        );
        Fixture { _runtime: runtime, device, stage }
    }

    fn record_states(stage: &mut CpuProfilerStage) -> Rc<RefCell<Vec<CaptureState>>> {
        let states = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&states);
        stage.on_change(StageAspect::CaptureState, move |stage| {
            sink.borrow_mut().push(stage.capture_state());
        });
        states
    }

    #[test]
    fn test_start_outside_idle_is_rejected() {
        let mut f = fixture(DeviceBehavior::default());
        f.stage.start_capturing().unwrap();
        let err = f.stage.start_capturing().unwrap_err();
        assert!(matches!(
            err,
            StageError::InvalidState { operation: "start capturing", state: CaptureState::Starting }
        ));
    }

    #[test]
    fn test_stop_outside_capturing_is_rejected() {
        let mut f = fixture(DeviceBehavior::default());
        assert!(matches!(f.stage.stop_capturing(), Err(StageError::InvalidState { .. })));
    }

    #[test]
    fn test_start_failure_returns_to_idle() {
        let mut f = fixture(DeviceBehavior { start_fails: true, ..DeviceBehavior::default() });
        let states = record_states(&mut f.stage);

        f.stage.start_capturing().unwrap();
        assert!(f.stage.settle());
        assert_eq!(*states.borrow(), vec![CaptureState::Starting, CaptureState::Idle]);
        assert!(f.stage.in_progress_durations().is_empty());
        assert!(f.stage.last_capture_metadata().is_none());
    }

    #[test]
    fn test_continuations_wait_for_main_context() {
        let mut f = fixture(DeviceBehavior::default());
        f.stage.start_capturing().unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(f.stage.capture_state(), CaptureState::Starting);
        assert!(f.stage.settle());
        assert_eq!(f.stage.capture_state(), CaptureState::Capturing);
    }

    #[test]
    fn test_elapsed_time_only_while_capturing() {
        let mut f = fixture(DeviceBehavior::default());
        f.stage.timeline().advance(1_000.0);
        assert_eq!(f.stage.capture_elapsed_time_us(), -1);

        f.stage.start_capturing().unwrap();
        f.stage.settle();
        f.stage.timeline().advance(3_500.0);
        assert_eq!(f.stage.capture_elapsed_time_us(), 2_500);
        assert_eq!(f.stage.in_progress_durations()[0].start_us, 1_000.0);

        f.stage.stop_capturing().unwrap();
        assert_eq!(f.stage.capture_elapsed_time_us(), -1);
    }

    #[test]
    fn test_sentinel_configuration_entries_are_ignored() {
        let mut f = fixture(DeviceBehavior::default());
        let before = f.stage.profiling_configuration().clone();

        assert!(!f.stage.set_profiling_configuration(ConfigurationEntry::EditConfigurations));
        assert!(!f.stage.set_profiling_configuration(ConfigurationEntry::Separator));
        assert_eq!(f.stage.profiling_configuration(), &before);

        assert!(f.stage.set_profiling_configuration(ProfilingConfiguration::system_trace()));
        assert!(!f.stage.set_profiling_configuration(ProfilingConfiguration::system_trace()));
        assert_eq!(f.stage.profiling_configuration().tool, tracedeck_common::ToolKind::Atrace);
    }

    #[test]
    fn test_set_capture_none_resets_thread_and_mode() {
        let mut f = fixture(DeviceBehavior::default());
        f.stage.start_capturing().unwrap();
        f.stage.settle();
        f.stage.stop_capturing().unwrap();
        f.stage.settle();
        assert_eq!(f.stage.profiler_mode(), ProfilerMode::Expanded);
        assert_eq!(f.stage.selected_thread(), ThreadId(100));

        f.stage.set_capture(None);
        assert_eq!(f.stage.profiler_mode(), ProfilerMode::Normal);
        assert_eq!(f.stage.selected_thread(), NO_THREAD);
        assert!(f.stage.capture_details().is_none());
        assert_eq!(f.device.stop_requests().len(), 1);
    }
}
