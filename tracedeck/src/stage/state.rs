//! Stage state and notification aspects.

use serde::Serialize;

/// Lifecycle of one capture attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CaptureState {
    #[default]
    Idle,
    Starting,
    Capturing,
    Stopping,
    Parsing,
    ParsingFailure,
}

/// Layout of the profiler window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfilerMode {
    #[default]
    Normal,
    /// A capture is selected and its details are shown
    Expanded,
}

/// Outcome of one capture attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaptureStatus {
    Success,
    StopCapturingFailure,
    ParsingFailure,
    UserAbortedParsing,
}

/// Open-ended duration marker drawn while a recording is in progress
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationData {
    pub start_us: f64,
    /// `u64::MAX` until the recording ends
    pub duration_us: u64,
}

impl DurationData {
    #[must_use]
    pub fn in_progress(start_us: f64) -> Self {
        Self { start_us, duration_us: u64::MAX }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.duration_us == u64::MAX
    }
}

/// Parts of the stage listeners can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageAspect {
    CaptureState,
    Capture,
    CaptureDetails,
    SelectedThread,
    ClockType,
    ProfilingConfiguration,
    ProfilerMode,
    Streaming,
}
