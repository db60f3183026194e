//! Per-attempt capture metadata.
//!
//! One record per capture attempt, emitted as a JSON log line. Fields that do
//! not apply to the outcome are `-1`:
//!
//! | status                   | record | size | parse | capture |
//! |--------------------------|--------|------|-------|---------|
//! | `SUCCESS`                | ✓      | ✓    | ✓     | ✓       |
//! | `PARSING_FAILURE`        | -1     | ✓    | -1    | -1      |
//! | `USER_ABORTED_PARSING`   | -1     | ✓    | -1    | -1      |
//! | `STOP_CAPTURING_FAILURE` | -1     | -1   | -1    | -1      |

use serde::Serialize;
use std::time::Duration;

use super::{CaptureStatus, ProfilingConfiguration};
use crate::capture::Capture;

/// Value reported for fields that do not apply
pub const NOT_APPLICABLE: i64 = -1;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureMetadata {
    pub status: CaptureStatus,
    /// Configuration the recording was started with
    pub configuration: ProfilingConfiguration,
    pub record_duration_ms: i64,
    pub trace_size_bytes: i64,
    pub parsing_time_ms: i64,
    pub capture_duration_ms: i64,
}

impl CaptureMetadata {
    #[must_use]
    pub fn stop_failure(configuration: ProfilingConfiguration) -> Self {
        Self {
            status: CaptureStatus::StopCapturingFailure,
            configuration,
            record_duration_ms: NOT_APPLICABLE,
            trace_size_bytes: NOT_APPLICABLE,
            parsing_time_ms: NOT_APPLICABLE,
            capture_duration_ms: NOT_APPLICABLE,
        }
    }

    /// `status` is `ParsingFailure` or `UserAbortedParsing`
    #[must_use]
    pub fn parse_failure(
        status: CaptureStatus,
        configuration: ProfilingConfiguration,
        trace_size: usize,
    ) -> Self {
        Self {
            status,
            configuration,
            record_duration_ms: NOT_APPLICABLE,
            trace_size_bytes: bytes(trace_size),
            parsing_time_ms: NOT_APPLICABLE,
            capture_duration_ms: NOT_APPLICABLE,
        }
    }

    #[must_use]
    pub fn success(
        configuration: ProfilingConfiguration,
        record_duration: Duration,
        capture: &Capture,
    ) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let capture_duration_ms = (capture.duration_us() / 1000.0).round() as i64;
        Self {
            status: CaptureStatus::Success,
            configuration,
            record_duration_ms: millis(record_duration),
            trace_size_bytes: bytes(capture.trace_size()),
            parsing_time_ms: millis(capture.parse_time()),
            capture_duration_ms,
        }
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn bytes(size: usize) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}
