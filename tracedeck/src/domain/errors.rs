//! Structured error types for tracedeck
//!
//! Using thiserror for automatic Display implementation and error chaining.

use thiserror::Error;
use tracedeck_common::ToolKind;

use super::types::TraceId;
use crate::stage::CaptureState;

/// The recording service refused a request or reported a failure status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordingError {
    #[error("Failed to start recording: {0}")]
    StartFailed(String),

    #[error("Failed to stop recording: {0}")]
    StopFailed(String),

    #[error("Failed to fetch {trace_id}: {reason}")]
    FetchFailed { trace_id: TraceId, reason: String },
}

/// Why a trace could not be turned into a capture.
///
/// `Clone` because one parse result is shared by every caller waiting on the
/// same trace ID.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Trace is empty")]
    Empty,

    #[error("Trace is too large to parse ({size} bytes, limit {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Trace was recorded with {found}, expected {expected}")]
    BadFormat { expected: ToolKind, found: ToolKind },

    #[error("Failed to decode trace: {0}")]
    Decode(String),

    #[error("Trace bytes unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the session controller's own operations.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Cannot {operation} while {state:?}")]
    InvalidState { operation: &'static str, state: CaptureState },
}
