//! # Shared Trace Format (Device ↔ Host)
//!
//! Defines the trace interchange format written by the device-side recorder
//! and read back by the host-side decoder. Traces are Chrome Trace Event
//! documents: a `traceEvents` array of begin/end records plus an `otherData`
//! header naming the tool that produced them.
//!
//! ## Key Types
//!
//! - [`TraceFile`] - Whole trace document
//! - [`TraceHeader`] - Recording metadata (`otherData`)
//! - [`TraceRecord`] - One begin / end / metadata record
//! - [`ToolKind`] - Which profiler produced the trace
//! - [`TraceWriter`] - Builds well-formed traces (used by simulated devices and tests)
//!
//! ## Timestamps
//!
//! `ts` is the wall-clock timestamp and `tts` the thread-CPU timestamp, both in
//! microseconds. Records without `tts` only carry the wall clock; decoders treat
//! the thread clock as equal to the wall clock in that case.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;

pub mod writer;

pub use writer::TraceWriter;

// ============================================================================
// Phase Constants
// ============================================================================

/// Frame entered (method call starts)
pub const PHASE_BEGIN: &str = "B";

/// Frame exited (method call returns)
///
/// Paired with the most recent unmatched `PHASE_BEGIN` on the same thread.
pub const PHASE_END: &str = "E";

/// Metadata record (thread names)
pub const PHASE_METADATA: &str = "M";

/// Name of the metadata record carrying a thread name in `args.name`
pub const THREAD_NAME_RECORD: &str = "thread_name";

/// Display unit written into every trace
pub const DISPLAY_TIME_UNIT: &str = "ms";

// ============================================================================
// Tool Kind
// ============================================================================

/// Profiler that produced a trace.
///
/// The host decodes a trace with the tool of the configuration that started
/// the recording; a trace written by another tool is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// Android runtime method tracing (Java frames, dual clock)
    Art,
    /// Native sampling profiler (wall clock only)
    Simpleperf,
    /// System trace (wall clock only)
    Atrace,
}

impl ToolKind {
    /// Whether traces from this tool carry thread-clock timestamps
    #[must_use]
    pub fn records_thread_clock(self) -> bool {
        matches!(self, ToolKind::Art)
    }

    /// Lowercase name used in the trace header
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ToolKind::Art => "art",
            ToolKind::Simpleperf => "simpleperf",
            ToolKind::Atrace => "atrace",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Trace Document
// ============================================================================

/// One record of the `traceEvents` array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Method name (or `thread_name` for metadata)
    pub name: String,
    /// Declaring class / namespace of the method
    #[serde(default)]
    pub cat: String,
    /// Phase: "B" = begin, "E" = end, "M" = metadata
    pub ph: String,
    /// Wall-clock timestamp in microseconds
    #[serde(default)]
    pub ts: f64,
    /// Thread-clock timestamp in microseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tts: Option<f64>,
    /// Process ID
    #[serde(default)]
    pub pid: u32,
    /// Thread ID
    pub tid: u32,
    /// Optional arguments (metadata)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<HashMap<String, JsonValue>>,
}

impl TraceRecord {
    /// Thread name carried by a `thread_name` metadata record
    #[must_use]
    pub fn thread_name(&self) -> Option<&str> {
        if self.ph != PHASE_METADATA || self.name != THREAD_NAME_RECORD {
            return None;
        }
        self.args.as_ref()?.get("name")?.as_str()
    }
}

/// Recording metadata stored under `otherData`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceHeader {
    /// Tool that wrote the trace
    pub tool: ToolKind,
    /// Recorded process; its main thread has `tid == pid`
    pub pid: u32,
    /// Sampling interval used for sampled recordings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_interval_us: Option<u32>,
}

/// Complete trace document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceFile {
    #[serde(rename = "traceEvents")]
    pub trace_events: Vec<TraceRecord>,
    #[serde(rename = "otherData")]
    pub other_data: TraceHeader,
    #[serde(rename = "displayTimeUnit", default)]
    pub display_time_unit: String,
}

impl TraceFile {
    /// Parse a trace document from raw bytes
    ///
    /// # Errors
    /// Returns the JSON error if the bytes are not a trace document
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_kind_serializes_lowercase() {
        let json = serde_json::to_string(&ToolKind::Simpleperf).unwrap();
        assert_eq!(json, "\"simpleperf\"");
        assert_eq!(ToolKind::Art.to_string(), "art");
    }

    #[test]
    fn test_only_art_records_thread_clock() {
        assert!(ToolKind::Art.records_thread_clock());
        assert!(!ToolKind::Simpleperf.records_thread_clock());
        assert!(!ToolKind::Atrace.records_thread_clock());
    }

    #[test]
    fn test_thread_name_record() {
        let mut args = HashMap::new();
        args.insert("name".to_string(), serde_json::json!("main"));
        let record = TraceRecord {
            name: THREAD_NAME_RECORD.to_string(),
            cat: String::new(),
            ph: PHASE_METADATA.to_string(),
            ts: 0.0,
            tts: None,
            pid: 1,
            tid: 1,
            args: Some(args),
        };
        assert_eq!(record.thread_name(), Some("main"));

        let begin = TraceRecord { ph: PHASE_BEGIN.to_string(), ..record };
        assert_eq!(begin.thread_name(), None);
    }

    #[test]
    fn test_header_defaults_missing_fields() {
        let json = r#"{"traceEvents": [], "otherData": {"tool": "atrace", "pid": 7}}"#;
        let trace = TraceFile::from_slice(json.as_bytes()).unwrap();
        assert_eq!(trace.other_data.tool, ToolKind::Atrace);
        assert_eq!(trace.other_data.sampling_interval_us, None);
        assert!(trace.display_time_unit.is_empty());
    }
}
