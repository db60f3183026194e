//! Decoded capture: the navigable result of parsing one trace.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracedeck_common::ToolKind;

use super::CaptureNode;
use crate::clock::ClockType;
use crate::domain::{ThreadId, TraceId};
use crate::model::Span;

/// A thread known to the capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub name: String,
}

/// Parsed trace. Immutable; shared as `Arc<Capture>` by the cache, the stage
/// and the capture model.
#[derive(Debug)]
pub struct Capture {
    trace_id: TraceId,
    tool: ToolKind,
    main_thread: ThreadId,
    /// Sorted by thread ID
    threads: Vec<ThreadInfo>,
    roots: HashMap<ThreadId, Arc<CaptureNode>>,
    span: Span,
    dual_clock: bool,
    parse_time: Duration,
    trace_size: usize,
}

impl Capture {
    pub(crate) fn new(
        trace_id: TraceId,
        tool: ToolKind,
        main_thread: ThreadId,
        threads: Vec<ThreadInfo>,
        roots: HashMap<ThreadId, Arc<CaptureNode>>,
        dual_clock: bool,
    ) -> Self {
        let span = roots
            .values()
            .map(|root| (root.start(ClockType::Global), root.end(ClockType::Global)))
            .reduce(|(min, max), (start, end)| (min.min(start), max.max(end)))
            .map_or_else(Span::default, |(min, max)| Span::new(min, max));

        Self {
            trace_id,
            tool,
            main_thread,
            threads,
            roots,
            span,
            dual_clock,
            parse_time: Duration::ZERO,
            trace_size: 0,
        }
    }

    /// Attach parse statistics (set once, before the capture is shared)
    #[must_use]
    pub(crate) fn with_parse_stats(mut self, parse_time: Duration, trace_size: usize) -> Self {
        self.parse_time = parse_time;
        self.trace_size = trace_size;
        self
    }

    #[must_use]
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    #[must_use]
    pub fn tool(&self) -> ToolKind {
        self.tool
    }

    #[must_use]
    pub fn main_thread_id(&self) -> ThreadId {
        self.main_thread
    }

    #[must_use]
    pub fn threads(&self) -> &[ThreadInfo] {
        &self.threads
    }

    /// Root of `thread`'s call tree, if the thread recorded any frame
    #[must_use]
    pub fn capture_node(&self, thread: ThreadId) -> Option<&Arc<CaptureNode>> {
        self.roots.get(&thread)
    }

    /// Wall-clock extent across all threads (microseconds)
    #[must_use]
    pub fn span(&self) -> Span {
        self.span
    }

    /// Whether the trace carried thread-clock timestamps
    #[must_use]
    pub fn is_dual_clock(&self) -> bool {
        self.dual_clock
    }

    /// Wall time spent decoding the trace
    #[must_use]
    pub fn parse_time(&self) -> Duration {
        self.parse_time
    }

    /// Size of the decoded trace in bytes
    #[must_use]
    pub fn trace_size(&self) -> usize {
        self.trace_size
    }

    /// Length of the recording in microseconds
    #[must_use]
    pub fn duration_us(&self) -> f64 {
        self.span.length()
    }
}
