//! Single-flight capture cache.
//!
//! Maps a trace ID to the shared future of its parse. The first request for an
//! ID spawns the work (await bytes, size checks, decode on the blocking pool)
//! on the pooled runtime and stores the handle; every later request, whether
//! the parse is still running, finished or failed, gets a clone of that same
//! handle. A failed parse is terminal for its trace ID.

use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tracedeck_common::ToolKind;

use super::{decode_trace, Capture};
use crate::domain::{ParseError, TraceId};

/// Traces larger than this are refused unless the caller opts in
pub const DEFAULT_MAX_TRACE_SIZE: usize = 100 * 1024 * 1024;

/// Future shared by every caller waiting on the same trace
pub type CaptureFuture = Shared<BoxFuture<'static, Result<Arc<Capture>, ParseError>>>;

/// Byte source handed to [`CaptureParser::get_or_parse`]; only awaited on a miss
pub type TraceBytes = BoxFuture<'static, Result<Vec<u8>, ParseError>>;

/// How a trace should be parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Tool the trace is expected to come from
    pub tool: ToolKind,
    /// Skip the size ceiling
    pub allow_oversized: bool,
}

impl ParseOptions {
    #[must_use]
    pub fn new(tool: ToolKind) -> Self {
        Self { tool, allow_oversized: false }
    }
}

pub struct CaptureParser {
    runtime: Handle,
    max_trace_size: usize,
    entries: Mutex<HashMap<TraceId, CaptureFuture>>,
    parse_count: Arc<AtomicUsize>,
}

impl CaptureParser {
    /// Cache whose parses run on `runtime`
    #[must_use]
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            max_trace_size: DEFAULT_MAX_TRACE_SIZE,
            entries: Mutex::new(HashMap::new()),
            parse_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn with_max_trace_size(mut self, max_trace_size: usize) -> Self {
        self.max_trace_size = max_trace_size;
        self
    }

    #[must_use]
    pub fn max_trace_size(&self) -> usize {
        self.max_trace_size
    }

    /// Return the parse of `trace_id`, starting it if this is the first request.
    ///
    /// `source` is only called on a miss. Options are only honored by the call
    /// that starts the parse.
    pub fn get_or_parse(
        &self,
        trace_id: TraceId,
        source: impl FnOnce() -> TraceBytes,
        options: ParseOptions,
    ) -> CaptureFuture {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&trace_id) {
            debug!("Capture cache hit for {trace_id}");
            return existing.clone();
        }

        debug!("Capture cache miss for {trace_id}, parsing as {}", options.tool);
        let task = self.runtime.spawn(parse(
            trace_id,
            source(),
            options,
            self.max_trace_size,
            Arc::clone(&self.parse_count),
        ));
        let future: CaptureFuture = async move {
            task.await.map_err(|e| ParseError::Decode(format!("parse task failed: {e}")))?
        }
        .boxed()
        .shared();

        entries.insert(trace_id, future.clone());
        future
    }

    /// Whether a parse was ever requested for `trace_id`
    #[must_use]
    pub fn contains(&self, trace_id: TraceId) -> bool {
        self.entries.lock().contains_key(&trace_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Number of decodes actually run
    #[must_use]
    pub fn parse_count(&self) -> usize {
        self.parse_count.load(Ordering::SeqCst)
    }
}

async fn parse(
    trace_id: TraceId,
    bytes: TraceBytes,
    options: ParseOptions,
    max_trace_size: usize,
    parse_count: Arc<AtomicUsize>,
) -> Result<Arc<Capture>, ParseError> {
    let bytes = bytes.await?;
    let size = bytes.len();
    if size == 0 {
        return Err(ParseError::Empty);
    }
    if size > max_trace_size && !options.allow_oversized {
        warn!("{trace_id} is {size} bytes, over the {max_trace_size} byte limit");
        return Err(ParseError::TooLarge { size, max: max_trace_size });
    }

    let started = Instant::now();
    let decoded = tokio::task::spawn_blocking(move || {
        parse_count.fetch_add(1, Ordering::SeqCst);
        decode_trace(trace_id, &bytes, options.tool)
    })
    .await
    .map_err(|e| ParseError::Decode(format!("decoder panicked: {e}")))?;

    match decoded {
        Ok(capture) => {
            let elapsed = started.elapsed();
            debug!("Parsed {trace_id} ({size} bytes) in {elapsed:?}");
            Ok(Arc::new(capture.with_parse_stats(elapsed, size)))
        }
        Err(e) => {
            warn!("Failed to parse {trace_id}: {e}");
            Err(e)
        }
    }
}
