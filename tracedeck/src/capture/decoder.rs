//! Trace decoding: raw trace bytes → [`Capture`].
//!
//! Traces are Chrome Trace Event documents (see `tracedeck-common`). Only
//! begin (`B`), end (`E`) and `thread_name` metadata records are used; other
//! phases are skipped, as the timeline exporter does.
//!
//! ## Call-tree reconstruction
//!
//! Records are grouped by thread, in file order. Each `B` pushes a frame, each
//! `E` pops the innermost open frame and attaches it to its parent. Frames
//! still open when a thread's records run out are closed at that thread's last
//! timestamp. Every thread gets a synthetic root spanning its first to last
//! record, named after the thread.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracedeck_common::{ToolKind, TraceFile, TraceRecord, PHASE_BEGIN, PHASE_END};

use super::{Capture, CaptureNode, MethodModel, ThreadInfo};
use crate::domain::{ParseError, ThreadId, TraceId};

/// Frame that has been entered but not yet exited
struct OpenFrame {
    method: MethodModel,
    start_global: f64,
    start_thread: f64,
    children: Vec<Arc<CaptureNode>>,
}

impl OpenFrame {
    fn close(self, end_global: f64, end_thread: f64, depth: usize) -> Arc<CaptureNode> {
        Arc::new(CaptureNode::new(
            self.method,
            (self.start_global, end_global),
            (self.start_thread, end_thread),
            depth,
            self.children,
        ))
    }
}

/// Per-thread decoding state
struct ThreadBuilder {
    tid: u32,
    root: OpenFrame,
    stack: Vec<OpenFrame>,
    last_global: f64,
    last_thread: f64,
    frames: usize,
}

impl ThreadBuilder {
    fn new(tid: u32, record: &TraceRecord, thread_time: f64) -> Self {
        Self {
            tid,
            root: OpenFrame {
                method: MethodModel::new("", format!("Thread {tid}")),
                start_global: record.ts,
                start_thread: thread_time,
                children: Vec::new(),
            },
            stack: Vec::new(),
            last_global: record.ts,
            last_thread: thread_time,
            frames: 0,
        }
    }

    fn apply(&mut self, record: &TraceRecord, thread_time: f64) -> Result<(), ParseError> {
        self.last_global = self.last_global.max(record.ts);
        self.last_thread = self.last_thread.max(thread_time);

        if record.ph == PHASE_BEGIN {
            self.stack.push(OpenFrame {
                method: MethodModel::new(record.cat.clone(), record.name.clone()),
                start_global: record.ts,
                start_thread: thread_time,
                children: Vec::new(),
            });
            self.frames += 1;
            return Ok(());
        }

        let frame = self.stack.pop().ok_or_else(|| {
            ParseError::Decode(format!("unmatched end record on thread {} at {}", self.tid, record.ts))
        })?;
        let node = frame.close(record.ts, thread_time, self.stack.len() + 1);
        self.parent().children.push(node);
        Ok(())
    }

    fn parent(&mut self) -> &mut OpenFrame {
        self.stack.last_mut().unwrap_or(&mut self.root)
    }

    fn finish(mut self, name: Option<&str>) -> Arc<CaptureNode> {
        while let Some(frame) = self.stack.pop() {
            let node = frame.close(self.last_global, self.last_thread, self.stack.len() + 1);
            self.parent().children.push(node);
        }
        if let Some(name) = name {
            self.root.method = MethodModel::new("", name);
        }
        let (end_global, end_thread) = (self.last_global, self.last_thread);
        self.root.close(end_global, end_thread, 0)
    }
}

/// Decode `bytes` as a trace recorded by `expected`.
///
/// # Errors
/// - [`ParseError::Empty`] for zero bytes
/// - [`ParseError::Decode`] for malformed documents, unbalanced frames or traces
///   without any frame
/// - [`ParseError::BadFormat`] if the trace was written by another tool
pub fn decode_trace(
    trace_id: TraceId,
    bytes: &[u8],
    expected: ToolKind,
) -> Result<Capture, ParseError> {
    if bytes.is_empty() {
        return Err(ParseError::Empty);
    }

    let trace = TraceFile::from_slice(bytes).map_err(|e| ParseError::Decode(e.to_string()))?;
    if trace.other_data.tool != expected {
        return Err(ParseError::BadFormat { expected, found: trace.other_data.tool });
    }

    let mut names: HashMap<u32, String> = HashMap::new();
    let mut builders: BTreeMap<u32, ThreadBuilder> = BTreeMap::new();
    let mut dual_clock = true;

    for record in &trace.trace_events {
        if let Some(name) = record.thread_name() {
            names.insert(record.tid, name.to_string());
            continue;
        }
        if record.ph != PHASE_BEGIN && record.ph != PHASE_END {
            continue;
        }

        let thread_time = record.tts.unwrap_or_else(|| {
            dual_clock = false;
            record.ts
        });
        builders
            .entry(record.tid)
            .or_insert_with(|| ThreadBuilder::new(record.tid, record, thread_time))
            .apply(record, thread_time)?;
    }

    if builders.values().all(|b| b.frames == 0) {
        return Err(ParseError::Decode("trace contains no call frames".to_string()));
    }

    let mut roots = HashMap::new();
    let mut threads = Vec::with_capacity(builders.len());
    for (tid, builder) in builders {
        let name = names.get(&tid).map(String::as_str);
        let root = builder.finish(name);
        threads.push(ThreadInfo { id: ThreadId::from(tid), name: root.method().name().to_string() });
        roots.insert(ThreadId::from(tid), root);
    }

    let process_thread = ThreadId::from(trace.other_data.pid);
    let main_thread = if roots.contains_key(&process_thread) {
        process_thread
    } else {
        threads[0].id
    };

    Ok(Capture::new(trace_id, expected, main_thread, threads, roots, dual_clock))
}
