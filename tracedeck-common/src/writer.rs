//! Trace writer used on the device side.
//!
//! Collects begin/end records per thread and serializes them as a
//! [`TraceFile`](crate::TraceFile). Thread-clock timestamps are only written
//! for tools that record them.

use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;

use crate::{
    ToolKind, TraceFile, TraceHeader, TraceRecord, DISPLAY_TIME_UNIT, PHASE_BEGIN, PHASE_END,
    PHASE_METADATA, THREAD_NAME_RECORD,
};

/// Builds a trace document record by record
#[derive(Debug, Clone)]
pub struct TraceWriter {
    header: TraceHeader,
    events: Vec<TraceRecord>,
    /// tid -> thread name, ordered so output is deterministic
    threads: BTreeMap<u32, String>,
}

impl TraceWriter {
    /// Create a writer for a recording of `pid` made with `tool`
    #[must_use]
    pub fn new(tool: ToolKind, pid: u32) -> Self {
        Self {
            header: TraceHeader { tool, pid, sampling_interval_us: None },
            events: Vec::new(),
            threads: BTreeMap::new(),
        }
    }

    /// Record the sampling interval in the header
    #[must_use]
    pub fn with_sampling_interval(mut self, interval_us: u32) -> Self {
        self.header.sampling_interval_us = Some(interval_us);
        self
    }

    /// Name a thread (emitted as a `thread_name` metadata record)
    pub fn thread(&mut self, tid: u32, name: impl Into<String>) -> &mut Self {
        self.threads.insert(tid, name.into());
        self
    }

    /// Open a frame on `tid`
    pub fn begin(
        &mut self,
        tid: u32,
        class_name: &str,
        method: &str,
        ts_us: f64,
        tts_us: f64,
    ) -> &mut Self {
        self.push(tid, PHASE_BEGIN, class_name, method, ts_us, tts_us);
        self
    }

    /// Close the innermost open frame on `tid`
    pub fn end(&mut self, tid: u32, ts_us: f64, tts_us: f64) -> &mut Self {
        self.push(tid, PHASE_END, "", "", ts_us, tts_us);
        self
    }

    fn push(&mut self, tid: u32, ph: &str, cat: &str, name: &str, ts: f64, tts: f64) {
        let tts = self.header.tool.records_thread_clock().then_some(tts);
        self.events.push(TraceRecord {
            name: name.to_string(),
            cat: cat.to_string(),
            ph: ph.to_string(),
            ts,
            tts,
            pid: self.header.pid,
            tid,
            args: None,
        });
    }

    /// Assemble the trace document
    #[must_use]
    pub fn build(&self) -> TraceFile {
        let mut trace_events = Vec::with_capacity(self.threads.len() + self.events.len());

        for (&tid, name) in &self.threads {
            let mut args = HashMap::new();
            args.insert("name".to_string(), JsonValue::from(name.as_str()));
            trace_events.push(TraceRecord {
                name: THREAD_NAME_RECORD.to_string(),
                cat: String::new(),
                ph: PHASE_METADATA.to_string(),
                ts: 0.0,
                tts: None,
                pid: self.header.pid,
                tid,
                args: Some(args),
            });
        }
        trace_events.extend(self.events.iter().cloned());

        TraceFile {
            trace_events,
            other_data: self.header.clone(),
            display_time_unit: DISPLAY_TIME_UNIT.to_string(),
        }
    }

    /// Serialize the trace to any writer (file, buffer, socket)
    ///
    /// # Errors
    /// Returns the serialization or I/O error from `serde_json`
    pub fn write_to<W: Write>(&self, writer: W) -> serde_json::Result<()> {
        serde_json::to_writer(writer, &self.build())
    }

    /// Serialize the trace into a byte buffer
    ///
    /// # Errors
    /// Returns the serialization error from `serde_json`
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.build())
    }
}
