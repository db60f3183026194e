//! Recording service that replays a trace file from disk.
//!
//! Every stop yields a fresh trace ID whose bytes are the file's current
//! content, so one file can be loaded several times in a session.

use futures::future::{BoxFuture, FutureExt};
use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tracedeck_common::ToolKind;

use super::{RecordingService, StartResponse, StopResponse};
use crate::domain::{RecordingError, SessionId, TraceId};
use crate::stage::ProfilingConfiguration;

#[derive(Debug)]
pub struct ReplayService {
    path: PathBuf,
    next_session: AtomicU64,
    next_trace: AtomicI64,
    /// Trace IDs handed out by stop, mapped to the file they replay
    traces: Arc<Mutex<HashMap<TraceId, PathBuf>>>,
}

impl ReplayService {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            next_session: AtomicU64::new(1),
            next_trace: AtomicI64::new(1),
            traces: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl RecordingService for ReplayService {
    fn start_recording(
        &self,
        config: &ProfilingConfiguration,
    ) -> BoxFuture<'static, Result<StartResponse, RecordingError>> {
        let session = SessionId(self.next_session.fetch_add(1, Ordering::SeqCst));
        debug!("Replaying {} for {session} ({config})", self.path.display());
        futures::future::ready(Ok(StartResponse { session })).boxed()
    }

    fn stop_recording(
        &self,
        session: SessionId,
        tool: ToolKind,
    ) -> BoxFuture<'static, Result<StopResponse, RecordingError>> {
        let trace_id = TraceId(self.next_trace.fetch_add(1, Ordering::SeqCst));
        debug!("Stopped {session} ({tool}), trace is {trace_id}");
        self.traces.lock().insert(trace_id, self.path.clone());
        futures::future::ready(Ok(StopResponse { trace_id: Some(trace_id) })).boxed()
    }

    fn fetch_trace(&self, trace_id: TraceId) -> BoxFuture<'static, Result<Vec<u8>, RecordingError>> {
        let path = self.traces.lock().get(&trace_id).cloned();
        async move {
            let path = path.ok_or_else(|| RecordingError::FetchFailed {
                trace_id,
                reason: "unknown trace".to_string(),
            })?;
            tokio::fs::read(&path).await.map_err(|e| RecordingError::FetchFailed {
                trace_id,
                reason: format!("{}: {e}", path.display()),
            })
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(future)
    }

    #[test]
    fn test_replays_file_content() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{\"traceEvents\":[]}").unwrap();
        let service = ReplayService::new(file.path());

        let config = ProfilingConfiguration::sampled_java();
        let start = block_on(service.start_recording(&config)).unwrap();
        let stop = block_on(service.stop_recording(start.session, config.tool)).unwrap();
        let bytes = block_on(service.fetch_trace(stop.trace_id.unwrap())).unwrap();
        assert_eq!(bytes, b"{\"traceEvents\":[]}");
    }

    #[test]
    fn test_each_stop_gets_new_trace_id() {
        let service = ReplayService::new("/nonexistent/trace.json");
        let first = block_on(service.stop_recording(SessionId(1), ToolKind::Art)).unwrap();
        let second = block_on(service.stop_recording(SessionId(2), ToolKind::Art)).unwrap();
        assert_ne!(first.trace_id, second.trace_id);
    }

    #[test]
    fn test_missing_file_is_fetch_failure() {
        let service = ReplayService::new("/nonexistent/trace.json");
        let stop = block_on(service.stop_recording(SessionId(1), ToolKind::Art)).unwrap();
        let err = block_on(service.fetch_trace(stop.trace_id.unwrap())).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/trace.json"));
    }

    #[test]
    fn test_unknown_trace_id() {
        let service = ReplayService::new("/tmp/x.json");
        assert!(block_on(service.fetch_trace(TraceId(77))).is_err());
    }
}
