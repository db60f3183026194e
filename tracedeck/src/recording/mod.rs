//! Recording service boundary.
//!
//! The stage talks to the device only through [`RecordingService`]. Every call
//! returns a boxed future that the stage awaits on the pooled runtime; the
//! service itself enforces any timeout.

pub mod replay;
pub mod simulated;

pub use replay::ReplayService;
pub use simulated::{synthesize_trace, DeviceBehavior, SimulatedDevice};

use futures::future::BoxFuture;
use tracedeck_common::ToolKind;

use crate::domain::{RecordingError, SessionId, TraceId};
use crate::stage::ProfilingConfiguration;

/// Reply to a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartResponse {
    pub session: SessionId,
}

/// Reply to a stop request; `trace_id` is `None` when the device produced no
/// usable trace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopResponse {
    pub trace_id: Option<TraceId>,
}

pub trait RecordingService: Send + Sync {
    fn start_recording(
        &self,
        config: &ProfilingConfiguration,
    ) -> BoxFuture<'static, Result<StartResponse, RecordingError>>;

    fn stop_recording(
        &self,
        session: SessionId,
        tool: ToolKind,
    ) -> BoxFuture<'static, Result<StopResponse, RecordingError>>;

    fn fetch_trace(&self, trace_id: TraceId) -> BoxFuture<'static, Result<Vec<u8>, RecordingError>>;
}
