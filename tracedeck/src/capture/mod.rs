//! Decoded captures and the cache that produces them.

pub mod cache;
pub mod cpu_capture;
pub mod decoder;
pub mod node;

pub use cache::{CaptureFuture, CaptureParser, ParseOptions, TraceBytes, DEFAULT_MAX_TRACE_SIZE};
pub use cpu_capture::{Capture, ThreadInfo};
pub use decoder::decode_trace;
pub use node::{CaptureNode, MethodModel};
