//! Observable model primitives shared by the stage, the capture model and the
//! timeline: ranges with change listeners and per-aspect change notification.

pub mod aspect;
pub mod range;

pub use aspect::AspectModel;
pub use range::{Range, Span};

/// Handle returned when registering a listener; used to unregister it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);
