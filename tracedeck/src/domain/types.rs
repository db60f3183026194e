//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers prevent common bugs like passing a trace ID where a
//! recording session ID is expected.

use std::fmt;

/// Thread ID of the profiled process
///
/// Negative values mean "no thread selected" (see [`NO_THREAD`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub i32);

/// Sentinel thread ID used when no thread is selected
pub const NO_THREAD: ThreadId = ThreadId(-1);

impl ThreadId {
    /// Returns true if this ID names a real thread (non-negative)
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "TID:{}", self.0)
        } else {
            f.write_str("TID:none")
        }
    }
}

impl From<u32> for ThreadId {
    #[allow(clippy::cast_possible_wrap)]
    fn from(tid: u32) -> Self {
        ThreadId(tid as i32)
    }
}

/// Trace identifier assigned by the recording service
///
/// The capture cache is keyed by this ID: one trace ID is parsed at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceId(pub i64);

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trace#{}", self.0)
    }
}

/// Recording session handle returned by a successful start request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}
