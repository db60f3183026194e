//! Clock reference frames and selection re-projection.
//!
//! The timeline selection is always expressed in the wall clock (GLOBAL).
//! Details views can show the thread clock instead, in which case the range
//! they display is a linear rescale of the selection anchored at the selected
//! call-tree node:
//!
//! ```text
//! details  = t_start + r       * (selection - g_start)
//! selection = g_start + (1 / r) * (details   - t_start)
//! ```
//!
//! where `r = thread duration / global duration` of the node. Under GLOBAL
//! both directions are the identity.

use std::fmt;

use crate::capture::CaptureNode;
use crate::model::Span;

/// Reference frame for call-tree timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ClockType {
    /// Wall clock
    #[default]
    Global,
    /// Per-thread CPU time
    Thread,
}

impl fmt::Display for ClockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockType::Global => f.write_str("global"),
            ClockType::Thread => f.write_str("thread"),
        }
    }
}

/// Linear mapping between the selection (wall clock) and a details range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockProjection {
    clock: ClockType,
    global_start: f64,
    thread_start: f64,
    ratio: f64,
}

impl ClockProjection {
    /// Projection that leaves every span unchanged
    #[must_use]
    pub fn identity() -> Self {
        Self { clock: ClockType::Global, global_start: 0.0, thread_start: 0.0, ratio: 1.0 }
    }

    /// Projection anchored at `node` for the given clock
    #[must_use]
    pub fn for_node(clock: ClockType, node: &CaptureNode) -> Self {
        Self {
            clock,
            global_start: node.start(ClockType::Global),
            thread_start: node.start(ClockType::Thread),
            ratio: node.thread_global_ratio(),
        }
    }

    #[must_use]
    pub fn clock(&self) -> ClockType {
        self.clock
    }

    /// Map a wall-clock selection into the details range
    #[must_use]
    pub fn to_details(&self, selection: Span) -> Span {
        match self.clock {
            ClockType::Global => selection,
            ClockType::Thread => {
                let min = self.thread_start + self.ratio * (selection.min - self.global_start);
                Span::new(min, min + self.ratio * selection.length())
            }
        }
    }

    /// Map a details range back onto the wall-clock selection
    #[must_use]
    pub fn to_selection(&self, details: Span) -> Span {
        match self.clock {
            ClockType::Global => details,
            ClockType::Thread => {
                let thread_to_global = 1.0 / self.ratio;
                let min = self.global_start + thread_to_global * (details.min - self.thread_start);
                Span::new(min, min + thread_to_global * details.length())
            }
        }
    }
}

impl Default for ClockProjection {
    fn default() -> Self {
        Self::identity()
    }
}
