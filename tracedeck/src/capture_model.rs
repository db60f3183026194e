//! Details builder.
//!
//! [`CaptureModel`] turns (capture, selected thread, details kind, clock) into
//! a [`Details`] value and keeps the range the details show in sync with the
//! timeline selection:
//!
//! ```text
//!   timeline selection (GLOBAL) ◄──── SelectionBinding ────► details range
//!                                  to_details / to_selection   (active clock)
//! ```
//!
//! Details are rebuilt from scratch whenever one of the four inputs changes.
//! Setters report whether anything changed so the owner only notifies on real
//! changes.

use log::debug;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::analysis::{BottomUpModel, TopDownModel};
use crate::capture::{Capture, CaptureNode};
use crate::clock::{ClockProjection, ClockType};
use crate::domain::{ThreadId, NO_THREAD};
use crate::model::{ListenerId, Range, Span};

/// Which view the details panel shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DetailsKind {
    #[default]
    CallChart,
    TopDown,
    BottomUp,
}

/// View derived from (capture, thread, kind). `None` inner values mean the
/// selected thread has no call tree.
#[derive(Debug, Clone)]
pub enum Details {
    CallChart { node: Option<Arc<CaptureNode>>, range: Range },
    TopDown { model: Option<TopDownModel> },
    BottomUp { model: Option<BottomUpModel> },
}

impl Details {
    #[must_use]
    pub fn kind(&self) -> DetailsKind {
        match self {
            Details::CallChart { .. } => DetailsKind::CallChart,
            Details::TopDown { .. } => DetailsKind::TopDown,
            Details::BottomUp { .. } => DetailsKind::BottomUp,
        }
    }

    /// True if the variant carries a node or model
    #[must_use]
    pub fn has_data(&self) -> bool {
        match self {
            Details::CallChart { node, .. } => node.is_some(),
            Details::TopDown { model } => model.is_some(),
            Details::BottomUp { model } => model.is_some(),
        }
    }

    fn build(
        kind: DetailsKind,
        root: Option<&Arc<CaptureNode>>,
        clock: ClockType,
        range: &Range,
    ) -> Self {
        match kind {
            DetailsKind::CallChart => Details::CallChart { node: root.cloned(), range: range.clone() },
            DetailsKind::TopDown => Details::TopDown {
                model: root.map(|root| TopDownModel::new(root, clock, range.clone())),
            },
            DetailsKind::BottomUp => Details::BottomUp {
                model: root.map(|root| BottomUpModel::new(root, clock, range.clone())),
            },
        }
    }
}

/// Two-way link between the selection and the details range.
///
/// Each side's listener writes the other through the current projection. The
/// shared flag is raised while a write is being propagated so the echo from
/// the other side is dropped.
struct SelectionBinding {
    selection: Range,
    details: Range,
    projection: Arc<Mutex<ClockProjection>>,
    propagating: Arc<AtomicBool>,
    listeners: [ListenerId; 2],
}

impl SelectionBinding {
    fn new(selection: Range, details: Range) -> Self {
        let projection = Arc::new(Mutex::new(ClockProjection::identity()));
        let propagating = Arc::new(AtomicBool::new(false));

        let forward = {
            let (target, projection, propagating) =
                (details.clone(), Arc::clone(&projection), Arc::clone(&propagating));
            selection.add_listener(move |span| {
                propagate(&propagating, || {
                    let mapped = projection.lock().to_details(span);
                    target.set_span(mapped);
                });
            })
        };
        let backward = {
            let (target, projection, propagating) =
                (selection.clone(), Arc::clone(&projection), Arc::clone(&propagating));
            details.add_listener(move |span| {
                propagate(&propagating, || {
                    let mapped = projection.lock().to_selection(span);
                    target.set_span(mapped);
                });
            })
        };

        let binding =
            Self { selection, details, projection, propagating, listeners: [forward, backward] };
        binding.resync();
        binding
    }

    fn projection(&self) -> ClockProjection {
        *self.projection.lock()
    }

    /// Install a new projection and re-derive the details range from the
    /// selection. The selection is left untouched.
    fn set_projection(&self, projection: ClockProjection) {
        *self.projection.lock() = projection;
        self.resync();
    }

    fn resync(&self) {
        let span = self.projection().to_details(self.selection.span());
        propagate(&self.propagating, || self.details.set_span(span));
    }
}

impl Drop for SelectionBinding {
    fn drop(&mut self) {
        // Listeners hold handles to the opposite range; removing them breaks the cycle
        self.selection.remove_listener(self.listeners[0]);
        self.details.remove_listener(self.listeners[1]);
    }
}

fn propagate(flag: &AtomicBool, write: impl FnOnce()) {
    if flag.swap(true, Ordering::SeqCst) {
        return;
    }
    write();
    flag.store(false, Ordering::SeqCst);
}

pub struct CaptureModel {
    capture: Option<Arc<Capture>>,
    thread: ThreadId,
    details_kind: Option<DetailsKind>,
    clock: ClockType,
    selection: Range,
    range: Range,
    binding: SelectionBinding,
    details: Option<Details>,
}

impl CaptureModel {
    /// Model bound to the timeline's `selection` range
    #[must_use]
    pub fn new(selection: Range) -> Self {
        let range = Range::default();
        let binding = SelectionBinding::new(selection.clone(), range.clone());
        Self {
            capture: None,
            thread: NO_THREAD,
            details_kind: Some(DetailsKind::CallChart),
            clock: ClockType::Global,
            selection,
            range,
            binding,
            details: None,
        }
    }

    #[must_use]
    pub fn capture(&self) -> Option<&Arc<Capture>> {
        self.capture.as_ref()
    }

    #[must_use]
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    #[must_use]
    pub fn details_kind(&self) -> Option<DetailsKind> {
        self.details_kind
    }

    #[must_use]
    pub fn clock_type(&self) -> ClockType {
        self.clock
    }

    #[must_use]
    pub fn details(&self) -> Option<&Details> {
        self.details.as_ref()
    }

    /// Range shown by details, in the active clock
    #[must_use]
    pub fn range(&self) -> &Range {
        &self.range
    }

    /// Timeline selection this model is bound to (always GLOBAL)
    #[must_use]
    pub fn selection(&self) -> &Range {
        &self.selection
    }

    /// Projection currently linking the selection to the details range
    #[must_use]
    pub fn projection(&self) -> ClockProjection {
        self.binding.projection()
    }

    /// Root of the selected thread's call tree
    #[must_use]
    pub fn thread_root(&self) -> Option<&Arc<CaptureNode>> {
        if !self.thread.is_valid() {
            return None;
        }
        self.capture.as_ref()?.capture_node(self.thread)
    }

    pub fn set_capture(&mut self, capture: Option<Arc<Capture>>) -> bool {
        let unchanged = match (&self.capture, &capture) {
            (None, None) => true,
            (Some(current), Some(new)) => Arc::ptr_eq(current, new),
            _ => false,
        };
        if unchanged {
            return false;
        }
        self.capture = capture;
        self.rebuild();
        true
    }

    pub fn set_thread(&mut self, thread: ThreadId) -> bool {
        if self.thread == thread {
            return false;
        }
        self.thread = thread;
        self.rebuild();
        true
    }

    pub fn set_details(&mut self, kind: Option<DetailsKind>) -> bool {
        if self.details_kind == kind {
            return false;
        }
        self.details_kind = kind;
        self.rebuild();
        true
    }

    pub fn set_clock_type(&mut self, clock: ClockType) -> bool {
        if self.clock == clock {
            return false;
        }
        self.clock = clock;
        self.rebuild();
        true
    }

    /// Write `span`, expressed in the details clock, into the selection
    pub fn select_details_span(&self, span: Span) {
        self.range.set_span(span);
    }

    fn rebuild(&mut self) {
        let root = self.thread_root().cloned();
        let projection = root
            .as_deref()
            .map_or_else(ClockProjection::identity, |node| ClockProjection::for_node(self.clock, node));
        self.binding.set_projection(projection);

        self.details = match (&self.capture, self.details_kind) {
            (Some(_), Some(kind)) => Some(Details::build(kind, root.as_ref(), self.clock, &self.range)),
            _ => None,
        };
        debug!(
            "Rebuilt details: kind={:?} thread={} clock={} node={}",
            self.details_kind,
            self.thread,
            self.clock,
            root.is_some()
        );
    }
}
