//! Bottom-up (caller) aggregation.
//!
//! One top-level entry per method found in the thread. An entry's children
//! are the methods that called it, their children the callers of those calls,
//! and so on up to the thread root. Every entry, at any level, is measured on
//! the frames of the top-level method it belongs to:
//!
//! - `total` is the union of those frames' intervals, so a recursive method
//!   is not counted twice
//! - `self_time` sums their self times
//! - `call_count` is the number of frames
//!
//! The thread root itself only appears as a caller.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use super::{clipped_self_time, clipped_union};
use crate::capture::{CaptureNode, MethodModel};
use crate::clock::ClockType;
use crate::model::{Range, Span};

/// Caller stack of a frame, innermost first. Siblings share their parent's
/// links.
#[derive(Debug)]
struct CallerLink {
    method: MethodModel,
    parent: Option<Arc<CallerLink>>,
}

impl Drop for CallerLink {
    fn drop(&mut self) {
        let mut next = self.parent.take();
        while let Some(link) = next {
            next = Arc::into_inner(link).and_then(|mut link| link.parent.take());
        }
    }
}

/// One frame of the measured method and the next caller up from the
/// entry it is counted in
#[derive(Debug, Clone)]
struct Occurrence {
    node: Arc<CaptureNode>,
    caller: Option<Arc<CallerLink>>,
}

#[derive(Debug, Clone)]
pub struct BottomUpNode {
    method: MethodModel,
    occurrences: Vec<Occurrence>,
    /// Built on first access
    callers: OnceLock<Vec<BottomUpNode>>,
}

impl BottomUpNode {
    fn new(method: MethodModel, occurrences: Vec<Occurrence>) -> Self {
        Self { method, occurrences, callers: OnceLock::new() }
    }

    /// Groups occurrences by their next caller, one level up
    fn expand(&self) -> Vec<BottomUpNode> {
        let mut callers: Vec<BottomUpNode> = Vec::new();
        let mut index: HashMap<&MethodModel, usize> = HashMap::new();
        for occurrence in &self.occurrences {
            let Some(link) = occurrence.caller.as_ref() else {
                continue;
            };
            let slot = *index.entry(&link.method).or_insert_with(|| {
                callers.push(BottomUpNode::new(link.method.clone(), Vec::new()));
                callers.len() - 1
            });
            callers[slot].occurrences.push(Occurrence {
                node: Arc::clone(&occurrence.node),
                caller: link.parent.clone(),
            });
        }
        callers
    }

    #[must_use]
    pub fn method(&self) -> &MethodModel {
        &self.method
    }

    /// Methods that made these calls, in first-seen order
    #[must_use]
    pub fn callers(&self) -> &[BottomUpNode] {
        self.callers.get_or_init(|| self.expand())
    }

    #[must_use]
    pub fn caller(&self, method: &MethodModel) -> Option<&BottomUpNode> {
        self.callers().iter().find(|c| &c.method == method)
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.occurrences.len()
    }

    #[must_use]
    pub fn total(&self, clock: ClockType, span: Span) -> f64 {
        let intervals =
            self.occurrences.iter().map(|o| (o.node.start(clock), o.node.end(clock))).collect();
        clipped_union(intervals, span)
    }

    #[must_use]
    pub fn self_time(&self, clock: ClockType, span: Span) -> f64 {
        self.occurrences.iter().map(|o| clipped_self_time(&o.node, clock, span)).sum()
    }
}

impl Drop for BottomUpNode {
    fn drop(&mut self) {
        let mut pending = self.callers.take().unwrap_or_default();
        while let Some(mut node) = pending.pop() {
            pending.extend(node.callers.take().unwrap_or_default());
        }
    }
}

/// Bottom-up entries of one thread, measured against a shared range
#[derive(Debug, Clone)]
pub struct BottomUpModel {
    entries: Vec<BottomUpNode>,
    clock: ClockType,
    range: Range,
}

impl BottomUpModel {
    #[must_use]
    pub fn new(root: &Arc<CaptureNode>, clock: ClockType, range: Range) -> Self {
        let mut order: Vec<MethodModel> = Vec::new();
        let mut groups: HashMap<MethodModel, Vec<Occurrence>> = HashMap::new();

        // Iterative DFS carrying each node's caller chain
        let root_link = Arc::new(CallerLink { method: root.method().clone(), parent: None });
        let mut pending: Vec<(Arc<CaptureNode>, Arc<CallerLink>)> = root
            .children()
            .iter()
            .rev()
            .map(|child| (Arc::clone(child), Arc::clone(&root_link)))
            .collect();

        while let Some((node, caller)) = pending.pop() {
            if !node.children().is_empty() {
                let link = Arc::new(CallerLink {
                    method: node.method().clone(),
                    parent: Some(Arc::clone(&caller)),
                });
                for child in node.children().iter().rev() {
                    pending.push((Arc::clone(child), Arc::clone(&link)));
                }
            }

            groups
                .entry(node.method().clone())
                .or_insert_with(|| {
                    order.push(node.method().clone());
                    Vec::new()
                })
                .push(Occurrence { node, caller: Some(caller) });
        }

        let mut entries: Vec<BottomUpNode> = order
            .into_iter()
            .filter_map(|method| {
                let group = groups.remove(&method)?;
                Some(BottomUpNode::new(method, group))
            })
            .collect();

        let full = Span::new(root.start(clock), root.end(clock));
        entries.sort_by(|a, b| b.total(clock, full).total_cmp(&a.total(clock, full)));

        Self { entries, clock, range }
    }

    /// Entries sorted by total time over the whole thread, longest first
    #[must_use]
    pub fn entries(&self) -> &[BottomUpNode] {
        &self.entries
    }

    #[must_use]
    pub fn entry(&self, method: &MethodModel) -> Option<&BottomUpNode> {
        self.entries.iter().find(|e| &e.method == method)
    }

    #[must_use]
    pub fn clock(&self) -> ClockType {
        self.clock
    }

    #[must_use]
    pub fn range(&self) -> &Range {
        &self.range
    }

    #[must_use]
    pub fn total(&self, node: &BottomUpNode) -> f64 {
        node.total(self.clock, self.range.span())
    }

    #[must_use]
    pub fn self_time(&self, node: &BottomUpNode) -> f64 {
        node.self_time(self.clock, self.range.span())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(name: &str) -> MethodModel {
        MethodModel::new("app", name)
    }

    fn node(name: &str, start: f64, end: f64, depth: usize, children: Vec<Arc<CaptureNode>>) -> Arc<CaptureNode> {
        Arc::new(CaptureNode::new(method(name), (start, end), (start, end), depth, children))
    }

    /// main ─┬─ load ── read
    ///       └─ draw ─┬─ read
    ///                └─ fib ── fib
    fn thread_root() -> Arc<CaptureNode> {
        let load = node("load", 0.0, 30.0, 1, vec![node("read", 10.0, 20.0, 2, vec![])]);
        let fib = node("fib", 60.0, 90.0, 2, vec![node("fib", 70.0, 80.0, 3, vec![])]);
        let draw = node("draw", 40.0, 100.0, 1, vec![node("read", 40.0, 50.0, 2, vec![]), fib]);
        node("main", 0.0, 100.0, 0, vec![load, draw])
    }

    #[test]
    fn test_one_entry_per_method() {
        let model = BottomUpModel::new(&thread_root(), ClockType::Global, Range::new(0.0, 100.0));
        let mut names: Vec<&str> = model.entries().iter().map(|e| e.method().name()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["draw", "fib", "load", "read"]);
    }

    #[test]
    fn test_entries_sorted_by_total() {
        let model = BottomUpModel::new(&thread_root(), ClockType::Global, Range::new(0.0, 100.0));
        assert_eq!(model.entries()[0].method().name(), "draw");
    }

    #[test]
    fn test_callers_are_listed() {
        let model = BottomUpModel::new(&thread_root(), ClockType::Global, Range::new(0.0, 100.0));
        let read = model.entry(&method("read")).unwrap();
        assert_eq!(read.call_count(), 2);
        assert_eq!(model.total(read), 20.0);

        let via_draw = read.caller(&method("draw")).unwrap();
        assert_eq!(via_draw.call_count(), 1);
        assert_eq!(model.total(via_draw), 10.0);
        assert_eq!(via_draw.callers()[0].method().name(), "main");
    }

    #[test]
    fn test_recursion_not_double_counted() {
        let model = BottomUpModel::new(&thread_root(), ClockType::Global, Range::new(0.0, 100.0));
        let fib = model.entry(&method("fib")).unwrap();
        assert_eq!(fib.call_count(), 2);
        assert_eq!(model.total(fib), 30.0);
        assert_eq!(model.self_time(fib), 30.0);
        assert!(fib.caller(&method("fib")).is_some());
        assert!(fib.caller(&method("draw")).is_some());
    }

    #[test]
    fn test_root_only_appears_as_caller() {
        let model = BottomUpModel::new(&thread_root(), ClockType::Global, Range::new(0.0, 100.0));
        assert!(model.entry(&method("main")).is_none());
        assert!(model.entry(&method("load")).unwrap().caller(&method("main")).is_some());
    }

    #[test]
    fn test_totals_clip_to_range() {
        let range = Range::new(0.0, 100.0);
        let model = BottomUpModel::new(&thread_root(), ClockType::Global, range.clone());
        range.set(15.0, 45.0);
        let read = model.entry(&method("read")).unwrap();
        assert_eq!(model.total(read), 10.0);
        assert_eq!(model.self_time(read), 10.0);
    }

    #[test]
    fn test_deep_recursion() {
        const DEPTH: usize = 100_000;
        let end = 2.0 * DEPTH as f64;
        let mut chain = node("fib", (DEPTH - 1) as f64, end - (DEPTH - 1) as f64, DEPTH, vec![]);
        for depth in (1..DEPTH).rev() {
            let start = (depth - 1) as f64;
            chain = node("fib", start, end - start, depth, vec![chain]);
        }
        let root = node("main", 0.0, end, 0, vec![chain]);

        let model = BottomUpModel::new(&root, ClockType::Global, Range::new(0.0, end));
        assert_eq!(model.entries().len(), 1);
        let fib = model.entry(&method("fib")).unwrap();
        assert_eq!(fib.call_count(), DEPTH);
        assert_eq!(model.total(fib), end);

        let mut level = fib;
        for remaining in (DEPTH - 10..DEPTH).rev() {
            assert_eq!(level.callers().len(), 2);
            assert_eq!(level.caller(&method("main")).unwrap().call_count(), 1);
            level = level.caller(&method("fib")).unwrap();
            assert_eq!(level.call_count(), remaining);
        }

        drop(model);
        drop(root);
    }

    #[test]
    fn test_callers_are_stable_across_calls() {
        let model = BottomUpModel::new(&thread_root(), ClockType::Global, Range::new(0.0, 100.0));
        let read = model.entry(&method("read")).unwrap();
        let first = read.callers().as_ptr();
        assert_eq!(read.callers().as_ptr(), first);
        assert_eq!(read.callers().len(), 2);

        let copy = model.clone();
        assert_eq!(copy.entry(&method("read")).unwrap().callers().len(), 2);
    }
}
