//! Top-down (callee) aggregation.
//!
//! Frames reached through the same call path merge into one entry. The root
//! entry is the thread's root frame; an entry's children are the distinct
//! methods called from any of its occurrences, in first-seen order.
//!
//! ```text
//! main                    main
//! ├── load                ├── load      (2 calls)
//! │   └── read            │   ├── read  (2 calls)
//! ├── load         ──►    │   └── parse (1 call)
//! │   ├── read            └── draw      (1 call)
//! │   └── parse
//! └── draw
//! ```
//!
//! Timings are computed on demand against the model range so a moving
//! selection never requires a rebuild.

use std::collections::HashMap;
use std::sync::Arc;

use super::clipped_self_time;
use crate::capture::{CaptureNode, MethodModel};
use crate::clock::ClockType;
use crate::model::{Range, Span};

/// One call path in the top-down tree
#[derive(Debug, Clone)]
pub struct TopDownNode {
    method: MethodModel,
    occurrences: Vec<Arc<CaptureNode>>,
    children: Vec<TopDownNode>,
}

/// A call path whose children are still being built
struct Frame {
    method: MethodModel,
    occurrences: Vec<Arc<CaptureNode>>,
    groups: std::vec::IntoIter<(MethodModel, Vec<Arc<CaptureNode>>)>,
    children: Vec<TopDownNode>,
}

impl Frame {
    fn new(method: MethodModel, occurrences: Vec<Arc<CaptureNode>>) -> Self {
        let mut groups: Vec<(MethodModel, Vec<Arc<CaptureNode>>)> = Vec::new();
        let mut index: HashMap<MethodModel, usize> = HashMap::new();
        for child in occurrences.iter().flat_map(|o| o.children()) {
            let slot = *index.entry(child.method().clone()).or_insert_with(|| {
                groups.push((child.method().clone(), Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(Arc::clone(child));
        }
        Self { method, occurrences, groups: groups.into_iter(), children: Vec::new() }
    }

    fn finish(self) -> TopDownNode {
        TopDownNode { method: self.method, occurrences: self.occurrences, children: self.children }
    }
}

impl TopDownNode {
    /// Post-order build on an explicit stack of open frames
    fn build(method: MethodModel, occurrences: Vec<Arc<CaptureNode>>) -> Self {
        let mut current = Frame::new(method, occurrences);
        let mut parents: Vec<Frame> = Vec::new();
        loop {
            if let Some((method, group)) = current.groups.next() {
                parents.push(std::mem::replace(&mut current, Frame::new(method, group)));
                continue;
            }
            let node = current.finish();
            match parents.pop() {
                Some(mut parent) => {
                    parent.children.push(node);
                    current = parent;
                }
                None => return node,
            }
        }
    }

    #[must_use]
    pub fn method(&self) -> &MethodModel {
        &self.method
    }

    #[must_use]
    pub fn children(&self) -> &[TopDownNode] {
        &self.children
    }

    /// Number of frames merged into this entry
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.occurrences.len()
    }

    /// Time spent in this call path inside `span`
    #[must_use]
    pub fn total(&self, clock: ClockType, span: Span) -> f64 {
        self.occurrences.iter().map(|n| span.overlap(n.start(clock), n.end(clock))).sum()
    }

    /// Time spent in this call path, excluding its callees, inside `span`
    #[must_use]
    pub fn self_time(&self, clock: ClockType, span: Span) -> f64 {
        self.occurrences.iter().map(|n| clipped_self_time(n, clock, span)).sum()
    }

    /// Child entry for `method`, if it was called from this path
    #[must_use]
    pub fn child(&self, method: &MethodModel) -> Option<&TopDownNode> {
        self.children.iter().find(|c| &c.method == method)
    }
}

impl Drop for TopDownNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// Top-down tree of one thread, measured against a shared range
#[derive(Debug, Clone)]
pub struct TopDownModel {
    root: TopDownNode,
    clock: ClockType,
    range: Range,
}

impl TopDownModel {
    #[must_use]
    pub fn new(root: &Arc<CaptureNode>, clock: ClockType, range: Range) -> Self {
        Self { root: TopDownNode::build(root.method().clone(), vec![Arc::clone(root)]), clock, range }
    }

    #[must_use]
    pub fn root(&self) -> &TopDownNode {
        &self.root
    }

    #[must_use]
    pub fn clock(&self) -> ClockType {
        self.clock
    }

    /// Range the timings are clipped to (the details range)
    #[must_use]
    pub fn range(&self) -> &Range {
        &self.range
    }

    /// `node`'s total time in the current range
    #[must_use]
    pub fn total(&self, node: &TopDownNode) -> f64 {
        node.total(self.clock, self.range.span())
    }

    /// `node`'s self time in the current range
    #[must_use]
    pub fn self_time(&self, node: &TopDownNode) -> f64 {
        node.self_time(self.clock, self.range.span())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, start: f64, end: f64, depth: usize, children: Vec<Arc<CaptureNode>>) -> Arc<CaptureNode> {
        Arc::new(CaptureNode::new(
            MethodModel::new("app", name),
            (start, end),
            (start / 2.0, end / 2.0),
            depth,
            children,
        ))
    }

    /// main ─┬─ load ── read
    ///       ├─ load ─┬─ read
    ///       │        └─ parse
    ///       └─ draw
    fn thread_root() -> Arc<CaptureNode> {
        let first_load = node("load", 0.0, 20.0, 1, vec![node("read", 5.0, 15.0, 2, vec![])]);
        let second_load = node(
            "load",
            20.0,
            60.0,
            1,
            vec![node("read", 20.0, 30.0, 2, vec![]), node("parse", 30.0, 50.0, 2, vec![])],
        );
        let draw = node("draw", 60.0, 100.0, 1, vec![]);
        node("main", 0.0, 100.0, 0, vec![first_load, second_load, draw])
    }

    fn method(name: &str) -> MethodModel {
        MethodModel::new("app", name)
    }

    #[test]
    fn test_same_path_merges() {
        let model = TopDownModel::new(&thread_root(), ClockType::Global, Range::new(0.0, 100.0));
        let root = model.root();

        assert_eq!(root.children().len(), 2);
        let load = root.child(&method("load")).unwrap();
        assert_eq!(load.call_count(), 2);
        assert_eq!(model.total(load), 60.0);
        assert_eq!(model.self_time(load), 20.0);

        let read = load.child(&method("read")).unwrap();
        assert_eq!(read.call_count(), 2);
        assert_eq!(model.total(read), 20.0);
        assert_eq!(load.child(&method("parse")).unwrap().call_count(), 1);
    }

    #[test]
    fn test_children_keep_first_seen_order() {
        let model = TopDownModel::new(&thread_root(), ClockType::Global, Range::new(0.0, 100.0));
        let names: Vec<&str> = model.root().children().iter().map(|c| c.method().name()).collect();
        assert_eq!(names, vec!["load", "draw"]);
    }

    #[test]
    fn test_totals_follow_the_range() {
        let range = Range::new(0.0, 100.0);
        let model = TopDownModel::new(&thread_root(), ClockType::Global, range.clone());
        let draw = model.root().child(&method("draw")).unwrap();
        assert_eq!(model.total(draw), 40.0);

        range.set(50.0, 70.0);
        assert_eq!(model.total(draw), 10.0);
        assert_eq!(model.total(model.root()), 20.0);
    }

    #[test]
    fn test_thread_clock_uses_thread_intervals() {
        let model = TopDownModel::new(&thread_root(), ClockType::Thread, Range::new(0.0, 50.0));
        assert_eq!(model.clock(), ClockType::Thread);
        assert_eq!(model.total(model.root()), 50.0);
        let draw = model.root().child(&method("draw")).unwrap();
        assert_eq!(model.total(draw), 20.0);
    }

    #[test]
    fn test_deep_call_path() {
        const DEPTH: usize = 100_000;
        let mut chain = node("leaf", 0.0, 1.0, DEPTH, vec![]);
        for depth in (0..DEPTH).rev() {
            chain = node("step", 0.0, 2.0, depth, vec![chain]);
        }

        let model = TopDownModel::new(&chain, ClockType::Global, Range::new(0.0, 2.0));
        let mut entry = model.root();
        let mut levels = 1;
        while let Some(next) = entry.children().first() {
            entry = next;
            levels += 1;
        }
        assert_eq!(levels, DEPTH + 1);
        assert_eq!(entry.method().name(), "leaf");
        assert_eq!(model.total(entry), 1.0);

        drop(model);
        drop(chain);
    }
}
