//! Call-tree nodes.
//!
//! One [`CaptureNode`] per call-stack frame occurrence. Every node carries its
//! interval in both clock domains; the tree is immutable once decoded and is
//! shared between details views through `Arc`.

use std::fmt;
use std::sync::Arc;

use crate::clock::ClockType;

/// Identity of a method: two frames of the same method merge in aggregations
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodModel {
    class_name: String,
    name: String,
}

impl MethodModel {
    #[must_use]
    pub fn new(class_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self { class_name: class_name.into(), name: name.into() }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// `class.name`, or just `name` when the class is unknown
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.class_name.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.class_name, self.name)
        }
    }
}

impl fmt::Display for MethodModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// One frame occurrence in a thread's call tree
#[derive(Debug)]
pub struct CaptureNode {
    method: MethodModel,
    start_global: f64,
    end_global: f64,
    start_thread: f64,
    end_thread: f64,
    depth: usize,
    children: Vec<Arc<CaptureNode>>,
}

impl CaptureNode {
    /// Node with explicit depth and children (children must already be built)
    #[must_use]
    pub fn new(
        method: MethodModel,
        global: (f64, f64),
        thread: (f64, f64),
        depth: usize,
        children: Vec<Arc<CaptureNode>>,
    ) -> Self {
        Self {
            method,
            start_global: global.0,
            end_global: global.1,
            start_thread: thread.0,
            end_thread: thread.1,
            depth,
            children,
        }
    }

    /// Childless root-level node, mostly useful in tests
    #[must_use]
    pub fn leaf(
        method: MethodModel,
        start_global: f64,
        end_global: f64,
        start_thread: f64,
        end_thread: f64,
    ) -> Self {
        Self::new(method, (start_global, end_global), (start_thread, end_thread), 0, Vec::new())
    }

    #[must_use]
    pub fn method(&self) -> &MethodModel {
        &self.method
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[must_use]
    pub fn children(&self) -> &[Arc<CaptureNode>] {
        &self.children
    }

    #[must_use]
    pub fn start(&self, clock: ClockType) -> f64 {
        match clock {
            ClockType::Global => self.start_global,
            ClockType::Thread => self.start_thread,
        }
    }

    #[must_use]
    pub fn end(&self, clock: ClockType) -> f64 {
        match clock {
            ClockType::Global => self.end_global,
            ClockType::Thread => self.end_thread,
        }
    }

    #[must_use]
    pub fn duration(&self, clock: ClockType) -> f64 {
        self.end(clock) - self.start(clock)
    }

    /// Time spent in this frame but not in any child
    #[must_use]
    pub fn self_time(&self, clock: ClockType) -> f64 {
        let children: f64 = self.children.iter().map(|c| c.duration(clock)).sum();
        (self.duration(clock) - children).max(0.0)
    }

    /// Thread-clock duration divided by wall-clock duration.
    ///
    /// 1.0 when either duration is zero, so projections stay finite.
    #[must_use]
    pub fn thread_global_ratio(&self) -> f64 {
        let global = self.duration(ClockType::Global);
        let thread = self.duration(ClockType::Thread);
        if global > 0.0 && thread > 0.0 {
            thread / global
        } else {
            1.0
        }
    }

    /// Total number of nodes in this subtree, including this one
    #[must_use]
    pub fn subtree_size(&self) -> usize {
        let mut size = 0;
        let mut pending: Vec<&CaptureNode> = vec![self];
        while let Some(node) = pending.pop() {
            size += 1;
            pending.extend(node.children.iter().map(AsRef::as_ref));
        }
        size
    }
}

impl Drop for CaptureNode {
    // Iterative, call trees can be deeper than the native stack
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(child) = pending.pop() {
            if let Some(mut child) = Arc::into_inner(child) {
                pending.append(&mut child.children);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> CaptureNode {
        let child = Arc::new(CaptureNode::new(
            MethodModel::new("app.Io", "read"),
            (10.0, 30.0),
            (5.0, 10.0),
            2,
            Vec::new(),
        ));
        CaptureNode::new(MethodModel::new("app.Main", "run"), (0.0, 100.0), (0.0, 50.0), 1, vec![child])
    }

    #[test]
    fn test_method_full_name() {
        assert_eq!(MethodModel::new("app.Main", "run").full_name(), "app.Main.run");
        assert_eq!(MethodModel::new("", "main").full_name(), "main");
    }

    #[test]
    fn test_clock_accessors() {
        let node = tree();
        assert_eq!(node.duration(ClockType::Global), 100.0);
        assert_eq!(node.duration(ClockType::Thread), 50.0);
        assert_eq!(node.start(ClockType::Thread), 0.0);
        assert_eq!(node.end(ClockType::Global), 100.0);
    }

    #[test]
    fn test_self_time_excludes_children() {
        let node = tree();
        assert_eq!(node.self_time(ClockType::Global), 80.0);
        assert_eq!(node.self_time(ClockType::Thread), 45.0);
    }

    #[test]
    fn test_thread_global_ratio() {
        assert_eq!(tree().thread_global_ratio(), 0.5);
        let idle = CaptureNode::leaf(MethodModel::new("a", "b"), 0.0, 10.0, 3.0, 3.0);
        assert_eq!(idle.thread_global_ratio(), 1.0);
    }

    #[test]
    fn test_subtree_size() {
        assert_eq!(tree().subtree_size(), 2);
    }

    fn chain(depth: usize) -> Arc<CaptureNode> {
        let mut node = Arc::new(CaptureNode::leaf(MethodModel::new("app", "fib"), 0.0, 1.0, 0.0, 1.0));
        for level in (0..depth).rev() {
            let end = (depth - level) as f64 + 1.0;
            node = Arc::new(CaptureNode::new(
                MethodModel::new("app", "fib"),
                (0.0, end),
                (0.0, end),
                level,
                vec![node],
            ));
        }
        node
    }

    #[test]
    fn test_deep_tree_drops_without_overflow() {
        let root = chain(200_000);
        assert_eq!(root.subtree_size(), 200_001);
        drop(root);
    }

    #[test]
    fn test_shared_subtree_survives_parent_drop() {
        let root = chain(10);
        let inner = Arc::clone(&root.children()[0].children()[0]);
        drop(root);
        assert_eq!(inner.subtree_size(), 9);
        assert_eq!(inner.method().name(), "fib");
    }
}
