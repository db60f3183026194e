//! Aggregations over a thread's call tree
//!
//! Pure functions of (root node, clock, range): the details views rebuild
//! them whenever their inputs change and never mutate them.

pub mod bottom_up;
pub mod top_down;

pub use bottom_up::{BottomUpModel, BottomUpNode};
pub use top_down::{TopDownModel, TopDownNode};

use crate::capture::CaptureNode;
use crate::clock::ClockType;
use crate::model::Span;

/// Self time of `node` falling inside `span`
pub(crate) fn clipped_self_time(node: &CaptureNode, clock: ClockType, span: Span) -> f64 {
    let own = span.overlap(node.start(clock), node.end(clock));
    let children: f64 =
        node.children().iter().map(|c| span.overlap(c.start(clock), c.end(clock))).sum();
    (own - children).max(0.0)
}

/// Length of the union of `intervals` clipped to `span`.
///
/// Nested occurrences (recursion) are counted once.
pub(crate) fn clipped_union(mut intervals: Vec<(f64, f64)>, span: Span) -> f64 {
    intervals.retain(|(start, end)| span.intersects(*start, *end));
    intervals.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut total = 0.0;
    let mut current: Option<(f64, f64)> = None;
    for (start, end) in intervals {
        current = match current {
            Some((cur_start, cur_end)) if start <= cur_end => Some((cur_start, cur_end.max(end))),
            Some((cur_start, cur_end)) => {
                total += span.overlap(cur_start, cur_end);
                Some((start, end))
            }
            None => Some((start, end)),
        };
    }
    if let Some((start, end)) = current {
        total += span.overlap(start, end);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_merges_nested_and_overlapping() {
        let span = Span::new(0.0, 100.0);
        assert_eq!(clipped_union(vec![(0.0, 50.0), (10.0, 20.0), (40.0, 60.0)], span), 60.0);
        assert_eq!(clipped_union(vec![(0.0, 10.0), (20.0, 30.0)], span), 20.0);
        assert_eq!(clipped_union(Vec::new(), span), 0.0);
    }

    #[test]
    fn test_union_is_clipped() {
        let span = Span::new(25.0, 35.0);
        assert_eq!(clipped_union(vec![(0.0, 30.0), (32.0, 90.0), (50.0, 60.0)], span), 8.0);
    }
}
