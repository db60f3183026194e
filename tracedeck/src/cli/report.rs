//! Plain-text rendering of a capture's details for the terminal.

// Durations are printed in milliseconds
#![allow(clippy::cast_precision_loss)]

use std::fmt::Write;

use crate::analysis::{BottomUpModel, TopDownModel, TopDownNode};
use crate::capture::{Capture, CaptureNode};
use crate::capture_model::Details;
use crate::clock::ClockType;
use crate::model::Range;

/// One-paragraph summary of a capture
#[must_use]
pub fn render_capture_summary(capture: &Capture) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} ({}): {:.2} ms, {} threads, {} bytes parsed in {:?}",
        capture.trace_id(),
        capture.tool(),
        capture.duration_us() / 1000.0,
        capture.threads().len(),
        capture.trace_size(),
        capture.parse_time(),
    );
    for thread in capture.threads() {
        let marker = if thread.id == capture.main_thread_id() { "*" } else { " " };
        let frames = capture.capture_node(thread.id).map_or(0, |root| root.subtree_size() - 1);
        let _ = writeln!(out, "  {marker} {:<10} {:<20} {frames} frames", thread.id.to_string(), thread.name);
    }
    out
}

/// Render `details`, listing at most `top` entries per level
#[must_use]
pub fn render_details(details: &Details, top: usize) -> String {
    match details {
        Details::CallChart { node: Some(node), range } => render_call_chart(node, range, top),
        Details::TopDown { model: Some(model) } => render_top_down(model, top),
        Details::BottomUp { model: Some(model) } => render_bottom_up(model, top),
        _ => "No call tree for the selected thread\n".to_string(),
    }
}

fn render_call_chart(root: &CaptureNode, range: &Range, top: usize) -> String {
    let span = range.span();
    let mut out = format!("CALL CHART [{:.3} ms .. {:.3} ms]\n", span.min / 1000.0, span.max / 1000.0);
    let mut printed = 0;
    let mut pending = vec![root];
    while let Some(node) = pending.pop() {
        if printed == top {
            break;
        }
        if !span.intersects(node.start(ClockType::Global), node.end(ClockType::Global)) {
            continue;
        }
        let _ = writeln!(
            out,
            "{:indent$}{} {:.3} ms",
            "",
            node.method(),
            node.duration(ClockType::Global) / 1000.0,
            indent = node.depth() * 2
        );
        printed += 1;
        pending.extend(node.children().iter().rev().map(AsRef::as_ref));
    }
    out
}

fn render_top_down(model: &TopDownModel, top: usize) -> String {
    let mut out = format!("TOP DOWN ({} clock)\n", model.clock());
    let (clock, span) = (model.clock(), model.range().span());

    let mut pending: Vec<(&TopDownNode, usize)> = vec![(model.root(), 0)];
    while let Some((node, depth)) = pending.pop() {
        let total = node.total(clock, span);
        if total <= 0.0 {
            continue;
        }
        let _ = writeln!(
            out,
            "{:indent$}{:<40} total {:>10.3} ms  self {:>10.3} ms  calls {}",
            "",
            node.method().to_string(),
            total / 1000.0,
            node.self_time(clock, span) / 1000.0,
            node.call_count(),
            indent = depth * 2
        );
        let mut children: Vec<&TopDownNode> = node.children().iter().collect();
        children.sort_by(|a, b| b.total(clock, span).total_cmp(&a.total(clock, span)));
        children.truncate(top);
        pending.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
    }
    out
}

fn render_bottom_up(model: &BottomUpModel, top: usize) -> String {
    let mut out = format!("BOTTOM UP ({} clock)\n", model.clock());
    let mut entries: Vec<_> = model.entries().iter().collect();
    entries.sort_by(|a, b| model.total(b).total_cmp(&model.total(a)));

    for entry in entries.into_iter().take(top) {
        let _ = writeln!(
            out,
            "{:<40} total {:>10.3} ms  self {:>10.3} ms  calls {}",
            entry.method().to_string(),
            model.total(entry) / 1000.0,
            model.self_time(entry) / 1000.0,
            entry.call_count(),
        );
        for caller in entry.callers().iter().take(3) {
            let _ = writeln!(
                out,
                "    ← {:<36} {:>10.3} ms",
                caller.method().to_string(),
                model.total(caller) / 1000.0
            );
        }
    }
    out
}
