//! Shared timeline ranges.
//!
//! Times are microseconds on the device's wall clock. The data range grows as
//! data arrives; while streaming, the view follows its upper bound.

use crate::model::Range;

#[derive(Debug)]
pub struct Timeline {
    data_range: Range,
    view_range: Range,
    selection: Range,
    tooltip: Range,
    streaming: bool,
}

impl Timeline {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data_range: Range::default(),
            view_range: Range::default(),
            selection: Range::default(),
            tooltip: Range::default(),
            streaming: false,
        }
    }

    #[must_use]
    pub fn data_range(&self) -> &Range {
        &self.data_range
    }

    #[must_use]
    pub fn view_range(&self) -> &Range {
        &self.view_range
    }

    #[must_use]
    pub fn selection(&self) -> &Range {
        &self.selection
    }

    #[must_use]
    pub fn tooltip(&self) -> &Range {
        &self.tooltip
    }

    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Returns true if the flag changed
    pub(crate) fn set_streaming(&mut self, streaming: bool) -> bool {
        if self.streaming == streaming {
            return false;
        }
        self.streaming = streaming;
        true
    }

    /// Extend the data range to `now_us`; the view slides along while streaming
    pub fn advance(&self, now_us: f64) {
        if now_us <= self.data_range.max() {
            return;
        }
        self.data_range.set_max(now_us);
        if self.streaming {
            let width = self.view_range.length();
            self.view_range.set(now_us - width, now_us);
        }
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}
