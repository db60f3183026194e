//! Shared, observable numeric interval.
//!
//! A [`Range`] is a cheap handle (`Arc`) around a `{min, max}` pair. The
//! timeline owns the data / view / selection ranges, the capture model owns the
//! range shown by details, and any component holding a handle can read or write
//! it. Every mutation fires its listeners synchronously on the calling thread.
//!
//! Listeners run after the bounds lock is released, so a listener may write to
//! another range (or this one) without deadlocking. Bidirectional bindings
//! are responsible for their own re-entrancy guard.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::ListenerId;

/// Immutable snapshot of a range's bounds
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Span {
    pub min: f64,
    pub max: f64,
}

impl Span {
    /// Create a span, swapping the bounds if `min > max`
    #[must_use]
    pub fn new(min: f64, max: f64) -> Self {
        let mut span = Self { min, max };
        span.normalize();
        span
    }

    /// Distance between the bounds
    #[must_use]
    pub fn length(&self) -> f64 {
        self.max - self.min
    }

    /// Length of the overlap between this span and `[start, end]`
    #[must_use]
    pub fn overlap(&self, start: f64, end: f64) -> f64 {
        (self.max.min(end) - self.min.max(start)).max(0.0)
    }

    /// True if `[start, end]` intersects this span (touching counts)
    #[must_use]
    pub fn intersects(&self, start: f64, end: f64) -> bool {
        start <= self.max && end >= self.min
    }

    fn normalize(&mut self) {
        if self.min > self.max {
            std::mem::swap(&mut self.min, &mut self.max);
        }
    }
}

/// Callback fired with the new bounds after every mutation
pub type RangeListener = Arc<dyn Fn(Span) + Send + Sync>;

struct RangeInner {
    bounds: Mutex<Span>,
    listeners: Mutex<Vec<(ListenerId, RangeListener)>>,
    next_listener: AtomicU64,
}

/// Mutable interval shared by handle
#[derive(Clone)]
pub struct Range {
    inner: Arc<RangeInner>,
}

impl Range {
    #[must_use]
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            inner: Arc::new(RangeInner {
                bounds: Mutex::new(Span::new(min, max)),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
            }),
        }
    }

    /// Current bounds
    #[must_use]
    pub fn span(&self) -> Span {
        *self.inner.bounds.lock()
    }

    #[must_use]
    pub fn min(&self) -> f64 {
        self.span().min
    }

    #[must_use]
    pub fn max(&self) -> f64 {
        self.span().max
    }

    #[must_use]
    pub fn length(&self) -> f64 {
        self.span().length()
    }

    /// Replace both bounds; fires exactly one notification
    pub fn set(&self, min: f64, max: f64) {
        self.commit(|span| {
            span.min = min;
            span.max = max;
        });
    }

    pub fn set_span(&self, span: Span) {
        self.set(span.min, span.max);
    }

    pub fn set_min(&self, min: f64) {
        self.commit(|span| span.min = min);
    }

    pub fn set_max(&self, max: f64) {
        self.commit(|span| span.max = max);
    }

    /// Register a listener; it stays registered until removed or the last
    /// handle is dropped
    pub fn add_listener(&self, listener: impl Fn(Span) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Returns false if `id` was not registered on this range
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// True if both handles point at the same range
    #[must_use]
    pub fn ptr_eq(&self, other: &Range) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn commit(&self, update: impl FnOnce(&mut Span)) {
        let span = {
            let mut bounds = self.inner.bounds.lock();
            update(&mut bounds);
            bounds.normalize();
            *bounds
        };

        // Snapshot so listeners can add/remove listeners while being notified
        let listeners: Vec<RangeListener> =
            self.inner.listeners.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in listeners {
            listener(span);
        }
    }
}

impl Default for Range {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl fmt::Debug for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let span = self.span();
        f.debug_struct("Range").field("min", &span.min).field("max", &span.max).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting(range: &Range) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        range.add_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[test]
    fn test_set_fires_once_even_if_one_bound_changes() {
        let range = Range::new(0.0, 10.0);
        let count = counting(&range);

        range.set(0.0, 20.0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(range.span(), Span { min: 0.0, max: 20.0 });
    }

    #[test]
    fn test_set_fires_even_when_unchanged() {
        let range = Range::new(1.0, 2.0);
        let count = counting(&range);
        range.set(1.0, 2.0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_single_bound_setters_each_fire() {
        let range = Range::new(0.0, 10.0);
        let count = counting(&range);

        range.set_min(2.0);
        range.set_max(8.0);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(range.min(), 2.0);
        assert_eq!(range.max(), 8.0);
    }

    #[test]
    fn test_inverted_bounds_are_swapped() {
        let range = Range::new(5.0, 1.0);
        assert_eq!(range.span(), Span { min: 1.0, max: 5.0 });

        range.set_min(9.0);
        assert_eq!(range.span(), Span { min: 5.0, max: 9.0 });
    }

    #[test]
    fn test_listener_receives_new_bounds() {
        let range = Range::new(0.0, 1.0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        range.add_listener(move |span| sink.lock().push(span));

        range.set(3.0, 4.0);
        assert_eq!(*seen.lock(), vec![Span { min: 3.0, max: 4.0 }]);
    }

    #[test]
    fn test_removed_listener_is_not_called() {
        let range = Range::default();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let id = range.add_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(range.remove_listener(id));
        assert!(!range.remove_listener(id));
        range.set(1.0, 2.0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_clones_share_bounds() {
        let range = Range::new(0.0, 1.0);
        let handle = range.clone();
        handle.set(7.0, 8.0);
        assert_eq!(range.min(), 7.0);
        assert!(range.ptr_eq(&handle));
        assert!(!range.ptr_eq(&Range::new(7.0, 8.0)));
    }

    #[test]
    fn test_listener_may_write_other_range() {
        let source = Range::new(0.0, 1.0);
        let mirror = Range::new(0.0, 1.0);
        let target = mirror.clone();
        source.add_listener(move |span| target.set_span(span));

        source.set(2.0, 6.0);
        assert_eq!(mirror.span(), Span { min: 2.0, max: 6.0 });
    }

    #[test]
    fn test_span_overlap() {
        let span = Span::new(10.0, 20.0);
        assert_eq!(span.overlap(0.0, 15.0), 5.0);
        assert_eq!(span.overlap(12.0, 14.0), 2.0);
        assert_eq!(span.overlap(30.0, 40.0), 0.0);
        assert!(span.intersects(20.0, 25.0));
        assert!(!span.intersects(21.0, 25.0));
    }
}
