//! Per-aspect change notification.
//!
//! An [`AspectModel`] keeps one list of listeners per aspect value and invokes
//! the matching ones, in registration order, when the owner reports a change.
//! Listeners receive a shared reference to the subject so they can read the
//! state that changed. The model lives inside the subject; the subject detaches
//! it with [`std::mem::take`] while notifying (see `CpuProfilerStage::changed`).

use std::fmt;

use super::ListenerId;

type Listener<S> = Box<dyn FnMut(&S)>;

pub struct AspectModel<A, S> {
    listeners: Vec<(ListenerId, A, Listener<S>)>,
    next_id: u64,
}

impl<A: Copy + PartialEq, S> AspectModel<A, S> {
    #[must_use]
    pub fn new() -> Self {
        Self { listeners: Vec::new(), next_id: 0 }
    }

    /// Call `listener` every time `aspect` changes
    pub fn add_listener(&mut self, aspect: A, listener: impl FnMut(&S) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, aspect, Box::new(listener)));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _, _)| *existing != id);
        self.listeners.len() != before
    }

    /// Notify every listener registered for `aspect`
    pub fn changed(&mut self, aspect: A, subject: &S) {
        for (_, registered, listener) in &mut self.listeners {
            if *registered == aspect {
                listener(subject);
            }
        }
    }

    #[must_use]
    pub fn listener_count(&self, aspect: A) -> usize {
        self.listeners.iter().filter(|(_, registered, _)| *registered == aspect).count()
    }
}

impl<A: Copy + PartialEq, S> Default for AspectModel<A, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, S> fmt::Debug for AspectModel<A, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AspectModel").field("listeners", &self.listeners.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Aspect {
        Left,
        Right,
    }

    #[test]
    fn test_only_matching_aspect_fires() {
        let mut model: AspectModel<Aspect, u32> = AspectModel::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&seen);
        model.add_listener(Aspect::Left, move |value| sink.borrow_mut().push(("left", *value)));
        let sink = Rc::clone(&seen);
        model.add_listener(Aspect::Right, move |value| sink.borrow_mut().push(("right", *value)));

        model.changed(Aspect::Left, &7);
        assert_eq!(*seen.borrow(), vec![("left", 7)]);
        assert_eq!(model.listener_count(Aspect::Right), 1);
    }

    #[test]
    fn test_listeners_fire_in_registration_order() {
        let mut model: AspectModel<Aspect, ()> = AspectModel::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let sink = Rc::clone(&order);
            model.add_listener(Aspect::Left, move |()| sink.borrow_mut().push(i));
        }

        model.changed(Aspect::Left, &());
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_removed_listener_stops_firing() {
        let mut model: AspectModel<Aspect, ()> = AspectModel::new();
        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        let id = model.add_listener(Aspect::Left, move |()| *sink.borrow_mut() += 1);

        model.changed(Aspect::Left, &());
        assert!(model.remove_listener(id));
        model.changed(Aspect::Left, &());
        assert_eq!(*count.borrow(), 1);
    }
}
