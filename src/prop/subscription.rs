//! Subscriber slots and the RAII handles that own them.
//!
//! Each node keeps its observers in a small slot arena. A slot index is
//! stable for the lifetime of the subscription and carries a generation, so a
//! handle that outlives its slot (already removed, slot reused) is ignored
//! instead of removing somebody else's subscription.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::PropCell;

/// Something to tell when a node becomes dirty
#[derive(Clone)]
pub(crate) enum Listener {
    /// A dependent node; held weakly so observing never keeps it alive
    Node(Weak<PropCell>),
    /// An external callback (redraw, persistence, UI refresh)
    Callback(Rc<dyn Fn()>),
}

struct Slot {
    generation: u32,
    listener: Option<Listener>,
}

#[derive(Default)]
pub(crate) struct SubscriberList {
    slots: RefCell<Vec<Slot>>,
    free: RefCell<Vec<usize>>,
}

impl SubscriberList {
    pub(crate) fn insert(&self, listener: Listener) -> (usize, u32) {
        let mut slots = self.slots.borrow_mut();
        if let Some(index) = self.free.borrow_mut().pop() {
            let slot = &mut slots[index];
            slot.listener = Some(listener);
            return (index, slot.generation);
        }
        slots.push(Slot {
            generation: 0,
            listener: Some(listener),
        });
        (slots.len() - 1, 0)
    }

    pub(crate) fn remove(&self, index: usize, generation: u32) {
        let mut slots = self.slots.borrow_mut();
        let Some(slot) = slots.get_mut(index) else {
            return;
        };
        if slot.generation != generation || slot.listener.is_none() {
            return;
        }
        slot.listener = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.borrow_mut().push(index);
    }

    /// Live listeners, cloned out so callbacks may subscribe or unsubscribe
    /// while being notified.
    pub(crate) fn snapshot(&self) -> Vec<Listener> {
        self.slots
            .borrow()
            .iter()
            .filter_map(|slot| match &slot.listener {
                Some(Listener::Node(weak)) if weak.strong_count() == 0 => None,
                Some(listener) => Some(listener.clone()),
                None => None,
            })
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots
            .borrow()
            .iter()
            .filter(|slot| match &slot.listener {
                Some(Listener::Node(weak)) => weak.strong_count() > 0,
                Some(Listener::Callback(_)) => true,
                None => false,
            })
            .count()
    }
}

/// Handle for one observer registration; dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    source: Weak<PropCell>,
    index: usize,
    generation: u32,
}

impl Subscription {
    pub(crate) fn new(source: &Rc<PropCell>, listener: Listener) -> Self {
        let (index, generation) = source.subscribers.insert(listener);
        Subscription {
            source: Rc::downgrade(source),
            index,
            generation,
        }
    }

    /// Unsubscribe now (same as dropping the handle).
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(source) = self.source.upgrade() {
            source.subscribers.remove(self.index, self.generation);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("slot", &self.index)
            .field("generation", &self.generation)
            .field("live", &(self.source.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn callback() -> Listener {
        Listener::Callback(Rc::new(|| {}))
    }

    #[test]
    fn removed_slots_are_reused_with_new_generation() {
        let list = SubscriberList::default();
        let (a, gen_a) = list.insert(callback());
        let (b, _) = list.insert(callback());
        assert_eq!(list.len(), 2);

        list.remove(a, gen_a);
        assert_eq!(list.len(), 1);

        let (c, gen_c) = list.insert(callback());
        assert_eq!(c, a);
        assert_ne!(gen_c, gen_a);
        assert_ne!(b, c);
    }

    #[test]
    fn stale_generation_is_ignored() {
        let list = SubscriberList::default();
        let (a, gen_a) = list.insert(callback());
        list.remove(a, gen_a);
        let (_, _) = list.insert(callback());
        // The old handle must not remove the new occupant.
        list.remove(a, gen_a);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn snapshot_skips_dead_nodes() {
        let list = SubscriberList::default();
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        list.insert(Listener::Callback(Rc::new(move || counter.set(counter.get() + 1))));
        list.insert(Listener::Node(Weak::new()));
        let live = list.snapshot();
        assert_eq!(live.len(), 1);
        for listener in live {
            if let Listener::Callback(f) = listener {
                f();
            }
        }
        assert_eq!(hits.get(), 1);
    }
}
