//! Typed synchronous event dispatch
//!
//! Every observable object in this crate (layers, sources, maps) owns one or
//! more [`EventTarget`]s. Listeners are registered with [`EventTarget::listen`]
//! and receive the event by mutable reference, so a dispatch can carry a
//! payload that listeners append to (the map's precompose event uses this to
//! collect layer states into the frame).
//!
//! Registration returns a [`ListenerHandle`]. Handles only hold a weak
//! reference to the registry, so cancelling after the target is gone, or
//! cancelling twice, is a harmless no-op.
//!
//! # Example
//!
//! ```rust
//! use cartolayer_core::events::{self, EventTarget};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let target = EventTarget::<u32>::new();
//! let sum = Rc::new(Cell::new(0));
//!
//! let sum_clone = sum.clone();
//! let mut handle = Some(target.listen(move |value| sum_clone.set(sum_clone.get() + *value)));
//!
//! target.notify(2);
//! events::unlisten(&mut handle);
//! target.notify(3);
//!
//! assert_eq!(sum.get(), 2);
//! assert!(handle.is_none());
//! ```

use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

new_key_type! {
    /// Unique identifier for a registered listener
    pub struct ListenerKey;
}

type Listener<E> = Rc<dyn Fn(&mut E)>;

struct ListenerEntry<E> {
    /// Registration order, used to keep dispatch order stable across slot reuse
    order: u64,
    listener: Listener<E>,
}

struct Registry<E> {
    entries: RefCell<SlotMap<ListenerKey, ListenerEntry<E>>>,
    next_order: Cell<u64>,
}

/// Type-erased view of a registry, so handles don't carry the event type
trait Unlisten {
    fn unlisten(&self, key: ListenerKey) -> bool;
    fn contains(&self, key: ListenerKey) -> bool;
}

impl<E> Unlisten for Registry<E> {
    fn unlisten(&self, key: ListenerKey) -> bool {
        self.entries.borrow_mut().remove(key).is_some()
    }

    fn contains(&self, key: ListenerKey) -> bool {
        self.entries.borrow().contains_key(key)
    }
}

/// A source of typed events with any number of listeners
pub struct EventTarget<E: 'static> {
    registry: Rc<Registry<E>>,
}

impl<E: 'static> EventTarget<E> {
    /// Create a target with no listeners
    pub fn new() -> Self {
        Self {
            registry: Rc::new(Registry {
                entries: RefCell::new(SlotMap::with_key()),
                next_order: Cell::new(0),
            }),
        }
    }

    /// Register a listener, returning the handle that cancels it
    #[must_use = "dropping the handle leaves the listener registered with no way to cancel it"]
    pub fn listen<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&mut E) + 'static,
    {
        let order = self.registry.next_order.get();
        self.registry.next_order.set(order + 1);

        let key = self.registry.entries.borrow_mut().insert(ListenerEntry {
            order,
            listener: Rc::new(listener),
        });

        let weak: Weak<Registry<E>> = Rc::downgrade(&self.registry);
        let registry: Weak<dyn Unlisten> = weak;
        ListenerHandle { key, registry }
    }

    /// Dispatch an event to all listeners in registration order
    ///
    /// Listeners are snapshotted before the first call, so listeners may
    /// register or cancel other listeners freely. A listener cancelled by an
    /// earlier listener in the same dispatch is skipped.
    pub fn dispatch(&self, event: &mut E) {
        let mut snapshot: SmallVec<[(u64, ListenerKey, Listener<E>); 4]> = self
            .registry
            .entries
            .borrow()
            .iter()
            .map(|(key, entry)| (entry.order, key, Rc::clone(&entry.listener)))
            .collect();
        snapshot.sort_unstable_by_key(|(order, _, _)| *order);

        for (_, key, listener) in snapshot {
            if !self.registry.contains(key) {
                continue;
            }
            listener(event);
        }
    }

    /// Dispatch an owned event
    pub fn notify(&self, mut event: E) {
        self.dispatch(&mut event);
    }

    /// Number of currently registered listeners
    pub fn listener_count(&self) -> usize {
        self.registry.entries.borrow().len()
    }

    pub fn has_listeners(&self) -> bool {
        self.listener_count() > 0
    }
}

impl<E: 'static> Default for EventTarget<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> fmt::Debug for EventTarget<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTarget")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Handle for cancelling a registered listener
pub struct ListenerHandle {
    key: ListenerKey,
    registry: Weak<dyn Unlisten>,
}

impl ListenerHandle {
    pub fn key(&self) -> ListenerKey {
        self.key
    }

    /// Whether the listener is still registered with a live target
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .map(|registry| registry.contains(self.key))
            .unwrap_or(false)
    }

    /// Remove the listener from its target
    ///
    /// Returns `true` if a listener was actually removed. Cancelling an
    /// already-cancelled handle, or one whose target was dropped, returns
    /// `false`.
    pub fn cancel(&self) -> bool {
        self.registry
            .upgrade()
            .map(|registry| registry.unlisten(self.key))
            .unwrap_or(false)
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("key", &self.key)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Cancel the listener held in `slot` and clear the slot
///
/// An empty slot is a no-op. Returns `true` if a live listener was removed.
pub fn unlisten(slot: &mut Option<ListenerHandle>) -> bool {
    slot.take().map(|handle| handle.cancel()).unwrap_or(false)
}
