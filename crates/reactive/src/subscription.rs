//! Listener registration for state nodes.
//!
//! Every state node owns a `ListenerSet`. Parents register one notifier per
//! edge on their children, and consumers register callbacks through
//! `subscribe`. Notification walks a copy of the listener list taken when it
//! starts, so listeners may subscribe, unsubscribe or mutate state while a
//! notification is in flight.

use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt;
use ripple_core::Revision;

/// Unique identifier for a listener within one set.
pub type ListenerId = u64;

/// Callback type for revision notifications.
pub type RevisionCallback = Rc<dyn Fn(Revision)>;

/// A registered listener.
struct Listener {
    /// Unique identifier
    id: ListenerId,
    /// Callback to invoke on changes
    callback: RevisionCallback,
    /// Cleared on removal so an in-flight notification skips it
    active: Cell<bool>,
}

/// An ordered set of revision listeners.
pub struct ListenerSet {
    listeners: RefCell<Vec<Rc<Listener>>>,
    next_id: Cell<ListenerId>,
}

impl Default for ListenerSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet").field("len", &self.len()).finish()
    }
}

impl ListenerSet {
    /// Creates an empty listener set.
    pub fn new() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        }
    }

    /// Adds a listener and returns its ID.
    pub fn add<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(Revision) + 'static,
    {
        self.add_rc(Rc::new(callback))
    }

    /// Adds an already shared callback and returns its ID.
    pub fn add_rc(&self, callback: RevisionCallback) -> ListenerId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        self.listeners.borrow_mut().push(Rc::new(Listener {
            id,
            callback,
            active: Cell::new(true),
        }));

        id
    }

    /// Removes a listener by ID.
    ///
    /// Returns true if the listener was found and removed.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        match listeners.iter().position(|l| l.id == id) {
            Some(pos) => {
                let listener = listeners.remove(pos);
                listener.active.set(false);
                true
            }
            None => false,
        }
    }

    /// Invokes every listener registered before this call, in registration
    /// order, skipping any removed while the notification is running.
    pub fn notify(&self, revision: Revision) {
        let current: Vec<Rc<Listener>> = self.listeners.borrow().clone();
        for listener in current {
            if listener.active.get() {
                (listener.callback)(revision);
            }
        }
    }

    /// Returns the number of registered listeners.
    #[inline]
    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Returns true if there are no listeners.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }

    /// Returns true if a listener with this ID is registered.
    pub fn contains(&self, id: ListenerId) -> bool {
        self.listeners.borrow().iter().any(|l| l.id == id)
    }

    /// Removes every listener.
    pub fn clear(&self) {
        for listener in self.listeners.borrow_mut().drain(..) {
            listener.active.set(false);
        }
    }
}

/// Handle returned by `subscribe`; removes the callback when invoked.
///
/// Dropping the handle without calling [`Unsubscribe::unsubscribe`] leaves
/// the callback registered for the lifetime of the node.
pub struct Unsubscribe {
    set: Weak<ListenerSet>,
    id: ListenerId,
}

impl Unsubscribe {
    pub(crate) fn new(set: &Rc<ListenerSet>, id: ListenerId) -> Self {
        Self {
            set: Rc::downgrade(set),
            id,
        }
    }

    /// Returns the ID of the registered listener.
    #[inline]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Removes the callback.
    ///
    /// Returns false if it was already gone or the node no longer exists.
    pub fn unsubscribe(self) -> bool {
        match self.set.upgrade() {
            Some(set) => set.remove(self.id),
            None => false,
        }
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe").field("id", &self.id).finish()
    }
}
