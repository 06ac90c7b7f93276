//! The observer graph (spec.md §4.2, §9 "Intrusive list of observers").
//!
//! Every list used below is an [`ObserverList<F>`]; registering against one
//! returns a type-erased [`CallbackHandle`] so callers can hold a
//! `Vec<CallbackHandle>` regardless of which kind of callback it came from.
//! `unset` is O(1): the handle captures a weak reference to the list plus
//! its own id and removes itself from the backing map directly, rather than
//! walking anything. Dispatch snapshots a list's entries (cloning the `Rc`s,
//! not the closures) before invoking them, so an observer is free to
//! register or unset other observers on the same list mid-dispatch without
//! invalidating the iteration (spec.md §5).

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::object::Object;

pub type ObserverId = u64;

/// A handle to one registered observer. Dropping it does *not* unregister
/// the observer — call [`CallbackHandle::unset`] explicitly, matching
/// spec.md §4.2's "opaque handle whose `unset` removes the observer."
pub struct CallbackHandle {
    unset_fn: RefCell<Option<Box<dyn FnOnce()>>>,
    on_unset: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl CallbackHandle {
    fn new(unset_fn: Box<dyn FnOnce()>) -> Rc<CallbackHandle> {
        Rc::new(CallbackHandle {
            unset_fn: RefCell::new(Some(unset_fn)),
            on_unset: RefCell::new(Vec::new()),
        })
    }

    /// Remove the observer this handle refers to. Idempotent: unsetting an
    /// already-unset handle is a no-op. Fires any teardown chains attached
    /// via [`CallbackHandle::on_unset`] first, so children observe their
    /// parent's removal before the parent's own list entry disappears.
    pub fn unset(&self) {
        for f in self.on_unset.borrow_mut().drain(..) {
            f();
        }
        if let Some(f) = self.unset_fn.borrow_mut().take() {
            f();
        }
    }

    pub fn is_set(&self) -> bool {
        self.unset_fn.borrow().is_some()
    }

    /// Attach a teardown action that fires when this handle is unset —
    /// the mechanism behind "cascading destroy-of-callback observers"
    /// (spec.md §9): a handle that owns child handles can register each
    /// child's `unset` as one of these, so dropping the parent tears down
    /// the whole chain.
    pub fn on_unset(&self, f: impl FnOnce() + 'static) {
        self.on_unset.borrow_mut().push(Box::new(f));
    }
}

/// An observer list for callbacks of signature `F`. `F` is one of the
/// `dyn FnMut(...)` aliases below; never constructed directly by callers.
pub(crate) struct ObserverList<F: ?Sized + 'static> {
    next_id: Cell<ObserverId>,
    entries: RefCell<HashMap<ObserverId, Rc<RefCell<Box<F>>>>>,
}

impl<F: ?Sized + 'static> ObserverList<F> {
    pub fn new() -> Rc<Self> {
        Rc::new(ObserverList {
            next_id: Cell::new(0),
            entries: RefCell::new(HashMap::new()),
        })
    }

    pub fn register(self: &Rc<Self>, f: Box<F>) -> Rc<CallbackHandle> {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.entries.borrow_mut().insert(id, Rc::new(RefCell::new(f)));

        let weak = Rc::downgrade(self);
        CallbackHandle::new(Box::new(move || {
            if let Some(list) = weak.upgrade() {
                list.entries.borrow_mut().remove(&id);
            }
        }))
    }

    pub fn snapshot(&self) -> Vec<Rc<RefCell<Box<F>>>> {
        self.entries.borrow().values().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

pub type NewObjectCallback = dyn FnMut(&Object);
pub type DestroyCallback = dyn FnMut(&Object);
pub type VariableCallback = dyn FnMut(&Object, u8);

/// A method invocation as delivered to its registered observers (spec.md
/// §4.8 "method" apply row: "assemble method-data record ... stamp
/// source = originating peer").
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method_ordinal: u8,
    pub arguments: Vec<irmo_proto::Value>,
    /// Opaque identity of the peer the invocation arrived from; `None` for
    /// a locally-originated call on an authoritative world (there is no
    /// remote source to stamp).
    pub source: Option<String>,
}

pub type MethodCallback = dyn FnMut(&MethodCall);

/// The four observer lists attached to one class (spec.md §4.2a), plus
/// per-variable lists sized to the class's full (inherited-inclusive)
/// variable count.
pub(crate) struct ClassCallbacks {
    pub new: Rc<ObserverList<NewObjectCallback>>,
    pub destroy: Rc<ObserverList<DestroyCallback>>,
    pub any_variable: Rc<ObserverList<VariableCallback>>,
    pub per_variable: Vec<Rc<ObserverList<VariableCallback>>>,
}

impl ClassCallbacks {
    pub fn new_for(nvars: usize) -> Self {
        ClassCallbacks {
            new: ObserverList::new(),
            destroy: ObserverList::new(),
            any_variable: ObserverList::new(),
            per_variable: (0..nvars).map(|_| ObserverList::new()).collect(),
        }
    }
}

/// The synthetic "any class" root (spec.md §4.2b).
pub(crate) struct GlobalCallbacks {
    pub new: Rc<ObserverList<NewObjectCallback>>,
    pub destroy: Rc<ObserverList<DestroyCallback>>,
    pub any_variable: Rc<ObserverList<VariableCallback>>,
}

impl GlobalCallbacks {
    pub fn new() -> Self {
        GlobalCallbacks {
            new: ObserverList::new(),
            destroy: ObserverList::new(),
            any_variable: ObserverList::new(),
        }
    }
}

/// Per-object observers (spec.md §4.2c): destroy, any-variable, and
/// per-variable, sized to the object's class.
pub(crate) struct ObjectCallbacks {
    pub destroy: Rc<ObserverList<DestroyCallback>>,
    pub any_variable: Rc<ObserverList<VariableCallback>>,
    pub per_variable: Vec<Rc<ObserverList<VariableCallback>>>,
}

impl ObjectCallbacks {
    pub fn new_for(nvars: usize) -> Self {
        ObjectCallbacks {
            destroy: ObserverList::new(),
            any_variable: ObserverList::new(),
            per_variable: (0..nvars).map(|_| ObserverList::new()).collect(),
        }
    }
}
