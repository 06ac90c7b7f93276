//! Objects (spec.md §3 "Object", §4.1).

use std::rc::Rc;

use irmo_proto::Value;

use crate::callback::{CallbackHandle, DestroyCallback, ObjectCallbacks, VariableCallback};

pub type ObjectId = u16;

/// One instance of a class within a world.
///
/// `variable_time` is only present on objects living in a replicated
/// world (spec.md §3: "If the world is replicated, it additionally
/// carries a `variable_time[i]` vector"); it records the stream sequence
/// number at which each variable was last written, so a late-arriving
/// retransmission of an older change can be recognised and discarded
/// (spec.md §4.5 step 6).
pub struct Object {
    pub(crate) id: ObjectId,
    pub(crate) class_ordinal: u8,
    pub(crate) values: Vec<Value>,
    pub(crate) variable_time: Option<Vec<u32>>,
    pub(crate) callbacks: ObjectCallbacks,
}

impl Object {
    pub(crate) fn new(id: ObjectId, class_ordinal: u8, values: Vec<Value>, replicated: bool) -> Object {
        let nvars = values.len();
        Object {
            id,
            class_ordinal,
            variable_time: replicated.then(|| vec![0; nvars]),
            values,
            callbacks: ObjectCallbacks::new_for(nvars),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn class_ordinal(&self) -> u8 {
        self.class_ordinal
    }

    pub fn value(&self, ordinal: u8) -> Option<&Value> {
        self.values.get(ordinal as usize)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// The sequence number at which variable `ordinal` was last written,
    /// on a replicated world only. `None` on an authoritative world (no
    /// stream applies to it) or for an out-of-range ordinal.
    pub fn variable_time(&self, ordinal: u8) -> Option<u32> {
        self.variable_time.as_ref()?.get(ordinal as usize).copied()
    }

    /// Register an observer that fires when this specific object is
    /// destroyed (spec.md §4.2c).
    pub fn on_destroy(&self, f: impl FnMut(&Object) + 'static) -> Rc<CallbackHandle> {
        self.callbacks.destroy.register(Box::new(f) as Box<DestroyCallback>)
    }

    /// Register an observer that fires whenever any variable on this
    /// object changes.
    pub fn on_any_variable_change(&self, f: impl FnMut(&Object, u8) + 'static) -> Rc<CallbackHandle> {
        self.callbacks
            .any_variable
            .register(Box::new(f) as Box<VariableCallback>)
    }

    /// Register an observer on one specific variable of this object.
    /// Returns `None` if `ordinal` is out of range for the object's class.
    pub fn on_variable_change(
        &self,
        ordinal: u8,
        f: impl FnMut(&Object, u8) + 'static,
    ) -> Option<Rc<CallbackHandle>> {
        let list = self.callbacks.per_variable.get(ordinal as usize)?;
        Some(list.register(Box::new(f) as Box<VariableCallback>))
    }
}
