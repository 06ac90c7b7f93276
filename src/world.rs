//! The world: the object store and its callback graph (spec.md §3 "World",
//! §4.1, §4.2).

use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::cell::RefCell;

use irmo_proto::Value;
use irmo_schema::{Schema, ValueType};

use crate::callback::{
    CallbackHandle, ClassCallbacks, DestroyCallback, GlobalCallbacks, MethodCall, MethodCallback,
    NewObjectCallback, ObserverList, VariableCallback,
};
use crate::error::{self, Error, Result};
use crate::object::{Object, ObjectId};
use crate::peer::PeerSink;

pub type WorldHandle = Rc<RefCell<World>>;

/// A container owning objects that conform to one [`Schema`] (spec.md §3
/// "World"). `authoritative` worlds are mutated directly by the
/// application; `replicated` worlds are mutated only by applying inbound
/// atoms (see [`crate::atom_apply`]) and reject direct mutation with
/// [`Error::ReadOnlyWorld`].
pub struct World {
    schema: Rc<Schema>,
    objects: HashMap<ObjectId, Object>,
    last_id: ObjectId,
    authoritative: bool,
    class_callbacks: Vec<ClassCallbacks>,
    global_callbacks: GlobalCallbacks,
    method_callbacks: Vec<Rc<ObserverList<MethodCallback>>>,
    /// Non-owning: peers that should be notified when this world's objects
    /// change. Populated by [`crate::server::Server`] when a peer
    /// publishing this world becomes `Connected` (spec.md §9 "Cyclic
    /// references" — the world holds the weak end, the peer holds the
    /// strong `world` handle).
    attached_peers: Vec<Weak<dyn PeerSink>>,
}

impl World {
    pub fn new(schema: Rc<Schema>, authoritative: bool) -> WorldHandle {
        let class_callbacks = schema
            .classes()
            .iter()
            .map(|c| ClassCallbacks::new_for(c.variables().len()))
            .collect();
        let method_callbacks = schema.methods().iter().map(|_| ObserverList::new()).collect();
        Rc::new(RefCell::new(World {
            schema,
            objects: HashMap::new(),
            last_id: 0,
            authoritative,
            class_callbacks,
            global_callbacks: GlobalCallbacks::new(),
            method_callbacks,
            attached_peers: Vec::new(),
        }))
    }

    pub fn schema(&self) -> &Rc<Schema> {
        &self.schema
    }

    pub fn authoritative(&self) -> bool {
        self.authoritative
    }

    pub fn object(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(&id)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn objects(&self) -> impl Iterator<Item = &Object> {
        self.objects.values()
    }

    pub(crate) fn attach_peer(&mut self, peer: Weak<dyn PeerSink>) {
        self.attached_peers.push(peer);
    }

    /// Live, `Connected` peers attached to this world, pruning dead weak
    /// references as a side effect.
    fn connected_peers(&mut self) -> Vec<Rc<dyn PeerSink>> {
        self.attached_peers.retain(|w| w.strong_count() > 0);
        self.attached_peers
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|p| p.is_connected())
            .collect()
    }

    // ---- mutation (spec.md §4.1) -------------------------------------

    pub fn new_object(&mut self, class_name: &str) -> Result<ObjectId> {
        error::note("new_object", self.new_object_inner(class_name))
    }

    fn new_object_inner(&mut self, class_name: &str) -> Result<ObjectId> {
        if !self.authoritative {
            return Err(Error::ReadOnlyWorld);
        }
        let class = self
            .schema
            .class_by_name(class_name)
            .ok_or_else(|| Error::UnknownClass(class_name.to_owned()))?;
        let class_ordinal = class.ordinal();
        let nvars = class.variables().len();
        let values: Vec<Value> = class.variables().iter().map(|v| Value::default_for(v.value_type)).collect();

        let id = self.allocate_id()?;
        self.objects.insert(id, Object::new(id, class_ordinal, values, false));
        let _ = nvars;

        self.raise_new_object(class_ordinal, id);
        for peer in self.connected_peers() {
            peer.enqueue_new_object(class_ordinal, id);
        }
        Ok(id)
    }

    /// Linear probe from `lastid + 1` mod 65536 for a free id (spec.md
    /// §4.1: "Allocates the next unused id by linear probing ... Fails
    /// WorldFull after a full sweep with no gap.").
    fn allocate_id(&mut self) -> Result<ObjectId> {
        let start = self.last_id.wrapping_add(1);
        let mut candidate = start;
        loop {
            if !self.objects.contains_key(&candidate) {
                self.last_id = candidate;
                return Ok(candidate);
            }
            candidate = candidate.wrapping_add(1);
            if candidate == start {
                return Err(Error::WorldFull);
            }
        }
    }

    pub fn destroy(&mut self, id: ObjectId) -> Result<()> {
        error::note("destroy", self.destroy_checked(id))
    }

    fn destroy_checked(&mut self, id: ObjectId) -> Result<()> {
        if !self.authoritative {
            return Err(Error::ReadOnlyWorld);
        }
        self.destroy_internal(id, true)
    }

    /// Destroy without the authoritative-world check, for atom application
    /// on a replicated world (spec.md §4.1: "On replicated worlds the
    /// operation must originate from atom application, not from the
    /// application.").
    pub(crate) fn apply_destroy(&mut self, id: ObjectId) -> Result<()> {
        self.destroy_internal(id, false)
    }

    fn destroy_internal(&mut self, id: ObjectId, notify_peers: bool) -> Result<()> {
        let class_ordinal = {
            let object = self.objects.get(&id).ok_or(Error::UnknownCallback)?;
            object.class_ordinal
        };
        self.raise_destroy(id, class_ordinal);
        if notify_peers {
            for peer in self.connected_peers() {
                peer.enqueue_destroy(id);
            }
        }
        self.objects.remove(&id);
        Ok(())
    }

    /// Destroy every object with no peer notification (spec.md §4.1
    /// "Ownership": "destroying the world destroys every object without
    /// notifying peers").
    pub fn clear(&mut self) {
        self.objects.clear();
    }

    pub fn set_int(&mut self, id: ObjectId, var_name: &str, value: u32) -> Result<()> {
        error::note("set_int", self.set_int_checked(id, var_name, value))
    }

    fn set_int_checked(&mut self, id: ObjectId, var_name: &str, value: u32) -> Result<()> {
        if !self.authoritative {
            return Err(Error::ReadOnlyWorld);
        }
        let ordinal = self.write_value(id, var_name, |value_type| {
            if value_type == ValueType::String {
                return Err(Error::TypeMismatch(var_name.to_owned()));
            }
            if !Value::fits(value, value_type) {
                return Err(Error::ValueTooWide(value, var_name.to_owned()));
            }
            Ok(match value_type {
                ValueType::U8 => Value::U8(value as u8),
                ValueType::U16 => Value::U16(value as u16),
                ValueType::U32 => Value::U32(value),
                ValueType::String => unreachable!(),
            })
        })?;
        self.after_local_change(id, ordinal);
        Ok(())
    }

    pub fn set_string(&mut self, id: ObjectId, var_name: &str, value: &str) -> Result<()> {
        error::note("set_string", self.set_string_checked(id, var_name, value))
    }

    fn set_string_checked(&mut self, id: ObjectId, var_name: &str, value: &str) -> Result<()> {
        if !self.authoritative {
            return Err(Error::ReadOnlyWorld);
        }
        let ordinal = self.write_value(id, var_name, |value_type| {
            if value_type != ValueType::String {
                return Err(Error::TypeMismatch(var_name.to_owned()));
            }
            Ok(Value::String(value.to_owned()))
        })?;
        self.after_local_change(id, ordinal);
        Ok(())
    }

    fn write_value(
        &mut self,
        id: ObjectId,
        var_name: &str,
        make_value: impl FnOnce(ValueType) -> Result<Value>,
    ) -> Result<u8> {
        let object = self.objects.get_mut(&id).ok_or(Error::UnknownCallback)?;
        let class = self.schema.class(object.class_ordinal).expect("object class always valid");
        let var = class
            .variable_by_name(var_name)
            .ok_or_else(|| Error::UnknownVariable(var_name.to_owned(), class.name().to_owned()))?;
        let ordinal = var.ordinal;
        let value_type = var.value_type;
        let value = make_value(value_type)?;
        object.values[ordinal as usize] = value;
        Ok(ordinal)
    }

    fn after_local_change(&mut self, id: ObjectId, ordinal: u8) {
        let class_ordinal = self.objects[&id].class_ordinal;
        self.raise_variable_change(id, class_ordinal, ordinal);
        let object = &self.objects[&id];
        let changes = vec![(ordinal, object.values[ordinal as usize].clone())];
        let nvars = self.schema.class(class_ordinal).expect("valid class").variables().len() as u8;
        for peer in self.connected_peers() {
            peer.enqueue_change(class_ordinal, id, changes.clone(), nvars);
        }
    }

    pub fn get_int(&self, id: ObjectId, var_name: &str) -> Result<u32> {
        error::note(
            "get_int",
            self.read_value(id, var_name)
                .and_then(|(value, _)| value.as_u32().ok_or_else(|| Error::TypeMismatch(var_name.to_owned()))),
        )
    }

    pub fn get_string(&self, id: ObjectId, var_name: &str) -> Result<String> {
        error::note(
            "get_string",
            self.read_value(id, var_name).and_then(|(value, _)| {
                value
                    .as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| Error::TypeMismatch(var_name.to_owned()))
            }),
        )
    }

    fn read_value(&self, id: ObjectId, var_name: &str) -> Result<(&Value, u8)> {
        let object = self.objects.get(&id).ok_or(Error::UnknownCallback)?;
        let class = self.schema.class(object.class_ordinal).expect("object class always valid");
        let var = class
            .variable_by_name(var_name)
            .ok_or_else(|| Error::UnknownVariable(var_name.to_owned(), class.name().to_owned()))?;
        Ok((&object.values[var.ordinal as usize], var.ordinal))
    }

    /// True iff the object's class equals or descends from `class_name`
    /// (spec.md §4.1 `is_a`).
    pub fn is_a(&self, id: ObjectId, class_name: &str) -> Result<bool> {
        error::note("is_a", self.is_a_checked(id, class_name))
    }

    fn is_a_checked(&self, id: ObjectId, class_name: &str) -> Result<bool> {
        let object = self.objects.get(&id).ok_or(Error::UnknownCallback)?;
        let ancestor = self
            .schema
            .class_by_name(class_name)
            .ok_or_else(|| Error::UnknownClass(class_name.to_owned()))?;
        Ok(self.schema.class_is_a(object.class_ordinal, ancestor.ordinal()))
    }

    /// Visit every object whose class is `class_name` or a subclass of it
    /// (inheritance-aware, spec.md §4.1 `foreach_object`). `class_name ==
    /// None` visits every object in the world.
    pub fn foreach_object(&self, class_name: Option<&str>, visitor: impl FnMut(&Object)) -> Result<()> {
        error::note("foreach_object", self.foreach_object_checked(class_name, visitor))
    }

    fn foreach_object_checked(&self, class_name: Option<&str>, mut visitor: impl FnMut(&Object)) -> Result<()> {
        let ancestor = match class_name {
            Some(name) => Some(
                self.schema
                    .class_by_name(name)
                    .ok_or_else(|| Error::UnknownClass(name.to_owned()))?
                    .ordinal(),
            ),
            None => None,
        };
        for object in self.objects.values() {
            let matches = match ancestor {
                Some(a) => self.schema.class_is_a(object.class_ordinal, a),
                None => true,
            };
            if matches {
                visitor(object);
            }
        }
        Ok(())
    }

    // ---- callback registration (spec.md §4.2) ------------------------

    pub fn on_class_new(&self, class_name: &str, f: impl FnMut(&Object) + 'static) -> Result<Rc<CallbackHandle>> {
        error::note(
            "on_class_new",
            self.class_callbacks(class_name)
                .map(|class| class.new.register(Box::new(f) as Box<NewObjectCallback>)),
        )
    }

    pub fn on_class_destroy(&self, class_name: &str, f: impl FnMut(&Object) + 'static) -> Result<Rc<CallbackHandle>> {
        error::note(
            "on_class_destroy",
            self.class_callbacks(class_name)
                .map(|class| class.destroy.register(Box::new(f) as Box<DestroyCallback>)),
        )
    }

    pub fn on_class_any_variable_change(
        &self,
        class_name: &str,
        f: impl FnMut(&Object, u8) + 'static,
    ) -> Result<Rc<CallbackHandle>> {
        error::note(
            "on_class_any_variable_change",
            self.class_callbacks(class_name)
                .map(|class| class.any_variable.register(Box::new(f) as Box<VariableCallback>)),
        )
    }

    pub fn on_class_variable_change(
        &self,
        class_name: &str,
        var_name: &str,
        f: impl FnMut(&Object, u8) + 'static,
    ) -> Result<Rc<CallbackHandle>> {
        error::note("on_class_variable_change", self.on_class_variable_change_checked(class_name, var_name, f))
    }

    fn on_class_variable_change_checked(
        &self,
        class_name: &str,
        var_name: &str,
        f: impl FnMut(&Object, u8) + 'static,
    ) -> Result<Rc<CallbackHandle>> {
        let class = self
            .schema
            .class_by_name(class_name)
            .ok_or_else(|| Error::UnknownClass(class_name.to_owned()))?;
        let ordinal = class
            .variable_by_name(var_name)
            .ok_or_else(|| Error::UnknownVariable(var_name.to_owned(), class_name.to_owned()))?
            .ordinal;
        let list = &self.class_callbacks[class.ordinal() as usize].per_variable[ordinal as usize];
        Ok(list.register(Box::new(f) as Box<VariableCallback>))
    }

    pub fn on_global_new(&self, f: impl FnMut(&Object) + 'static) -> Rc<CallbackHandle> {
        self.global_callbacks.new.register(Box::new(f) as Box<NewObjectCallback>)
    }

    pub fn on_global_destroy(&self, f: impl FnMut(&Object) + 'static) -> Rc<CallbackHandle> {
        self.global_callbacks
            .destroy
            .register(Box::new(f) as Box<DestroyCallback>)
    }

    pub fn on_global_any_variable_change(&self, f: impl FnMut(&Object, u8) + 'static) -> Rc<CallbackHandle> {
        self.global_callbacks
            .any_variable
            .register(Box::new(f) as Box<VariableCallback>)
    }

    pub fn on_method(&self, method_name: &str, f: impl FnMut(&MethodCall) + 'static) -> Result<Rc<CallbackHandle>> {
        error::note("on_method", self.on_method_checked(method_name, f))
    }

    fn on_method_checked(&self, method_name: &str, f: impl FnMut(&MethodCall) + 'static) -> Result<Rc<CallbackHandle>> {
        let method = self
            .schema
            .method_by_name(method_name)
            .ok_or_else(|| Error::UnknownMethod(method_name.to_owned()))?;
        Ok(self.method_callbacks[method.ordinal() as usize].register(Box::new(f) as Box<MethodCallback>))
    }

    fn class_callbacks(&self, class_name: &str) -> Result<&ClassCallbacks> {
        let class = self
            .schema
            .class_by_name(class_name)
            .ok_or_else(|| Error::UnknownClass(class_name.to_owned()))?;
        Ok(&self.class_callbacks[class.ordinal() as usize])
    }

    // ---- dispatch (spec.md §4.2 "Dispatch rules") --------------------

    pub(crate) fn raise_new_object(&mut self, class_ordinal: u8, id: ObjectId) {
        let object = &self.objects[&id];
        let mut ordinal = Some(class_ordinal);
        while let Some(c) = ordinal {
            for f in self.class_callbacks[c as usize].new.snapshot() {
                (f.borrow_mut())(object);
            }
            ordinal = self.schema.class(c).and_then(|c| c.parent_ordinal());
        }
        for f in self.global_callbacks.new.snapshot() {
            (f.borrow_mut())(object);
        }
    }

    pub(crate) fn raise_destroy(&mut self, id: ObjectId, class_ordinal: u8) {
        let object = &self.objects[&id];
        for f in object.callbacks.destroy.snapshot() {
            (f.borrow_mut())(object);
        }
        let mut ordinal = Some(class_ordinal);
        while let Some(c) = ordinal {
            for f in self.class_callbacks[c as usize].destroy.snapshot() {
                (f.borrow_mut())(object);
            }
            ordinal = self.schema.class(c).and_then(|c| c.parent_ordinal());
        }
        for f in self.global_callbacks.destroy.snapshot() {
            (f.borrow_mut())(object);
        }
    }

    pub(crate) fn raise_variable_change(&mut self, id: ObjectId, class_ordinal: u8, var_ordinal: u8) {
        let object = &self.objects[&id];

        for f in object.callbacks.any_variable.snapshot() {
            (f.borrow_mut())(object, var_ordinal);
        }
        if let Some(list) = object.callbacks.per_variable.get(var_ordinal as usize) {
            for f in list.snapshot() {
                (f.borrow_mut())(object, var_ordinal);
            }
        }

        let mut ordinal = Some(class_ordinal);
        while let Some(c) = ordinal {
            let class_cb = &self.class_callbacks[c as usize];
            if (var_ordinal as usize) < class_cb.per_variable.len() {
                for f in class_cb.per_variable[var_ordinal as usize].snapshot() {
                    (f.borrow_mut())(object, var_ordinal);
                }
            }
            for f in class_cb.any_variable.snapshot() {
                (f.borrow_mut())(object, var_ordinal);
            }
            ordinal = self.schema.class(c).and_then(|c| c.parent_ordinal());
        }

        for f in self.global_callbacks.any_variable.snapshot() {
            (f.borrow_mut())(object, var_ordinal);
        }
    }

    pub(crate) fn raise_method(&mut self, call: &MethodCall) {
        if let Some(list) = self.method_callbacks.get(call.method_ordinal as usize) {
            for f in list.snapshot() {
                (f.borrow_mut())(call);
            }
        }
    }

    /// Direct object-callback handle access, used by [`crate::atom_apply`]
    /// when applying an inbound new-object atom and by tests that want to
    /// register a per-object observer before the object escapes into the
    /// application.
    pub fn with_object(&self, id: ObjectId, f: impl FnOnce(&Object)) -> Result<()> {
        let object = self.objects.get(&id).ok_or(Error::UnknownCallback)?;
        f(object);
        Ok(())
    }

    // Used by atom application (crate::atom_apply) to bypass the
    // authoritative-world write path while still raising callbacks and
    // (for the rare republishing case) notifying attached peers.
    pub(crate) fn insert_replicated_object(&mut self, id: ObjectId, class_ordinal: u8, values: Vec<Value>) {
        self.objects.insert(id, Object::new(id, class_ordinal, values, true));
        self.raise_new_object(class_ordinal, id);
    }

    pub(crate) fn apply_variable_write(
        &mut self,
        id: ObjectId,
        ordinal: u8,
        value: Value,
        seq: u32,
    ) -> Result<()> {
        let object = self.objects.get_mut(&id).ok_or(Error::UnknownCallback)?;
        let class_ordinal = object.class_ordinal;
        let watermark = object
            .variable_time
            .as_ref()
            .and_then(|vt| vt.get(ordinal as usize))
            .copied()
            .unwrap_or(0);
        if seq <= watermark && watermark != 0 {
            return Ok(());
        }
        object.values[ordinal as usize] = value;
        if let Some(vt) = object.variable_time.as_mut() {
            vt[ordinal as usize] = seq;
        }
        self.raise_variable_change(id, class_ordinal, ordinal);
        Ok(())
    }
}
