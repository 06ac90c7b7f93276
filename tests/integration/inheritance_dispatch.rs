//! Inheritance-aware dispatch across the wire (spec.md §8 property 5,
//! §4.2 "observer registration is inheritance-aware"). A parent-class
//! observer registered on the client must fire for instances of a child
//! class replicated from the server — both on creation and on a
//! variable change that only the parent declares.

#[path = "common/mod.rs"]
mod common;

use std::cell::RefCell;
use std::rc::Rc;

use irmo_proto::Value;
use irmo_schema::{SchemaBuilder, ValueType};

fn schema() -> Rc<irmo_schema::Schema> {
    Rc::new(
        SchemaBuilder::new()
            .class("Entity", None, &[("hp", ValueType::U32)])
            .class("Player", Some("Entity"), &[("name", ValueType::String)])
            .build()
            .unwrap(),
    )
}

#[test]
fn parent_class_observers_fire_for_replicated_child_instances() {
    let schema = schema();
    let mut pair = common::connected_pair(schema, 9, 0.0);

    let new_count = Rc::new(RefCell::new(0u32));
    let new_count2 = new_count.clone();
    let _new_handle = pair.client_world.borrow().on_class_new("Entity", move |_| *new_count2.borrow_mut() += 1).unwrap();

    let changes: Rc<RefCell<Vec<u32>>> = Rc::new(RefCell::new(Vec::new()));
    let changes2 = changes.clone();
    let _change_handle = pair
        .client_world
        .borrow()
        .on_class_variable_change("Entity", "hp", move |obj, _ordinal| {
            let Value::U32(hp) = obj.value(0).unwrap() else { panic!("hp must be u32") };
            changes2.borrow_mut().push(*hp);
        })
        .unwrap();

    let id = pair.server_world.borrow_mut().new_object("Player").unwrap();
    pair.server_world.borrow_mut().set_string(id, "name", "zara").unwrap();

    let created = pair.run_until(10, 200, |p| p.client_world.borrow().object_count() == 1);
    assert!(created, "child instance never replicated to the client");
    assert_eq!(*new_count.borrow(), 1, "parent-class on_class_new must fire for a child instance");

    pair.server_world.borrow_mut().set_int(id, "hp", 42).unwrap();
    let observed = pair.run_until(10, 200, |_| !changes.borrow().is_empty());
    assert!(observed, "parent-class on_class_variable_change never fired for the child's inherited hp write");
    assert_eq!(changes.borrow().as_slice(), &[42]);

    let client = pair.client_world.borrow();
    assert!(client.is_a(id, "Entity").unwrap(), "a Player instance must still be-a Entity on the client");
    assert!(client.is_a(id, "Player").unwrap());
    let obj = client.object(id).unwrap();
    assert_eq!(obj.value(0), Some(&Value::U32(42)));
    assert_eq!(obj.value(1), Some(&Value::String("zara".to_owned())));
}

#[test]
fn parent_class_observer_fires_when_a_child_instance_is_destroyed() {
    let schema = schema();
    let mut pair = common::connected_pair(schema, 10, 0.0);

    let id = pair.server_world.borrow_mut().new_object("Player").unwrap();
    let created = pair.run_until(10, 200, |p| p.client_world.borrow().object_count() == 1);
    assert!(created, "child instance never replicated to the client");

    let destroyed = Rc::new(RefCell::new(false));
    let destroyed2 = destroyed.clone();
    let _handle = pair
        .client_world
        .borrow()
        .on_class_destroy("Entity", move |_| *destroyed2.borrow_mut() = true)
        .unwrap();

    pair.server_world.borrow_mut().destroy(id).unwrap();
    let gone = pair.run_until(10, 200, |p| p.client_world.borrow().object_count() == 0);
    assert!(gone, "destroy atom never reached the client");
    assert!(*destroyed.borrow(), "parent-class on_class_destroy must fire for a destroyed child instance");
}
