//! S1 — basic replication (spec.md §8 "S1").
//!
//! Validates:
//! - A pre-existing server object shows up in the client's replicated
//!   mirror after the handshake completes, with every variable at its
//!   default.
//! - A subsequent server-side mutation propagates to the client within one
//!   further round of ticks.

#[path = "common/mod.rs"]
mod common;

use std::rc::Rc;

use irmo_schema::{SchemaBuilder, ValueType};

fn schema() -> Rc<irmo_schema::Schema> {
    Rc::new(
        SchemaBuilder::new()
            .class("P", None, &[("x", ValueType::U32), ("s", ValueType::String)])
            .build()
            .unwrap(),
    )
}

#[test]
fn preexisting_object_mirrors_with_default_values() {
    let schema = schema();
    let mut pair = common::new_pair(schema, 1, 0.0);
    pair.server_world.borrow_mut().new_object("P").unwrap();
    assert!(pair.wait_connected(), "handshake never completed");

    let converged = pair.run_until(10, 200, |p| p.client_world.borrow().object_count() == 1);
    assert!(converged, "client never received the new-object atom");

    let client = pair.client_world.borrow();
    let obj = client.objects().next().unwrap();
    assert_eq!(obj.value(0), Some(&irmo_proto::Value::U32(0)));
    assert_eq!(obj.value(1), Some(&irmo_proto::Value::String(String::new())));
}

#[test]
fn server_mutation_propagates_to_the_client_mirror() {
    let schema = schema();
    let mut pair = common::connected_pair(schema, 2, 0.0);
    let id = pair.server_world.borrow_mut().new_object("P").unwrap();

    assert!(pair.run_until(10, 200, |p| p.client_world.borrow().object_count() == 1));

    pair.server_world.borrow_mut().set_int(id, "x", 42).unwrap();

    let converged = pair.run_until(10, 200, |p| {
        p.client_world
            .borrow()
            .objects()
            .next()
            .is_some_and(|o| o.value(0) == Some(&irmo_proto::Value::U32(42)))
    });
    assert!(converged, "client never saw x=42");

    let client = pair.client_world.borrow();
    let obj = client.objects().next().unwrap();
    assert_eq!(obj.value(1), Some(&irmo_proto::Value::String(String::new())));
}
