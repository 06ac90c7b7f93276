//! S4 — method round trip (spec.md §8 "S4", §4.8 "method" apply row).
//!
//! The client invokes `hit(damage: u16, attacker: string)` against the
//! connected server. The server's registered observer must see the
//! arguments intact and `source` stamped with the originating peer's
//! identity — methods are fire-and-forget, not replicated state, so this
//! is the only way a caller on one side learns anything reached the other.

#[path = "common/mod.rs"]
mod common;

use std::cell::RefCell;
use std::rc::Rc;

use irmo::MethodCall;
use irmo_proto::Value;
use irmo_schema::{SchemaBuilder, ValueType};

fn schema() -> Rc<irmo_schema::Schema> {
    Rc::new(
        SchemaBuilder::new()
            .method("hit", &[("damage", ValueType::U16), ("attacker", ValueType::String)])
            .build()
            .unwrap(),
    )
}

#[test]
fn client_invoked_method_reaches_the_server_with_source_stamped() {
    let schema = schema();
    let mut pair = common::connected_pair(schema, 4, 0.0);

    let seen: Rc<RefCell<Option<MethodCall>>> = Rc::new(RefCell::new(None));
    let seen2 = seen.clone();
    let _handle = pair
        .server_world
        .borrow()
        .on_method("hit", move |call: &MethodCall| {
            *seen2.borrow_mut() = Some(call.clone());
        })
        .unwrap();

    let method = pair.server_world.borrow().schema().method_by_name("hit").unwrap().ordinal();
    pair.client_peer()
        .borrow_mut()
        .enqueue_method(method, vec![Value::U16(7), Value::String("alice".to_owned())]);

    let delivered = pair.run_until(10, 200, |_| seen.borrow().is_some());
    assert!(delivered, "method call never reached the server");

    let call = seen.borrow().clone().unwrap();
    assert_eq!(call.arguments, vec![Value::U16(7), Value::String("alice".to_owned())]);
    assert!(call.source.is_some(), "a remotely-invoked method must stamp its source peer");
}
