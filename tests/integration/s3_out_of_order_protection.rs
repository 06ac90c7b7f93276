//! S3 — out-of-order protection (spec.md §8 "S3", §4.5 step 6).
//!
//! The server emits two changes to the same variable back to back: x=10
//! then x=20, each in its own packet. The packet carrying x=20 (the later
//! sequence number) is delivered to the client before the packet carrying
//! x=10. The per-variable last-writer-wins guard must leave the client at
//! x=20, never regressing to the stale x=10 once it finally arrives.
//!
//! Reordering is driven directly rather than left to network latency: a
//! hand-rolled transport holds the server's outbound datagrams back and
//! hands them to the client in a chosen order, so the scenario is
//! deterministic instead of depending on a particular loss/latency seed.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use irmo::{Transport, Tunables};
use irmo_proto::packet::{encode_syn, Syn};
use irmo_schema::{SchemaBuilder, ValueType};

fn schema() -> Rc<irmo_schema::Schema> {
    Rc::new(
        SchemaBuilder::new()
            .class("P", None, &[("x", ValueType::U32)])
            .build()
            .unwrap(),
    )
}

#[derive(Default)]
struct Wire {
    to_client: VecDeque<Vec<u8>>,
    to_server: VecDeque<Vec<u8>>,
}

struct ServerTransport {
    wire: Rc<RefCell<Wire>>,
    holding: Rc<Cell<bool>>,
    held: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl Transport<&'static str> for ServerTransport {
    fn send(&mut self, _addr: &&'static str, bytes: &[u8]) {
        if self.holding.get() {
            self.held.borrow_mut().push(bytes.to_vec());
        } else {
            self.wire.borrow_mut().to_client.push_back(bytes.to_vec());
        }
    }
    fn receive(&mut self) -> Option<(&'static str, Vec<u8>)> {
        self.wire.borrow_mut().to_server.pop_front().map(|b| ("client", b))
    }
}

struct ClientTransport {
    wire: Rc<RefCell<Wire>>,
}

impl Transport<&'static str> for ClientTransport {
    fn send(&mut self, _addr: &&'static str, bytes: &[u8]) {
        self.wire.borrow_mut().to_server.push_back(bytes.to_vec());
    }
    fn receive(&mut self) -> Option<(&'static str, Vec<u8>)> {
        self.wire.borrow_mut().to_client.pop_front().map(|b| ("server", b))
    }
}

#[test]
fn a_higher_sequence_change_delivered_first_is_not_clobbered_by_a_stale_one() {
    let schema = schema();
    let wire = Rc::new(RefCell::new(Wire::default()));
    let holding = Rc::new(Cell::new(false));
    let held = Rc::new(RefCell::new(Vec::new()));

    let server_world = irmo::World::new(schema.clone(), true);
    let mut server_driver: irmo::TransportDriver<&'static str> = irmo::TransportDriver::new(Tunables::default());
    server_driver.add_server(None, server_world.clone());
    let mut server_transport = ServerTransport {
        wire: wire.clone(),
        holding: holding.clone(),
        held: held.clone(),
    };

    let client_world = irmo::World::new(schema.clone(), false);
    let mut client_driver: irmo::TransportDriver<&'static str> = irmo::TransportDriver::new(Tunables::default());
    client_driver.add_server(None, client_world.clone());
    let mut client_transport = ClientTransport { wire: wire.clone() };

    let hash = schema.content_hash();
    let syn = encode_syn(&Syn {
        client_schema_hash: hash,
        server_schema_hash: hash,
        vhost: String::new(),
    });
    client_driver.open_peer(None, "server", syn);

    let mut now = 0u64;
    let mut tick = |server_driver: &mut irmo::TransportDriver<&'static str>,
                    client_driver: &mut irmo::TransportDriver<&'static str>,
                    server_transport: &mut ServerTransport,
                    client_transport: &mut ClientTransport| {
        now += 10;
        client_driver.tick(client_transport, now);
        server_driver.tick(server_transport, now);
    };

    let id = server_world.borrow_mut().new_object("P").unwrap();
    for _ in 0..50 {
        tick(&mut server_driver, &mut client_driver, &mut server_transport, &mut client_transport);
        if client_world.borrow().object_count() == 1 {
            break;
        }
    }
    assert_eq!(client_world.borrow().object_count(), 1, "client never received the new-object atom");

    // Let anything still in flight (acks, the new-object packet's own ack)
    // settle before the scenario's two changes are captured in isolation.
    for _ in 0..20 {
        tick(&mut server_driver, &mut client_driver, &mut server_transport, &mut client_transport);
    }

    holding.set(true);

    server_world.borrow_mut().set_int(id, "x", 10).unwrap();
    tick(&mut server_driver, &mut client_driver, &mut server_transport, &mut client_transport);
    let low_seq_packet = {
        let mut held = held.borrow_mut();
        assert_eq!(held.len(), 1, "x=10 must go out as exactly one packet");
        held.remove(0)
    };

    server_world.borrow_mut().set_int(id, "x", 20).unwrap();
    tick(&mut server_driver, &mut client_driver, &mut server_transport, &mut client_transport);
    let high_seq_packet = {
        let mut held = held.borrow_mut();
        assert_eq!(held.len(), 1, "x=20 must go out as exactly one packet");
        held.remove(0)
    };

    holding.set(false);

    // Deliver out of order: the later (higher-sequence) change arrives
    // first, the stale one straggles in afterward.
    {
        let mut wire = wire.borrow_mut();
        wire.to_client.push_back(high_seq_packet);
        wire.to_client.push_back(low_seq_packet);
    }

    now += 10;
    client_driver.tick(&mut client_transport, now);

    let client = client_world.borrow();
    let obj = client.object(id).unwrap();
    assert_eq!(obj.value(0), Some(&irmo_proto::Value::U32(20)), "stale x=10 must not clobber x=20");
}
