//! S2 — coalesced updates (spec.md §8 "S2", §4.3).
//!
//! Validates that three successive `set_int` calls on the same variable,
//! made before any tick drains the send queue, are coalesced into exactly
//! one change atom on the wire carrying the final value — not three.

#[path = "common/mod.rs"]
mod common;

use std::cell::RefCell;
use std::rc::Rc;

use irmo::{Transport, Tunables};
use irmo_proto::packet::{decode_data_section, decode_header};
use irmo_proto::{Atom, Flags};
use irmo_schema::{SchemaBuilder, ValueType};
use irmo_test_utils::{ChaosTransport, Clock, Network};

fn schema() -> Rc<irmo_schema::Schema> {
    Rc::new(
        SchemaBuilder::new()
            .class("P", None, &[("x", ValueType::U32), ("s", ValueType::String)])
            .build()
            .unwrap(),
    )
}

/// Wraps a [`ChaosTransport`], recording a copy of every datagram it sends
/// so the test can inspect what actually went on the wire.
struct RecordingTransport {
    inner: ChaosTransport<&'static str>,
    sent: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl Transport<&'static str> for RecordingTransport {
    fn send(&mut self, addr: &&'static str, bytes: &[u8]) {
        self.sent.borrow_mut().push(bytes.to_vec());
        self.inner.send(addr, bytes);
    }
    fn receive(&mut self) -> Option<(&'static str, Vec<u8>)> {
        self.inner.receive()
    }
}

#[test]
fn three_rapid_sets_produce_exactly_one_change_atom_on_the_wire() {
    let schema = schema();
    let network: Network<&'static str> = Network::new(3);

    let server_world = irmo::World::new(schema.clone(), true);
    let mut server_driver: irmo::TransportDriver<&'static str> = irmo::TransportDriver::new(Tunables::default());
    server_driver.add_server(None, server_world.clone());
    let sent = Rc::new(RefCell::new(Vec::new()));
    let mut server_transport = RecordingTransport {
        inner: ChaosTransport::new("server", network.clone()),
        sent: sent.clone(),
    };

    let client_world = irmo::World::new(schema.clone(), false);
    let mut client_driver: irmo::TransportDriver<&'static str> = irmo::TransportDriver::new(Tunables::default());
    client_driver.add_server(None, client_world.clone());
    let mut client_transport = ChaosTransport::new("client", network.clone());

    let hash = schema.content_hash();
    let syn = irmo_proto::packet::encode_syn(&irmo_proto::packet::Syn {
        client_schema_hash: hash,
        server_schema_hash: hash,
        vhost: String::new(),
    });
    client_driver.open_peer(None, "server", syn);

    let mut clock = Clock::new(network);
    for _ in 0..50 {
        if client_world.borrow().object_count() == 0
            && client_driver
                .server(None)
                .and_then(|s| s.peer(&"server"))
                .is_some_and(|p| p.borrow().state() == irmo::ConnectionState::Connected)
        {
            break;
        }
        clock.advance(10);
        let now = clock.now_ms();
        client_driver.tick(&mut client_transport, now);
        server_driver.tick(&mut server_transport, now);
    }

    let id = server_world.borrow_mut().new_object("P").unwrap();
    for _ in 0..20 {
        clock.advance(10);
        let now = clock.now_ms();
        client_driver.tick(&mut client_transport, now);
        server_driver.tick(&mut server_transport, now);
        if client_world.borrow().object_count() == 1 {
            break;
        }
    }

    sent.borrow_mut().clear();
    server_world.borrow_mut().set_int(id, "x", 1).unwrap();
    server_world.borrow_mut().set_int(id, "x", 2).unwrap();
    server_world.borrow_mut().set_int(id, "x", 3).unwrap();

    let converged = {
        let mut converged = false;
        for _ in 0..100 {
            clock.advance(10);
            let now = clock.now_ms();
            client_driver.tick(&mut client_transport, now);
            server_driver.tick(&mut server_transport, now);
            if client_world
                .borrow()
                .object(id)
                .is_some_and(|o| o.value(0) == Some(&irmo_proto::Value::U32(3)))
            {
                converged = true;
                break;
            }
        }
        converged
    };
    assert!(converged, "client never converged on x=3");

    let mut change_atoms_for_object = 0;
    for datagram in sent.borrow().iter() {
        let mut buf = irmo_proto::PacketBuffer::from_datagram(datagram);
        let Ok(flags) = decode_header(&mut buf) else { continue };
        if !flags.contains(Flags::DTA) {
            continue;
        }
        buf.read_u16().unwrap(); // cumulative ack
        let Ok((_, atoms)) = decode_data_section(&mut buf, &schema) else {
            continue;
        };
        for atom in atoms {
            if let Atom::Change { id: atom_id, changes, .. } = &atom {
                if *atom_id == id {
                    assert_eq!(changes, &[(0u8, irmo_proto::Value::U32(3))], "coalesced atom must carry only the final value");
                    change_atoms_for_object += 1;
                }
            }
        }
    }
    assert_eq!(change_atoms_for_object, 1, "three rapid sets must coalesce into exactly one change atom");
}
