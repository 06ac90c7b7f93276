//! S6 — operator-side window cap (spec.md §8 "S6", §3 `local_sendwindow_max`,
//! §4.4 step 2).
//!
//! With `local_sendwindow_max` set below what's queued, the bytes the
//! engine actually pumps into the send window — and therefore onto the
//! wire — in one tick must stay within the cap (plus at most one atom's
//! overshoot, since the pump loop checks the cap before adding each atom,
//! not after).

use std::cell::RefCell;
use std::rc::Rc;

use irmo::{Transport, Tunables};
use irmo_proto::packet::{decode_data_section, decode_header};
use irmo_proto::{Atom, Flags};
use irmo_schema::{SchemaBuilder, ValueType};
use irmo_test_utils::{ChaosTransport, Clock, Network};

const CAP_BYTES: usize = 256;
const OBJECT_COUNT: usize = 500; // 3 bytes/NewObject atom => 1500 bytes queued, well over the cap

fn schema() -> Rc<irmo_schema::Schema> {
    Rc::new(
        SchemaBuilder::new()
            .class("P", None, &[("x", ValueType::U32)])
            .build()
            .unwrap(),
    )
}

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
fn a_capped_peer_never_pumps_more_than_its_cap_into_one_burst() {
    let schema = schema();
    let network: Network<&'static str> = Network::new(6);

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
        clock.advance(10);
        let now = clock.now_ms();
        client_driver.tick(&mut client_transport, now);
        server_driver.tick(&mut server_transport, now);
        if client_driver
            .server(None)
            .and_then(|s| s.peer(&"server"))
            .is_some_and(|p| p.borrow().state() == irmo::ConnectionState::Connected)
        {
            break;
        }
    }

    server_driver
        .server(None)
        .unwrap()
        .peer(&"client")
        .unwrap()
        .borrow_mut()
        .set_local_sendwindow_max(CAP_BYTES);

    for _ in 0..OBJECT_COUNT {
        server_world.borrow_mut().new_object("P").unwrap();
    }

    sent.borrow_mut().clear();
    clock.advance(10);
    let now = clock.now_ms();
    server_driver.tick(&mut server_transport, now);

    let mut burst_bytes = 0usize;
    let mut atom_count = 0usize;
    for datagram in sent.borrow().iter() {
        let mut buf = irmo_proto::PacketBuffer::from_datagram(datagram);
        let Ok(flags) = decode_header(&mut buf) else { continue };
        if !flags.contains(Flags::DTA) {
            continue;
        }
        buf.read_u16().unwrap();
        let Ok((_, atoms)) = decode_data_section(&mut buf, &schema) else { continue };
        for atom in &atoms {
            assert!(matches!(atom, Atom::NewObject { .. }), "only new-object atoms are queued in this scenario");
            burst_bytes += atom.wire_length();
            atom_count += 1;
        }
    }

    assert!(atom_count > 0, "the capped peer must still send something");
    assert!(atom_count < OBJECT_COUNT, "a 256-byte cap cannot fit all {OBJECT_COUNT} queued objects in one burst");
    assert!(
        burst_bytes <= CAP_BYTES + 3,
        "burst carried {burst_bytes} bytes, more than the {CAP_BYTES}-byte cap allows (plus one atom's overshoot)"
    );
}
