//! S5 — disconnect and linger (spec.md §8 "S5", §4.7 "Disconnecting"/"Linger").
//!
//! The server initiates the teardown. A SYN|FIN duplicated after the far
//! side has already disconnected must still draw a SYN|FIN|ACK reply while
//! it's within its linger window; once the window and every reference to
//! the peer are gone, the peer entry itself disappears.

use std::rc::Rc;

use irmo::Transport;
use irmo_proto::packet::{decode_header, encode_control, encode_syn, Syn};
use irmo_proto::Flags;
use irmo_schema::SchemaBuilder;
use irmo_test_utils::{ChaosTransport, Clock, Network};

fn schema() -> Rc<irmo_schema::Schema> {
    Rc::new(SchemaBuilder::new().build().unwrap())
}

#[test]
fn server_initiated_disconnect_lingers_then_drops_the_peer() {
    let schema = schema();
    let mut tunables = irmo::Tunables::default();
    tunables.handshake_interval_ms = 10;
    tunables.linger_ms = 100;

    let network: Network<&'static str> = Network::new(5);

    let server_world = irmo::World::new(schema.clone(), true);
    let mut server_driver: irmo::TransportDriver<&'static str> = irmo::TransportDriver::new(tunables);
    server_driver.add_server(None, server_world.clone());
    let mut server_transport = ChaosTransport::new("server", network.clone());

    let client_world = irmo::World::new(schema.clone(), false);
    let mut client_driver: irmo::TransportDriver<&'static str> = irmo::TransportDriver::new(tunables);
    client_driver.add_server(None, client_world.clone());
    let mut client_transport = ChaosTransport::new("client", network.clone());

    let hash = schema.content_hash();
    let syn = encode_syn(&Syn {
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
    assert_eq!(
        client_driver.server(None).unwrap().peer(&"server").unwrap().borrow().state(),
        irmo::ConnectionState::Connected,
        "handshake never completed"
    );

    server_driver
        .server(None)
        .unwrap()
        .peer(&"client")
        .unwrap()
        .borrow_mut()
        .initiate_disconnect(&tunables);

    for _ in 0..30 {
        clock.advance(10);
        let now = clock.now_ms();
        client_driver.tick(&mut client_transport, now);
        server_driver.tick(&mut server_transport, now);
        if client_driver
            .server(None)
            .and_then(|s| s.peer(&"server"))
            .is_some_and(|p| p.borrow().state() == irmo::ConnectionState::Disconnected)
        {
            break;
        }
    }
    assert_eq!(
        client_driver.server(None).unwrap().peer(&"server").unwrap().borrow().state(),
        irmo::ConnectionState::Disconnected,
        "client never saw the server-initiated SYN|FIN"
    );
    assert_eq!(
        client_driver.server(None).unwrap().peer_count(),
        1,
        "the client's peer entry must still exist during its linger window"
    );

    // A duplicated SYN|FIN arriving while the client is lingering must
    // still be answered with SYN|FIN|ACK (spec.md §4.7 "Linger").
    server_transport.send(&"client", &encode_control(Flags::SYN | Flags::FIN));
    clock.advance(10);
    let now = clock.now_ms();
    client_driver.tick(&mut client_transport, now);

    let (_from, reply) = server_transport.receive().expect("lingering peer must reply to a duplicate SYN|FIN");
    let mut buf = irmo_proto::PacketBuffer::from_datagram(&reply);
    let flags = decode_header(&mut buf).unwrap();
    assert!(flags.is_exactly(Flags::SYN | Flags::FIN | Flags::ACK));

    // Advance past the linger deadline; the peer entry must disappear once
    // nothing else references it.
    for _ in 0..20 {
        clock.advance(10);
        let now = clock.now_ms();
        client_driver.tick(&mut client_transport, now);
        server_driver.tick(&mut server_transport, now);
    }
    assert_eq!(client_driver.server(None).unwrap().peer_count(), 0, "peer must be pruned once linger expires");
    assert_eq!(server_driver.server(None).unwrap().peer_count(), 0, "the initiator's own peer entry has no linger");
}
