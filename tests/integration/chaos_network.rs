//! Broad convergence under an adversarial network (spec.md §8, property 1
//! "eventual convergence"). Exercises creates, updates, and destroys across
//! many objects on a [`ChaosTransport`] pair with both packet loss and
//! variable latency, and checks the client's mirror settles on the exact
//! same object set and values the server ends up with — not merely that
//! *something* got through.

use std::rc::Rc;

use irmo::Tunables;
use irmo_proto::Value;
use irmo_schema::{SchemaBuilder, ValueType};
use irmo_test_utils::{ChaosTransport, Clock, Network};

fn schema() -> Rc<irmo_schema::Schema> {
    Rc::new(
        SchemaBuilder::new()
            .class("Widget", None, &[("count", ValueType::U32), ("label", ValueType::String)])
            .build()
            .unwrap(),
    )
}

#[test]
fn client_mirror_converges_with_creates_updates_and_destroys_under_loss_and_latency() {
    let schema = schema();
    let network: Network<&'static str> = Network::new(17);
    network.set_loss_probability(0.25);
    network.set_latency_range(5, 60);

    let server_world = irmo::World::new(schema.clone(), true);
    let mut server_driver: irmo::TransportDriver<&'static str> = irmo::TransportDriver::new(Tunables::default());
    server_driver.add_server(None, server_world.clone());
    let mut server_transport = ChaosTransport::new("server", network.clone());

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
    let mut tick = |server_driver: &mut irmo::TransportDriver<&'static str>,
                    client_driver: &mut irmo::TransportDriver<&'static str>,
                    server_transport: &mut ChaosTransport<&'static str>,
                    client_transport: &mut ChaosTransport<&'static str>| {
        clock.advance(10);
        let now = clock.now_ms();
        client_driver.tick(client_transport, now);
        server_driver.tick(server_transport, now);
    };

    for _ in 0..300 {
        tick(&mut server_driver, &mut client_driver, &mut server_transport, &mut client_transport);
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
        "handshake never completed despite retries"
    );

    let mut ids = Vec::new();
    for i in 0..25u32 {
        let id = server_world.borrow_mut().new_object("Widget").unwrap();
        server_world.borrow_mut().set_int(id, "count", i).unwrap();
        server_world.borrow_mut().set_string(id, "label", &format!("widget-{i}")).unwrap();
        ids.push(id);
        tick(&mut server_driver, &mut client_driver, &mut server_transport, &mut client_transport);
    }

    // Mutate a third of them again, destroy another third, leave the rest untouched.
    for (i, &id) in ids.iter().enumerate() {
        match i % 3 {
            0 => {
                server_world.borrow_mut().set_int(id, "count", i as u32 * 100).unwrap();
            }
            1 => {
                server_world.borrow_mut().destroy(id).unwrap();
            }
            _ => {}
        }
        tick(&mut server_driver, &mut client_driver, &mut server_transport, &mut client_transport);
    }

    let surviving: Vec<u16> = ids.iter().enumerate().filter(|(i, _)| i % 3 != 1).map(|(_, &id)| id).collect();

    let mut converged = false;
    for _ in 0..3000 {
        tick(&mut server_driver, &mut client_driver, &mut server_transport, &mut client_transport);
        let client = client_world.borrow();
        if client.object_count() != surviving.len() {
            continue;
        }
        let all_match = surviving.iter().all(|&id| {
            let Some(obj) = client.object(id) else { return false };
            let server = server_world.borrow();
            let server_obj = server.object(id).unwrap();
            obj.values() == server_obj.values()
        });
        if all_match {
            converged = true;
            break;
        }
    }
    assert!(converged, "client mirror never converged on the server's final object set under loss/latency");

    let client = client_world.borrow();
    for &id in &ids {
        if surviving.contains(&id) {
            assert!(client.object(id).is_some(), "surviving object {id} missing from client");
        } else {
            assert!(client.object(id).is_none(), "destroyed object {id} still present on client");
        }
    }

    let widget0 = client.object(ids[0]).unwrap();
    assert_eq!(widget0.value(0), Some(&Value::U32(0)));
    assert_eq!(widget0.value(1), Some(&Value::String("widget-0".to_owned())));
}
