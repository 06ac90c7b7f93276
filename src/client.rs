//! Blocking connect/disconnect helpers (spec.md §1: "the only blocking
//! primitive is the `block(transport, timeout_ms)` helper", §4.7). A client
//! is modeled as a [`TransportDriver`] hosting exactly one default-vhost
//! server with exactly one peer; everything else reuses the same tick-driven
//! engine a server uses.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use irmo_proto::packet::{encode_syn, Syn};

use crate::clock;
use crate::driver::TransportDriver;
use crate::error::{Error, Result};
use crate::peer::{Address, ConnectionState, Peer};
use crate::transport::Transport;
use crate::tunables::Tunables;
use crate::world::WorldHandle;

/// A single outbound connection: one world, one remote, one peer.
pub struct Client<A: Address> {
    driver: TransportDriver<A>,
    remote: A,
}

impl<A: Address> Client<A> {
    pub fn peer(&self) -> Rc<RefCell<Peer<A>>> {
        self.driver
            .server(None)
            .and_then(|s| s.peer(&self.remote))
            .expect("a connected client always owns its one peer")
    }

    pub fn world(&self) -> &WorldHandle {
        self.driver.server(None).expect("client server always registered").world()
    }

    /// Advance the underlying driver by one tick. Call this from the host's
    /// own event loop once connected; [`connect`]/[`disconnect`] only use
    /// blocking loops for the handshake/teardown themselves.
    pub fn tick<T: Transport<A>>(&mut self, transport: &mut T, now_ms: u64) {
        self.driver.tick(transport, now_ms);
    }
}

const POLL_INTERVAL_MS: u64 = 10;

/// Open a connection to `remote`, blocking until it reaches `Connected` or
/// `timeout_ms` milliseconds pass (spec.md §4.7 "Handshaking", 6 attempts at
/// a 1s interval by default — `timeout_ms` is the caller's overall budget,
/// independent of the per-attempt retry cadence in `tunables`).
pub fn connect<A: Address, T: Transport<A>>(
    transport: &mut T,
    remote: A,
    world: WorldHandle,
    vhost: Option<String>,
    tunables: Tunables,
    timeout_ms: u64,
) -> Result<Client<A>> {
    let hash = world.borrow().schema().content_hash();
    let mut driver = TransportDriver::new(tunables);
    driver.add_server(None, world);
    let peer_rc = driver.server_mut(None).expect("just registered").open_peer(remote.clone());

    let syn = encode_syn(&Syn {
        client_schema_hash: hash,
        server_schema_hash: hash,
        vhost: vhost.unwrap_or_default(),
    });
    peer_rc.borrow_mut().queue_handshake_frame(syn);

    let deadline = clock::now_ms().saturating_add(timeout_ms);
    loop {
        let now = clock::now_ms();
        driver.tick(transport, now);
        match peer_rc.borrow().state() {
            ConnectionState::Connected => return Ok(Client { driver, remote }),
            ConnectionState::Disconnected => return Err(Error::Timeout),
            _ => {}
        }
        if now >= deadline {
            return Err(Error::Timeout);
        }
        std::thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
    }
}

/// Tear down `client`'s connection, blocking until the peer reaches
/// `Disconnected` or `timeout_ms` milliseconds pass (spec.md §4.7
/// "Disconnecting", local-initiated row).
pub fn disconnect<A: Address, T: Transport<A>>(client: &mut Client<A>, transport: &mut T, timeout_ms: u64) -> Result<()> {
    let peer_rc = client.peer();
    peer_rc.borrow_mut().initiate_disconnect(&client.driver.tunables);

    let deadline = clock::now_ms().saturating_add(timeout_ms);
    loop {
        let now = clock::now_ms();
        client.driver.tick(transport, now);
        if peer_rc.borrow().state() == ConnectionState::Disconnected {
            return Ok(());
        }
        if now >= deadline {
            return Err(Error::Timeout);
        }
        std::thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
    }
}
