//! A peer table hosting one world over one transport (spec.md §4.9
//! "Transport driver"). The same type plays both roles the protocol is
//! symmetric about: a many-peers server, or (via a single inserted peer) a
//! one-peer client, matching spec.md §1's "the protocol is symmetric in
//! that a client may in turn publish its own object space back to the
//! server."

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::peer::{Address, ConnectionState, Peer};
use crate::tunables::Tunables;
use crate::world::WorldHandle;

/// One logical server: a world, an optional vhost name gating inbound SYNs
/// (spec.md §4.9), and the peers currently talking to it.
pub struct Server<A: Address> {
    pub(crate) world: WorldHandle,
    pub(crate) vhost: Option<String>,
    pub(crate) tunables: Tunables,
    pub(crate) peers: HashMap<A, Rc<RefCell<Peer<A>>>>,
}

impl<A: Address> Server<A> {
    pub fn new(world: WorldHandle, vhost: Option<String>, tunables: Tunables) -> Server<A> {
        Server {
            world,
            vhost,
            tunables,
            peers: HashMap::new(),
        }
    }

    pub fn world(&self) -> &WorldHandle {
        &self.world
    }

    pub fn vhost(&self) -> Option<&str> {
        self.vhost.as_deref()
    }

    pub fn peer(&self, remote: &A) -> Option<Rc<RefCell<Peer<A>>>> {
        self.peers.get(remote).cloned()
    }

    pub fn peers(&self) -> impl Iterator<Item = &Rc<RefCell<Peer<A>>>> {
        self.peers.values()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Get or create the peer entry for `remote`, attaching it to this
    /// server's world so local mutations get enqueued to it (spec.md §9
    /// "worlds store raw references to attached [peers]"). Idempotent.
    pub(crate) fn open_peer(&mut self, remote: A) -> Rc<RefCell<Peer<A>>> {
        self.peers
            .entry(remote.clone())
            .or_insert_with(|| {
                let peer = Rc::new(RefCell::new(Peer::new(
                    remote,
                    self.world.clone(),
                    self.vhost.clone(),
                    &self.tunables,
                )));
                self.world.borrow_mut().attach_peer(Rc::downgrade(&peer));
                peer
            })
            .clone()
    }

    pub(crate) fn remove_peer(&mut self, remote: &A) {
        self.peers.remove(remote);
    }

    /// Drop peers that are `Disconnected` and past their linger deadline
    /// (spec.md §4.7 "Linger"). A peer disconnected without ever entering
    /// linger (the local-initiated path) has `linger_until_ms == None` and
    /// is removed immediately.
    pub(crate) fn prune_lingered(&mut self, now_ms: u64) {
        self.peers.retain(|_, peer| {
            let peer = peer.borrow();
            if peer.state() != ConnectionState::Disconnected {
                return true;
            }
            match peer.linger_until_ms {
                Some(deadline) => now_ms < deadline,
                None => false,
            }
        });
    }
}
