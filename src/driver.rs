//! Virtual-host multiplexing over one transport (spec.md §4.9): a
//! string-keyed table of servers plus at most one default server, demuxing
//! inbound SYNs by vhost name and everything else by source address.

use std::collections::HashMap;

use irmo_proto::packet::{decode_header, decode_syn, encode_control};
use irmo_proto::{Flags, PacketBuffer};

use crate::engine;
use crate::peer::Address;
use crate::server::Server;
use crate::transport::Transport;
use crate::tunables::Tunables;
use crate::world::WorldHandle;

/// `None` keys the default server; `Some(name)` keys a named vhost.
type ServerKey = Option<String>;

pub struct TransportDriver<A: Address> {
    pub(crate) tunables: Tunables,
    servers: HashMap<ServerKey, Server<A>>,
}

impl<A: Address> TransportDriver<A> {
    pub fn new(tunables: Tunables) -> Self {
        TransportDriver {
            tunables,
            servers: HashMap::new(),
        }
    }

    /// Register a server publishing `world` under `vhost` (`None` is the
    /// default server selected when a SYN's vhost field is empty or
    /// doesn't match any registered name). Replaces any prior server
    /// registered under the same key.
    pub fn add_server(&mut self, vhost: Option<String>, world: WorldHandle) {
        let server = Server::new(world, vhost.clone(), self.tunables);
        self.servers.insert(vhost, server);
    }

    pub fn server(&self, vhost: Option<&str>) -> Option<&Server<A>> {
        self.servers.get(&vhost.map(str::to_owned))
    }

    pub fn server_mut(&mut self, vhost: Option<&str>) -> Option<&mut Server<A>> {
        self.servers.get_mut(&vhost.map(str::to_owned))
    }

    /// Open (or return the existing) peer for `remote` under `vhost` and
    /// queue `handshake_frame` as its initial outbound frame. This is what
    /// [`crate::client::connect`] does internally for the one-peer blocking
    /// case; exposed here for callers driving the tick API directly with
    /// more than one peer. Returns `None` if no server is registered under
    /// `vhost`.
    pub fn open_peer(
        &mut self,
        vhost: Option<&str>,
        remote: A,
        handshake_frame: Vec<u8>,
    ) -> Option<std::rc::Rc<std::cell::RefCell<crate::peer::Peer<A>>>> {
        let server = self.server_mut(vhost)?;
        let peer_rc = server.open_peer(remote);
        peer_rc.borrow_mut().queue_handshake_frame(handshake_frame);
        Some(peer_rc)
    }

    /// Drain every arrived datagram and advance every peer's outbound
    /// engine by one tick (spec.md §4.4/§4.5, driven once per call to this
    /// function per transport iteration).
    pub fn tick<T: Transport<A>>(&mut self, transport: &mut T, now_ms: u64) {
        while let Some((addr, bytes)) = transport.receive() {
            self.handle_datagram(transport, addr, &bytes, now_ms);
        }

        let keys: Vec<ServerKey> = self.servers.keys().cloned().collect();
        for key in keys {
            let peers: Vec<_> = self.servers[&key].peers().cloned().collect();
            for peer_rc in &peers {
                let remote = peer_rc.borrow().remote().clone();
                for packet in engine::outbound_tick(peer_rc, &self.tunables, now_ms) {
                    transport.send(&remote, &packet);
                }
            }
            self.servers.get_mut(&key).unwrap().prune_lingered(now_ms);
        }
    }

    fn handle_datagram<T: Transport<A>>(&mut self, transport: &mut T, addr: A, bytes: &[u8], now_ms: u64) {
        for server in self.servers.values() {
            if let Some(peer_rc) = server.peer(&addr) {
                if let Some(reply) = engine::process_datagram_for_peer(server.world(), &peer_rc, &self.tunables, bytes, now_ms) {
                    transport.send(&addr, &reply);
                }
                return;
            }
        }

        // No existing peer: only a bare SYN may open a new server-side
        // connection (spec.md §4.7 "local connect" row, server side).
        let mut buf = PacketBuffer::from_datagram(bytes);
        let Ok(flags) = decode_header(&mut buf) else { return };
        if !flags.is_exactly(Flags::SYN) {
            return;
        }
        let Ok(syn) = decode_syn(&mut buf) else { return };

        let key: ServerKey = if !syn.vhost.is_empty() && self.servers.contains_key(&Some(syn.vhost.clone())) {
            Some(syn.vhost.clone())
        } else if self.servers.contains_key(&None) {
            None
        } else {
            return;
        };

        let local_hash = self.servers[&key].world().borrow().schema().content_hash();
        if syn.client_schema_hash != syn.server_schema_hash || syn.server_schema_hash != local_hash {
            tracing::warn!(remote = ?addr, vhost = ?key, "refusing handshake: schema hash mismatch");
            transport.send(&addr, &encode_control(Flags::SYN | Flags::FIN));
            return;
        }

        let server = self.servers.get_mut(&key).unwrap();
        let peer_rc = server.open_peer(addr.clone());
        peer_rc.borrow_mut().last_handshake_sent_ms = Some(now_ms);
        transport.send(&addr, &encode_control(Flags::SYN | Flags::ACK));
    }
}
