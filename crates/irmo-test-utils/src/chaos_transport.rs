//! An [`irmo::Transport`] backed by a shared in-memory [`crate::Network`],
//! standing in for a real UDP socket in scenario tests (spec.md §1: "the
//! library expects ... a connectionless, unreliable, best-effort
//! send/receive primitive supplied by the host").

use std::hash::Hash;

use irmo::Transport;

use crate::network::Network;

pub struct ChaosTransport<A: Eq + Hash + Clone> {
    local: A,
    network: Network<A>,
}

impl<A: Eq + Hash + Clone> ChaosTransport<A> {
    pub fn new(local: A, network: Network<A>) -> Self {
        ChaosTransport { local, network }
    }
}

impl<A: irmo::Address> Transport<A> for ChaosTransport<A> {
    fn send(&mut self, addr: &A, bytes: &[u8]) {
        self.network.send(self.local.clone(), addr.clone(), bytes.to_vec());
    }

    fn receive(&mut self) -> Option<(A, Vec<u8>)> {
        self.network.receive(&self.local)
    }
}
