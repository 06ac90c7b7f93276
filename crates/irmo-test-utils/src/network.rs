//! The shared medium a [`crate::ChaosTransport`] pair talks over: per-address
//! inboxes with configurable loss and latency, so scenario tests can drive
//! both sides of a connection without a real socket.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

struct Envelope<A> {
    from: A,
    bytes: Vec<u8>,
    release_at_ms: u64,
}

pub struct Exchange<A: Eq + Hash + Clone> {
    inboxes: HashMap<A, VecDeque<Envelope<A>>>,
    now_ms: u64,
    loss_probability: f64,
    min_latency_ms: u64,
    max_latency_ms: u64,
    rng: StdRng,
}

impl<A: Eq + Hash + Clone> Exchange<A> {
    fn new(seed: u64) -> Self {
        Exchange {
            inboxes: HashMap::new(),
            now_ms: 0,
            loss_probability: 0.0,
            min_latency_ms: 0,
            max_latency_ms: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn send(&mut self, from: A, to: A, bytes: Vec<u8>) {
        if self.loss_probability > 0.0 && self.rng.random_bool(self.loss_probability) {
            return;
        }
        let latency = if self.max_latency_ms > self.min_latency_ms {
            self.rng.random_range(self.min_latency_ms..=self.max_latency_ms)
        } else {
            self.min_latency_ms
        };
        self.inboxes.entry(to).or_default().push_back(Envelope {
            from,
            bytes,
            release_at_ms: self.now_ms + latency,
        });
    }

    /// Earliest-ready envelope addressed to `to`, removed in place (so
    /// differing per-packet latencies can deliver out of send order — the
    /// reordering a real unreliable transport would also produce).
    fn receive(&mut self, to: &A) -> Option<(A, Vec<u8>)> {
        let inbox = self.inboxes.get_mut(to)?;
        let ready_index = inbox
            .iter()
            .enumerate()
            .filter(|(_, e)| e.release_at_ms <= self.now_ms)
            .min_by_key(|(_, e)| e.release_at_ms)
            .map(|(i, _)| i)?;
        let envelope = inbox.remove(ready_index)?;
        Some((envelope.from, envelope.bytes))
    }
}

/// A handle to one [`Exchange`], shared by every [`crate::ChaosTransport`]
/// created from it. Cloning shares the same underlying medium.
#[derive(Clone)]
pub struct Network<A: Eq + Hash + Clone> {
    exchange: std::rc::Rc<std::cell::RefCell<Exchange<A>>>,
}

impl<A: Eq + Hash + Clone> Network<A> {
    pub fn new(seed: u64) -> Self {
        Network {
            exchange: std::rc::Rc::new(std::cell::RefCell::new(Exchange::new(seed))),
        }
    }

    /// Drop a fraction `p` (`0.0..=1.0`) of datagrams sent from now on.
    pub fn set_loss_probability(&self, p: f64) {
        self.exchange.borrow_mut().loss_probability = p;
    }

    /// Delay every subsequently-sent datagram by a uniformly random amount
    /// in `min_ms..=max_ms` before it becomes visible to `receive`.
    pub fn set_latency_range(&self, min_ms: u64, max_ms: u64) {
        let mut exchange = self.exchange.borrow_mut();
        exchange.min_latency_ms = min_ms;
        exchange.max_latency_ms = max_ms;
    }

    /// Advance the medium's clock. Envelopes already in flight become
    /// eligible for delivery once their release time is at or before
    /// `now_ms`; call this with the same `now_ms` passed to every
    /// participant's `driver.tick(...)` this round.
    pub fn advance(&self, now_ms: u64) {
        self.exchange.borrow_mut().now_ms = now_ms;
    }

    pub(crate) fn send(&self, from: A, to: A, bytes: Vec<u8>) {
        self.exchange.borrow_mut().send(from, to, bytes);
    }

    pub(crate) fn receive(&self, to: &A) -> Option<(A, Vec<u8>)> {
        self.exchange.borrow_mut().receive(to)
    }
}
