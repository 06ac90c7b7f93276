//! Per-remote-participant connection state (spec.md §3 "Peer (client)
//! state", §4.7).

use std::rc::Rc;
use std::cell::RefCell;

use irmo_proto::packet::encode_control;
use irmo_proto::{Flags, Value};

use crate::callback::{CallbackHandle, ObserverList};
use crate::congestion::{CongestionController, RttEstimator};
use crate::object::ObjectId;
use crate::sendqueue::SendQueue;
use crate::tunables::Tunables;
use crate::window::{ReceiveWindow, SendWindow};
use crate::world::WorldHandle;

/// An opaque endpoint identifier. The core never inspects an address
/// beyond equality/hashing — formatting, parsing, and the transport's own
/// notion of "socket" are the host's concern (spec.md §1 "Out of scope").
pub trait Address: Clone + Eq + std::hash::Hash + std::fmt::Debug + 'static {}
impl<T: Clone + Eq + std::hash::Hash + std::fmt::Debug + 'static> Address for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Handshaking,
    Connected,
    Disconnecting,
    Disconnected,
}

/// The non-generic face of a peer that [`crate::world::World`] notifies on
/// mutation (spec.md §9: "worlds store raw references to attached
/// [peers]"). Implemented for `RefCell<Peer<A>>` so `Rc<RefCell<Peer<A>>>`
/// coerces directly to `Rc<dyn PeerSink>` without the world needing to
/// know `A`.
pub(crate) trait PeerSink {
    fn is_connected(&self) -> bool;
    fn enqueue_new_object(&self, class_ordinal: u8, id: ObjectId);
    fn enqueue_change(&self, class_ordinal: u8, id: ObjectId, changes: Vec<(u8, Value)>, nvars: u8);
    fn enqueue_destroy(&self, id: ObjectId);
}

impl<A: Address> PeerSink for RefCell<Peer<A>> {
    fn is_connected(&self) -> bool {
        self.borrow().state == ConnectionState::Connected
    }

    fn enqueue_new_object(&self, class_ordinal: u8, id: ObjectId) {
        self.borrow_mut().send_queue.enqueue_new_object(class_ordinal, id);
    }

    fn enqueue_change(&self, class_ordinal: u8, id: ObjectId, changes: Vec<(u8, Value)>, nvars: u8) {
        let mut peer = self.borrow_mut();
        for (ordinal, value) in changes {
            peer.send_window.clear_variable_bit(id, ordinal);
            peer.send_queue.enqueue_change(class_ordinal, id, ordinal, value, nvars);
        }
    }

    fn enqueue_destroy(&self, id: ObjectId) {
        let mut peer = self.borrow_mut();
        peer.send_window.neutralize_object(id);
        peer.send_queue.enqueue_destroy(id);
    }
}

pub type DisconnectCallback<A> = dyn FnMut(&A);
pub type ConnectCallback<A> = dyn FnMut(&A);

/// One remote participant: a client from the server's point of view, or
/// the server from the client's point of view. Holds a strong handle to
/// the world this connection's inbound stream applies atoms to (spec.md
/// §9: "peers store a world handle (strong)").
pub struct Peer<A: Address> {
    pub(crate) state: ConnectionState,
    pub(crate) remote: A,
    pub(crate) world: WorldHandle,
    pub(crate) vhost: Option<String>,

    pub(crate) handshake_attempts_remaining: u32,
    pub(crate) last_handshake_sent_ms: Option<u64>,
    /// The raw frame a self-driven retry resends every
    /// `handshake_interval_ms` while `Handshaking`/`Disconnecting` — the
    /// initial SYN, an echoed SYN|ACK, or a SYN|FIN (spec.md §4.7). `None`
    /// once the peer leaves either state.
    pub(crate) handshake_frame: Option<Vec<u8>>,
    pub(crate) disconnect_deadline_ms: Option<u64>,
    pub(crate) linger_until_ms: Option<u64>,

    pub(crate) send_queue: SendQueue,
    pub(crate) send_window: SendWindow,
    pub(crate) recv_window: ReceiveWindow,
    pub(crate) need_ack: bool,

    pub(crate) rtt: RttEstimator,
    pub(crate) congestion: CongestionController,

    pub(crate) protocol_violations: u64,

    connect_observers: Rc<ObserverList<ConnectCallback<A>>>,
    disconnect_observers: Rc<ObserverList<DisconnectCallback<A>>>,
}

impl<A: Address> Peer<A> {
    pub(crate) fn new(remote: A, world: WorldHandle, vhost: Option<String>, tunables: &Tunables) -> Peer<A> {
        Peer {
            state: ConnectionState::Handshaking,
            remote,
            world,
            vhost,
            handshake_attempts_remaining: tunables.handshake_attempts,
            last_handshake_sent_ms: None,
            handshake_frame: None,
            disconnect_deadline_ms: None,
            linger_until_ms: None,
            send_queue: SendQueue::new(),
            send_window: SendWindow::new(),
            recv_window: ReceiveWindow::new(),
            need_ack: false,
            rtt: RttEstimator::new(tunables),
            congestion: CongestionController::new(tunables),
            protocol_violations: 0,
            connect_observers: ObserverList::new(),
            disconnect_observers: ObserverList::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn remote(&self) -> &A {
        &self.remote
    }

    pub fn world(&self) -> &WorldHandle {
        &self.world
    }

    /// Current RTT mean estimate, in milliseconds (supplemental accessor,
    /// grounded in the original source's `irmo_client_get_rtt`; see
    /// SPEC_FULL.md §6).
    pub fn rtt_ms(&self) -> f64 {
        self.rtt.mean_ms()
    }

    pub fn protocol_violation_count(&self) -> u64 {
        self.protocol_violations
    }

    /// Operator-side cap on this peer's in-flight bytes, 0 = unset
    /// (spec.md §3 `local_sendwindow_max`).
    pub fn set_local_sendwindow_max(&mut self, max_bytes: usize) {
        self.congestion.local_sendwindow_max = max_bytes;
    }

    pub fn enqueue_method(&mut self, method_ordinal: u8, arguments: Vec<Value>) {
        self.send_queue.enqueue_method(method_ordinal, arguments);
    }

    /// Tell the remote end to cap what it sends us at `max_bytes` (spec.md
    /// §3/§6 window-advertisement atom). Purely informational on the wire
    /// side: it is the caller's job to invoke this whenever the locally
    /// wanted cap changes, since the spec never ties it to
    /// [`Peer::set_local_sendwindow_max`] automatically.
    pub fn enqueue_window_advertisement(&mut self, max_bytes: u16) {
        self.send_queue.enqueue_window_advertisement(max_bytes);
    }

    /// Queue a raw handshake frame to be (re)sent every
    /// `handshake_interval_ms` while this peer is `Handshaking` or
    /// `Disconnecting`. The side that initiates a connection calls this
    /// with its SYN right after [`crate::driver::TransportDriver::server_mut`]
    /// opens the peer — [`crate::client::connect`] does exactly this
    /// internally; harnesses driving the driver/tick API directly (rather
    /// than the blocking client helper) use it the same way.
    pub fn queue_handshake_frame(&mut self, frame: Vec<u8>) {
        self.handshake_frame = Some(frame);
    }

    /// Begin a local-initiated disconnect (spec.md §4.7 "Connected, local
    /// disconnect -> Disconnecting"): send SYN|FIN and retry up to
    /// `tunables.handshake_attempts` times at `handshake_interval_ms`.
    /// Either side of a connection may call this — the protocol is
    /// symmetric here, not just on the client (spec.md §1). The one-peer
    /// blocking [`crate::client::disconnect`] helper is built on top of
    /// this for the common single-connection case.
    pub fn initiate_disconnect(&mut self, tunables: &Tunables) {
        self.state = ConnectionState::Disconnecting;
        self.handshake_attempts_remaining = tunables.handshake_attempts;
        self.last_handshake_sent_ms = None;
        self.handshake_frame = Some(encode_control(Flags::SYN | Flags::FIN));
    }

    pub fn on_connect(&self, f: impl FnMut(&A) + 'static) -> Rc<CallbackHandle> {
        self.connect_observers.register(Box::new(f) as Box<ConnectCallback<A>>)
    }

    pub(crate) fn fire_connect_observers(&mut self) {
        let remote = self.remote.clone();
        for f in self.connect_observers.snapshot() {
            (f.borrow_mut())(&remote);
        }
    }

    pub fn on_disconnect(&self, f: impl FnMut(&A) + 'static) -> Rc<CallbackHandle> {
        self.disconnect_observers.register(Box::new(f) as Box<DisconnectCallback<A>>)
    }

    pub(crate) fn fire_disconnect_observers(&mut self) {
        let remote = self.remote.clone();
        for f in self.disconnect_observers.snapshot() {
            (f.borrow_mut())(&remote);
        }
    }
}
