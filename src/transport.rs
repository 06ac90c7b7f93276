//! The datagram transport seam (spec.md §1 "Out of scope": "The datagram
//! transport itself (the library expects a connectionless, unreliable,
//! best-effort send/receive primitive supplied by the host)"). The core
//! never opens a socket; it only needs something that can send bytes to an
//! address and hand back whatever arrived since it was last asked.
//!
//! A production host implements this over a real UDP socket. Tests use
//! `irmo-test-utils`'s in-memory implementation instead, which can inject
//! loss, latency and reordering without any real I/O.

use crate::peer::Address;

pub trait Transport<A: Address> {
    /// Best-effort send; the transport may silently drop this (that's the
    /// whole point of the reliability layer living above it).
    fn send(&mut self, addr: &A, bytes: &[u8]);

    /// Pop the next arrived datagram, if any. Called in a loop by
    /// [`crate::driver::TransportDriver::tick`] until it returns `None`.
    fn receive(&mut self) -> Option<(A, Vec<u8>)>;
}
