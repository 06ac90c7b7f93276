//! Irmo: a replicated object space over an unreliable datagram transport
//! (spec.md §1-§9).
//!
//! Layers, leaves first:
//! - [`irmo_schema`] (separate crate) — class/variable/method descriptors,
//!   no I/O.
//! - [`irmo_proto`] (separate crate) — the wire codec: atoms, packet
//!   framing, the scalar value type.
//! - [`object`]/[`world`] — the typed object store and its inheritance-aware
//!   callback graph.
//! - [`peer`]/[`window`]/[`sendqueue`]/[`congestion`] — per-connection state:
//!   handshake/teardown, send/receive windows, RTT and congestion control.
//! - [`atom_apply`] — bridges the wire codec's `Atom` to the object store.
//! - [`engine`] — the tick-driven protocol engine (spec.md §4.4, §4.5).
//! - [`server`]/[`driver`] — peer tables and vhost multiplexing over one
//!   [`transport::Transport`] (spec.md §4.9).
//! - [`client`] — blocking connect/disconnect helpers for the common
//!   one-peer case.
//!
//! Every tick-driven entry point takes `now_ms` explicitly so the whole
//! engine is deterministic under test; only the blocking helpers in
//! [`client`] touch the real wall clock, via [`clock::now_ms`].

pub mod atom_apply;
pub mod callback;
pub mod client;
pub mod clock;
pub mod congestion;
pub mod driver;
pub mod engine;
pub mod error;
pub mod object;
pub mod peer;
pub mod sendqueue;
pub mod seq;
pub mod server;
pub mod transport;
pub mod tunables;
pub mod window;
pub mod world;

pub use callback::{CallbackHandle, MethodCall};
pub use client::{connect, disconnect, Client};
pub use driver::TransportDriver;
pub use error::{last_error, Error, ErrorKind, Result};
pub use object::{Object, ObjectId};
pub use peer::{Address, ConnectionState, Peer};
pub use server::Server;
pub use transport::Transport;
pub use tunables::Tunables;
pub use world::{World, WorldHandle};

pub use irmo_proto::Value;
pub use irmo_schema::{Schema, SchemaBuilder};
