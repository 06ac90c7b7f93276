//! Wire codec for the Irmo replication protocol (spec.md §3, §4.8, §6).
//!
//! Three layers, leaves first:
//! - [`buffer::PacketBuffer`] — a growable byte buffer with a bounded-read
//!   cursor.
//! - [`value::Value`] — the four scalar types, encoded big-endian /
//!   NUL-terminated.
//! - [`atom`] — one record kind per entry in the atom catalogue
//!   (spec.md §4.8), each with `verify`/`decode`/`encode`/`wire_length`.
//!   `apply` (the fifth operation in that table) needs the object store and
//!   peer state, which this crate doesn't know about, so it lives in the
//!   `irmo` crate as an extension trait over [`atom::Atom`].
//! - [`packet`] — datagram framing: control frames and the run-length
//!   clustered data section.

pub mod atom;
pub mod buffer;
pub mod constants;
pub mod flags;
pub mod packet;
pub mod value;

pub use atom::{Atom, AtomError, AtomKind};
pub use buffer::{BufferError, PacketBuffer};
pub use constants::*;
pub use flags::Flags;
pub use value::Value;
