//! Schema descriptor types for Irmo interface specifications.
//!
//! A [`Schema`] enumerates the classes (with their inheritance chain and
//! typed variables) and methods (with their typed arguments) that one
//! world's objects conform to. Schemas are immutable once built and carry a
//! deterministic content hash used to gate the wire handshake between
//! peers (spec.md §3, §6).
//!
//! This crate has no knowledge of networking, encoding, or the object
//! store; it is pure data plus name/ordinal lookups, consumed by
//! `irmo-proto` and `irmo`.

mod class;
mod error;
mod method;
mod schema;
mod value;

pub use class::{Class, Variable};
pub use error::SchemaError;
pub use method::{Argument, Method};
pub use schema::{Schema, SchemaBuilder};
pub use value::ValueType;
