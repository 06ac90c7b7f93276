//! Atom application (spec.md §4.8 "Apply" column) — the operation
//! `irmo_proto::Atom` can't implement itself because it needs the object
//! store and peer state, which the wire-codec crate doesn't depend on
//! (see `irmo_proto`'s crate-level doc comment). Implemented here as an
//! extension trait over the foreign `Atom` type, legal under Rust's
//! orphan rules because the trait is local even though the type isn't.

use irmo_proto::{Atom, Value};

use crate::callback::MethodCall;
use crate::peer::{Address, Peer};
use crate::world::World;

/// What happened when an inbound atom was applied. Never an [`Error`]
/// (`crate::error::Error`) — the protocol engine never fails a tick
/// (spec.md §5); malformed or premature atoms are retried or silently
/// dropped, not surfaced as Rust errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApplyOutcome {
    Applied,
    /// The atom's prerequisite object doesn't exist yet; leave it in
    /// place and stop processing the receive window prefix (spec.md §4.5
    /// step 5, §4.8 "change" apply row).
    Retry,
    /// Reject silently; the caller bumps the peer's protocol-violation
    /// counter (spec.md §4.8 "new-object"/"destroy" apply rows, §7).
    ProtocolViolation,
}

pub(crate) trait AtomApply {
    fn apply<A: Address>(&self, world: &mut World, peer: &mut Peer<A>, seq: u32) -> ApplyOutcome;
}

impl AtomApply for Atom {
    fn apply<A: Address>(&self, world: &mut World, peer: &mut Peer<A>, seq: u32) -> ApplyOutcome {
        match self {
            Atom::Null => ApplyOutcome::Applied,

            Atom::NewObject { id, class_ordinal } => {
                if world.object(*id).is_some() {
                    return ApplyOutcome::ProtocolViolation;
                }
                let Some(class) = world.schema().class(*class_ordinal) else {
                    return ApplyOutcome::ProtocolViolation;
                };
                let values: Vec<Value> = class.variables().iter().map(|v| Value::default_for(v.value_type)).collect();
                world.insert_replicated_object(*id, *class_ordinal, values);
                ApplyOutcome::Applied
            }

            Atom::Change {
                class_ordinal, id, changes, ..
            } => {
                let Some(object) = world.object(*id) else {
                    return ApplyOutcome::Retry;
                };
                if object.class_ordinal() != *class_ordinal {
                    return ApplyOutcome::Retry;
                }
                for (ordinal, value) in changes {
                    // Per-variable last-writer-wins guard lives in
                    // `World::apply_variable_write` (spec.md §4.5 step 6).
                    let _ = world.apply_variable_write(*id, *ordinal, value.clone(), seq);
                }
                ApplyOutcome::Applied
            }

            Atom::Destroy { id } => {
                if world.apply_destroy(*id).is_err() {
                    return ApplyOutcome::ProtocolViolation;
                }
                ApplyOutcome::Applied
            }

            Atom::Method {
                method_ordinal,
                arguments,
            } => {
                let call = MethodCall {
                    method_ordinal: *method_ordinal,
                    arguments: arguments.clone(),
                    source: Some(format!("{:?}", peer.remote())),
                };
                world.raise_method(&call);
                ApplyOutcome::Applied
            }

            Atom::WindowAdvertisement { max_bytes } => {
                peer.congestion.remote_sendwindow_max = *max_bytes as usize;
                ApplyOutcome::Applied
            }
        }
    }
}
