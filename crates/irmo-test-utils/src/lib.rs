// irmo-test-utils: shared test scaffolding for the scenario suites (spec.md
// §8) — an in-memory, chaos-injecting transport plus a tick-loop harness, so
// a test never needs a real socket or real wall-clock time.

pub mod chaos_transport;
pub mod harness;
pub mod network;

pub use chaos_transport::ChaosTransport;
pub use harness::{run_until, Clock};
pub use network::Network;
