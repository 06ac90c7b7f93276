//! Wire-level constants from spec.md §6.

/// Atoms are clustered into one packet while the run's cumulative wire
/// length fits this many bytes; also the initial/minimum congestion
/// window.
pub const PACKET_THRESHOLD: usize = 128;

pub const INITIAL_SSTHRESH: usize = 65_535;
pub const INITIAL_RTT_MEAN_MS: f64 = 3000.0;
pub const INITIAL_RTT_DEVIATION_MS: f64 = 1000.0;

pub const HANDSHAKE_ATTEMPTS: u32 = 6;
pub const HANDSHAKE_INTERVAL_MS: u64 = 1000;

pub const MAX_SEND_WINDOW_ATOMS: usize = 1024;
pub const MAX_DATAGRAM_BYTES: usize = 65_536;

pub const MAX_CLASSES: usize = 256;
pub const MAX_METHODS: usize = 256;
pub const MAX_VARIABLES: usize = 256;
pub const MAX_ARGUMENTS: usize = 256;

pub const MAX_OBJECTS_PER_WORLD: usize = 65_536;

/// Resolution of spec.md §9's "string field verification" open question:
/// an explicit per-field cap, well under [`MAX_DATAGRAM_BYTES`], so one
/// pathological string can't consume a whole packet's worth of memory many
/// times over via run-length clustering. See SPEC_FULL.md §7.
pub const MAX_STRING_FIELD_BYTES: usize = 4096;

/// Linger period after a remote-initiated disconnect (spec.md §4.7).
pub const LINGER_MS: u64 = 10_000;

/// Per-peer connection timeout cap: `base_timeout * backoff` beyond this
/// forces a disconnect (spec.md §4.4 step 1).
pub const CONNECTION_TIMEOUT_CAP_MS: u64 = 40_000;
