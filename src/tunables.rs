use irmo_proto::constants;

/// Operator-adjustable constants, defaulting to the values spec.md §6 fixes
/// for the wire protocol (SPEC_FULL.md §4). A `Tunables` is supplied once,
/// at [`crate::TransportDriver`]/[`crate::client::connect`] construction
/// time; nothing in the engine reads the global constants in
/// `irmo_proto::constants` directly once a driver exists, so a test harness
/// can shrink timers without touching the wire format.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tunables {
    pub packet_threshold: usize,
    pub initial_ssthresh: usize,
    pub initial_rtt_mean_ms: f64,
    pub initial_rtt_deviation_ms: f64,
    pub handshake_attempts: u32,
    pub handshake_interval_ms: u64,
    pub max_send_window_atoms: usize,
    pub max_datagram_bytes: usize,
    pub connection_timeout_cap_ms: u64,
    pub linger_ms: u64,
}

impl Default for Tunables {
    fn default() -> Self {
        Tunables {
            packet_threshold: constants::PACKET_THRESHOLD,
            initial_ssthresh: constants::INITIAL_SSTHRESH,
            initial_rtt_mean_ms: constants::INITIAL_RTT_MEAN_MS,
            initial_rtt_deviation_ms: constants::INITIAL_RTT_DEVIATION_MS,
            handshake_attempts: constants::HANDSHAKE_ATTEMPTS,
            handshake_interval_ms: constants::HANDSHAKE_INTERVAL_MS,
            max_send_window_atoms: constants::MAX_SEND_WINDOW_ATOMS,
            max_datagram_bytes: constants::MAX_DATAGRAM_BYTES,
            connection_timeout_cap_ms: constants::CONNECTION_TIMEOUT_CAP_MS,
            linger_ms: constants::LINGER_MS,
        }
    }
}
