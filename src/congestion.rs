//! Round-trip estimation and congestion control (spec.md §4.4 step 4,
//! §4.5 step 3). Mirrors the constants in `client.c` of the original
//! source: `rtt = 3000`, `rtt_deviation = 1000`, `backoff = 1`,
//! `cwnd = PACKET_THRESHOLD`, `ssthresh = 65535`.

use crate::tunables::Tunables;

/// Jacobson/Karels RTT estimation, updated once per acknowledged,
/// not-previously-resent atom (spec.md §4.5 step 3).
#[derive(Debug, Clone, Copy)]
pub struct RttEstimator {
    mean_ms: f64,
    deviation_ms: f64,
}

impl RttEstimator {
    pub fn new(tunables: &Tunables) -> Self {
        RttEstimator {
            mean_ms: tunables.initial_rtt_mean_ms,
            deviation_ms: tunables.initial_rtt_deviation_ms,
        }
    }

    pub fn mean_ms(&self) -> f64 {
        self.mean_ms
    }

    pub fn deviation_ms(&self) -> f64 {
        self.deviation_ms
    }

    /// `base_timeout` from spec.md §4.4 step 1: `mean + 2*deviation + 1`.
    pub fn base_timeout_ms(&self) -> f64 {
        self.mean_ms + 2.0 * self.deviation_ms + 1.0
    }

    /// Fold one round-trip sample in: `err = measured - mean; mean +=
    /// err/8; dev += (|err| - dev)/4`.
    pub fn sample(&mut self, measured_ms: f64) {
        let err = measured_ms - self.mean_ms;
        self.mean_ms += err / 8.0;
        self.deviation_ms += (err.abs() - self.deviation_ms) / 4.0;
    }
}

/// TCP-Reno-style slow-start / congestion-avoidance state (spec.md §4.4
/// steps 2 and 4, §4.5 step 3).
#[derive(Debug, Clone, Copy)]
pub struct CongestionController {
    pub cwnd: f64,
    pub ssthresh: usize,
    pub backoff: u32,
    pub local_sendwindow_max: usize,
    pub remote_sendwindow_max: usize,
    packet_threshold: usize,
}

impl CongestionController {
    pub fn new(tunables: &Tunables) -> Self {
        CongestionController {
            cwnd: tunables.packet_threshold as f64,
            ssthresh: tunables.initial_ssthresh,
            backoff: 1,
            local_sendwindow_max: 0,
            remote_sendwindow_max: 0,
            packet_threshold: tunables.packet_threshold,
        }
    }

    /// The effective byte cap for the current tick (spec.md §4.4 step 2):
    /// the minimum of whichever of `local_sendwindow_max`/
    /// `remote_sendwindow_max` are set, falling back to `cwnd`.
    pub fn effective_cap(&self) -> usize {
        match (self.local_sendwindow_max, self.remote_sendwindow_max) {
            (0, 0) => self.cwnd as usize,
            (0, r) => r,
            (l, 0) => l,
            (l, r) => l.min(r),
        }
    }

    /// Grow the window on forward ack progress (spec.md §4.5 step 3):
    /// slow-start adds one packet-size per acked packet, congestion
    /// avoidance adds `PACKET_THRESHOLD^2 / cwnd`.
    pub fn grow_on_ack(&mut self) {
        if self.cwnd <= self.ssthresh as f64 {
            self.cwnd += self.packet_threshold as f64;
        } else {
            self.cwnd += (self.packet_threshold * self.packet_threshold) as f64 / self.cwnd;
        }
    }

    /// Reset `backoff` to 1 on any forward ack progress.
    pub fn reset_backoff(&mut self) {
        self.backoff = 1;
    }

    /// Apply loss at the head of the window (spec.md §4.4 step 4): on the
    /// *first* loss event, halve `cwnd` into `ssthresh` and reset `cwnd`
    /// to the packet threshold; always double `backoff` afterwards.
    pub fn on_head_loss(&mut self) {
        if self.backoff == 1 {
            self.ssthresh = (self.cwnd / 2.0) as usize;
            self.cwnd = self.packet_threshold as f64;
        }
        self.backoff *= 2;
    }
}
