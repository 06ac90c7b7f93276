//! Wall-clock milliseconds for the blocking helpers in [`crate::client`]
//! (spec.md §5: "the only blocking primitive is the `block(transport,
//! timeout_ms)` helper"). The tick-driven engine itself never calls this —
//! every engine/driver entry point takes `now_ms` explicitly so tests can
//! drive it with a fabricated clock instead of waiting on real time.

/// Milliseconds since the Unix epoch, saturating rather than panicking if
/// the system clock is somehow set before it.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
