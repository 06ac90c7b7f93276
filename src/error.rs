use std::cell::RefCell;

use thiserror::Error;

/// The error taxonomy from spec.md §7. Every public, fallible operation in
/// this crate returns one of these (wrapped in [`Error`]) rather than
/// unwinding; the protocol engine itself never fails a tick (malformed
/// input is dropped, not propagated).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("unknown class '{0}'")]
    UnknownClass(String),
    #[error("unknown variable '{0}' on class '{1}'")]
    UnknownVariable(String, String),
    #[error("unknown method '{0}'")]
    UnknownMethod(String),
    #[error("type mismatch on variable '{0}'")]
    TypeMismatch(String),
    #[error("value {0} exceeds the width of variable '{1}'")]
    ValueTooWide(u32, String),
    #[error("world is full (65536 object ids in use)")]
    WorldFull,
    #[error("operation not permitted on a replicated (read-only) world")]
    ReadOnlyWorld,
    #[error("callback handle does not exist or was already unset")]
    UnknownCallback,
    #[error("timed out waiting for the peer to reach the expected state")]
    Timeout,
}

impl Error {
    /// A stable label for this error's kind, independent of the formatted
    /// message, for callers that want to match on category rather than
    /// text (e.g. distinguishing schema-violations from state-violations
    /// per spec.md §7's taxonomy).
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownClass(_)
            | Error::UnknownVariable(_, _)
            | Error::UnknownMethod(_)
            | Error::TypeMismatch(_)
            | Error::ValueTooWide(_, _) => ErrorKind::SchemaViolation,
            Error::WorldFull => ErrorKind::ResourceExhaustion,
            Error::ReadOnlyWorld | Error::UnknownCallback => ErrorKind::StateViolation,
            Error::Timeout => ErrorKind::Timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SchemaViolation,
    StateViolation,
    ResourceExhaustion,
    Timeout,
}

pub type Result<T> = std::result::Result<T, Error>;

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Record a recoverable failure, the way the original C library's global
/// `irmo_error_report(function_name, format, ...)` did (see `error.c` in
/// the original source) — but per-thread rather than process-wide, per
/// SPEC_FULL.md §2. Called internally by every fallible public operation
/// that uses the no-op-plus-message convention (schema- and
/// state-violations); protocol-violations are counted instead, not
/// surfaced here.
pub(crate) fn set_last_error(operation: &str, err: &Error) {
    let message = format!("{operation}: {err}");
    tracing::debug!(operation, %err, "operation failed");
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(message));
}

/// The message from the most recent failing call on this thread, if any.
pub fn last_error() -> Option<String> {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

/// Record `result`'s error (if any) as this thread's last error, then hand
/// the `Result` straight back unchanged. Every public `World` operation
/// that follows the §7 "no-op return plus last-error string" convention
/// threads its result through this before returning.
pub(crate) fn note<T>(operation: &str, result: Result<T>) -> Result<T> {
    if let Err(err) = &result {
        set_last_error(operation, err);
    }
    result
}
