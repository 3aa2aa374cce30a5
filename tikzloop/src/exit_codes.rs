//! Stable exit codes for the `tikzloop` binary.

/// The user stopped the session at an editor gate, or the iteration limit was reached.
pub const OK: i32 = 0;
/// The session failed (missing input, tool failure, network error, exhausted retries).
pub const FAILED: i32 = 1;
