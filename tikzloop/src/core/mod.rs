//! Deterministic, pure logic shared by the session loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data (model replies, retry counters, conversation values) and return
//! deterministic outputs suitable for tests.

pub mod extract;
pub mod retry;
pub mod types;
