//! Sketch-to-TikZ refinement loop.
//!
//! A session turns a hand-drawn figure into LaTeX/TikZ by alternating model
//! requests with a local LaTeX toolchain, and lets the user steer it through
//! an editor. The crate is split into:
//!
//! - **[`core`]**: Pure logic (conversation types, fence extraction, retry accounting).
//! - **[`io`]**: Side-effecting collaborators (model API, editor, subprocesses, checkpoints).
//! - **[`agents`]**: One request builder per kind of model call.
//!
//! Orchestration lives in [`session`] (the loop), [`step`] (one iteration) and
//! [`repair`] (the compile-and-repair cycle).

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod repair;
pub mod session;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
