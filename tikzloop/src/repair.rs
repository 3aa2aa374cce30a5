//! Compile-and-repair loop for one iteration.
//!
//! The source is compiled; on failure the compiler log goes back to the model
//! for a corrected source, which is compiled again. Only a successful compile
//! leaves the loop, so the source left on disk is always the one that compiled.

use std::io::Write;
use std::thread;

use anyhow::{Context, Result, bail};
use tracing::{info, instrument, warn};

use crate::core::retry::Attempts;
use crate::io::checkpoint::CheckpointStore;
use crate::io::model::Completer;
use crate::io::toolchain::{CompileOutcome, Toolchain};
use crate::io::transcript::{Artifact, Transcript};
use crate::step::{Collaborators, IterationContext};

enum CompileState {
    Compiling(String),
    Repairing { source: String, log: String },
}

/// Source that compiled, and how many repair rounds it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compiled {
    pub source: String,
    pub repairs: u32,
}

/// Compile `source` as iteration `index`, repairing until it compiles.
///
/// `ctx.repair_policy` bounds the number of repair rounds. Exhausting it is fatal.
#[instrument(skip_all, fields(index = index))]
pub fn compile_with_repair<C: Completer, E, T: Toolchain, W: Write>(
    index: u32,
    source: String,
    ctx: &IterationContext<'_>,
    deps: &Collaborators<'_, C, E, T>,
    transcript: &mut Transcript<W>,
) -> Result<Compiled> {
    let store = ctx.store;
    let paths = store.paths(index);
    let mut rounds = Attempts::new(ctx.repair_policy);
    let mut state = CompileState::Compiling(source);

    loop {
        state = match state {
            CompileState::Compiling(source) => {
                store.save_source(index, &source)?;
                store.clear_log(index)?;
                let outcome = deps
                    .toolchain
                    .compile(&paths)
                    .with_context(|| format!("compile {}", paths.source_path.display()))?;
                if outcome.succeeded {
                    info!(repairs = rounds.made(), "source compiled");
                    return Ok(Compiled {
                        source,
                        repairs: rounds.made(),
                    });
                }
                warn!(exit_code = ?outcome.exit_code, "compile failed");
                let log = failure_log(store, index, &outcome)?;
                CompileState::Repairing { source, log }
            }
            CompileState::Repairing { source, log } => {
                let Some(delay) = rounds.next() else {
                    bail!(
                        "{} still fails to compile after {} repair rounds",
                        paths.source_path.display(),
                        rounds.made()
                    );
                };
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                warn!(round = rounds.made(), "asking the model to repair a compile error");
                let repaired = ctx.agents.coder.repair(deps.client, &source, &log)?;
                transcript.show(Artifact::Latex, &repaired)?;
                CompileState::Compiling(repaired)
            }
        };
    }
}

/// The log this compile left for `index`, or its captured output when it left none.
fn failure_log(store: &CheckpointStore, index: u32, outcome: &CompileOutcome) -> Result<String> {
    if let Some(log) = store.load_log(index)? {
        return Ok(log);
    }
    warn!(index, "compiler left no log file, using its captured output");
    store.save_log(index, &outcome.output)?;
    Ok(outcome.output.clone())
}
