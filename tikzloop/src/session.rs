//! Session driver: instruction gate, then iterations until the user stops.
//!
//! A fresh session drafts the instruction and generates iteration 0 from
//! scratch. A resumed session (`start_iteration = N > 0`) reads the persisted
//! instruction plus iteration N's source, approved critique and render, then
//! regenerates iteration N+1 exactly as an uninterrupted session would have.
//! Iteration N's files are left as they were.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::agents::Agents;
use crate::io::checkpoint::CheckpointStore;
use crate::io::config::TikzConfig;
use crate::io::editor::{Editor, GateDecision, edit_gate};
use crate::io::image::encode_data_uri;
use crate::io::model::Completer;
use crate::io::toolchain::Toolchain;
use crate::io::transcript::{Artifact, Transcript};
use crate::step::{Collaborators, IterationContext, IterationOutcome, PriorIteration, run_iteration};

/// Inputs for one invocation of the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub image_path: PathBuf,
    pub hint: String,
    /// Checkpointed iteration to continue from. `0` starts a fresh session.
    pub start_iteration: u32,
    pub workdir: PathBuf,
}

/// Where the user stopped the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortPoint {
    Instruction,
    Critique { index: u32 },
}

/// Why the session ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The user saved an empty file at a gate.
    Aborted { at: AbortPoint, iterations_run: u32 },
    /// `max_iterations` iterations ran in this invocation.
    IterationLimit { iterations_run: u32, max_iterations: u32 },
}

/// Run a session until the user aborts, the iteration limit is hit, or an error occurs.
#[instrument(skip_all, fields(image = %request.image_path.display(), start = request.start_iteration))]
pub fn run_session<C: Completer, E: Editor, T: Toolchain, W: Write>(
    request: &SessionRequest,
    config: &TikzConfig,
    deps: &Collaborators<'_, C, E, T>,
    transcript: &mut Transcript<W>,
) -> Result<SessionOutcome> {
    let store = CheckpointStore::open(&request.workdir, &config.toolchain.intermediate_extension)?;
    let agents = Agents::from_config(config)?;
    let image = encode_data_uri(&request.image_path).context("load source image")?;

    let (instruction, mut prior) = if request.start_iteration == 0 {
        let draft = agents
            .instruction
            .describe(deps.client, &image, &request.hint)?;
        match edit_gate(deps.editor, &store.instruction_path(), &draft)? {
            GateDecision::Approved(text) => (text, None),
            GateDecision::Aborted => {
                info!("instruction emptied, stopping");
                return Ok(SessionOutcome::Aborted {
                    at: AbortPoint::Instruction,
                    iterations_run: 0,
                });
            }
        }
    } else {
        let from = request.start_iteration;
        let resume = store
            .load_resume(from)
            .with_context(|| format!("resume from iteration {from}"))?;
        info!(from, "resuming from checkpoint");
        let prior = PriorIteration {
            index: from,
            source: resume.source,
            critique: resume.critique,
            raster_path: resume.from.raster_path,
        };
        (resume.instruction, Some(prior))
    };
    transcript.show(Artifact::Instruction, &instruction)?;

    let ctx = IterationContext {
        store: &store,
        agents: &agents,
        image: &image,
        instruction: &instruction,
        repair_policy: config.retry.repair,
    };

    let mut index = prior.as_ref().map_or(0, |prior| prior.index + 1);
    let mut iterations_run = 0u32;
    loop {
        if let Some(max_iterations) = config.max_iterations
            && iterations_run >= max_iterations
        {
            info!(iterations_run, max_iterations, "iteration limit reached");
            return Ok(SessionOutcome::IterationLimit {
                iterations_run,
                max_iterations,
            });
        }

        let outcome = run_iteration(index, prior.as_ref(), &ctx, deps, transcript)
            .with_context(|| format!("iteration {index}"))?;
        iterations_run += 1;
        match outcome {
            IterationOutcome::Continue(next) => prior = Some(next),
            IterationOutcome::Aborted => {
                return Ok(SessionOutcome::Aborted {
                    at: AbortPoint::Critique { index },
                    iterations_run,
                });
            }
        }
        index += 1;
    }
}
