//! Turn a hand-drawn figure into TikZ with a multimodal model.
//!
//! Checkpoints go to `--workdir` (default `tmp/`): the approved instruction and,
//! per iteration, `figure-<n>.tex`, its renders and the approved critique. Save
//! an empty file in the editor to stop; rerun with `--continue N` to pick up
//! from iteration N's checkpoint with iteration N+1.

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use tikzloop::exit_codes;
use tikzloop::io::config::{CONFIG_FILE_NAME, load_config};
use tikzloop::io::editor::ExternalEditor;
use tikzloop::io::model::{ModelClient, OpenAiCompleter};
use tikzloop::io::toolchain::LatexToolchain;
use tikzloop::io::transcript::Transcript;
use tikzloop::logging;
use tikzloop::session::{SessionOutcome, SessionRequest, run_session};
use tikzloop::step::Collaborators;

#[derive(Parser)]
#[command(
    name = "tikzloop",
    version,
    about = "Generates TikZ code from a hand-drawn figure with a multimodal model"
)]
struct Cli {
    /// File name of the image.
    image: PathBuf,

    /// A short hint that guides the generation.
    #[arg(long, default_value = "")]
    hint: String,

    /// Continue from this iteration's checkpoint, regenerating the next one.
    #[arg(long = "continue", value_name = "N", default_value_t = 0)]
    continue_from: u32,

    /// Checkpoint directory.
    #[arg(long, default_value = "tmp")]
    workdir: PathBuf,

    /// Config file. Defaults to `<workdir>/tikzloop.toml`; a missing file means defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    logging::init();
    match run(Cli::parse()) {
        Ok(outcome) => {
            report(&outcome);
            std::process::exit(exit_codes::OK);
        }
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FAILED);
        }
    }
}

fn run(cli: Cli) -> Result<SessionOutcome> {
    let config_path = cli
        .config
        .unwrap_or_else(|| cli.workdir.join(CONFIG_FILE_NAME));
    let config = load_config(&config_path)?;

    let client = ModelClient::new(
        OpenAiCompleter::from_config(&config.model)?,
        config.model.refusal_markers.clone(),
        config.retry.refusal,
    );
    let editor = ExternalEditor::resolve(config.editor.command.as_deref())?;
    let toolchain = LatexToolchain::new(config.toolchain.clone());
    let deps = Collaborators {
        client: &client,
        editor: &editor,
        toolchain: &toolchain,
    };

    let request = SessionRequest {
        image_path: cli.image,
        hint: cli.hint,
        start_iteration: cli.continue_from,
        workdir: cli.workdir,
    };
    let mut transcript = Transcript::new(io::stdout());
    run_session(&request, &config, &deps, &mut transcript)
}

fn report(outcome: &SessionOutcome) {
    match outcome {
        SessionOutcome::Aborted { at, iterations_run } => {
            info!(?at, iterations_run, "session stopped by user");
        }
        SessionOutcome::IterationLimit {
            iterations_run,
            max_iterations,
        } => {
            eprintln!("stopped after {iterations_run} iterations (max_iterations = {max_iterations})");
        }
    }
}
