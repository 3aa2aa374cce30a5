//! One iteration: code → compile-with-repair → render → critique → editor gate.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::agents::Agents;
use crate::agents::coder::PriorRender;
use crate::core::retry::RetryPolicy;
use crate::io::checkpoint::CheckpointStore;
use crate::io::editor::{Editor, GateDecision, edit_gate};
use crate::io::image::encode_data_uri;
use crate::io::model::{Completer, ModelClient};
use crate::io::toolchain::{Toolchain, render_figure};
use crate::io::transcript::{Artifact, Transcript};
use crate::repair::compile_with_repair;

/// External collaborators shared by every iteration of a session.
pub struct Collaborators<'a, C, E, T> {
    pub client: &'a ModelClient<C>,
    pub editor: &'a E,
    pub toolchain: &'a T,
}

/// Session-wide inputs an iteration reads but never changes.
pub struct IterationContext<'a> {
    pub store: &'a CheckpointStore,
    pub agents: &'a Agents,
    /// Data URI of the user's sketch.
    pub image: &'a str,
    pub instruction: &'a str,
    pub repair_policy: RetryPolicy,
}

/// What a finished iteration hands to the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorIteration {
    pub index: u32,
    pub source: String,
    pub critique: String,
    pub raster_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    /// The user approved a critique; regenerate from it next.
    Continue(PriorIteration),
    /// The user emptied the critique.
    Aborted,
}

/// Run iteration `index`. Without `prior` the code is generated from scratch.
#[instrument(skip_all, fields(index = index, regenerate = prior.is_some()))]
pub fn run_iteration<C: Completer, E: Editor, T: Toolchain, W: Write>(
    index: u32,
    prior: Option<&PriorIteration>,
    ctx: &IterationContext<'_>,
    deps: &Collaborators<'_, C, E, T>,
    transcript: &mut Transcript<W>,
) -> Result<IterationOutcome> {
    let coder = &ctx.agents.coder;
    let source = match prior {
        None => coder.generate(deps.client, ctx.image, ctx.instruction)?,
        Some(prior) => {
            let raster = encode_data_uri(&prior.raster_path)
                .with_context(|| format!("load render of iteration {}", prior.index))?;
            coder.regenerate(
                deps.client,
                ctx.image,
                ctx.instruction,
                &PriorRender {
                    source: &prior.source,
                    critique: &prior.critique,
                    raster: &raster,
                },
            )?
        }
    };
    transcript.show(Artifact::Latex, &source)?;

    let compiled = compile_with_repair(index, source, ctx, deps, transcript)?;

    let paths = ctx.store.paths(index);
    let raster_path = render_figure(deps.toolchain, &paths)
        .with_context(|| format!("render {}", paths.stem))?;
    let raster = encode_data_uri(&raster_path)?;

    let draft = ctx.agents.critic.critique(
        deps.client,
        ctx.image,
        ctx.instruction,
        &raster,
        &compiled.source,
    )?;
    let critique = match edit_gate(deps.editor, &paths.critique_path, &draft)? {
        GateDecision::Approved(text) => text,
        GateDecision::Aborted => {
            info!(index, "critique emptied, stopping");
            return Ok(IterationOutcome::Aborted);
        }
    };
    transcript.show(Artifact::Critique, &critique)?;

    info!(index, repairs = compiled.repairs, "iteration complete");
    Ok(IterationOutcome::Continue(PriorIteration {
        index,
        source: compiled.source,
        critique,
        raster_path,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        EditAction, ScriptedEditor, ScriptedToolchain, bounded_config, fenced, render_bytes,
        scripted_client,
    };
    use std::fs;

    struct Fixture {
        _temp: tempfile::TempDir,
        store: CheckpointStore,
        agents: Agents,
    }

    fn fixture() -> Fixture {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = CheckpointStore::open(temp.path().join("tmp"), "dvi").expect("store");
        let agents = Agents::from_config(&bounded_config()).expect("agents");
        Fixture {
            _temp: temp,
            store,
            agents,
        }
    }

    fn ctx(fixture: &Fixture) -> IterationContext<'_> {
        IterationContext {
            store: &fixture.store,
            agents: &fixture.agents,
            image: "data:image/png;base64,c2tldGNo",
            instruction: "two boxes",
            repair_policy: RetryPolicy::bounded(3),
        }
    }

    #[test]
    fn approved_critique_continues_with_render() {
        let fixture = fixture();
        let config = bounded_config();
        let client = scripted_client(&config, [fenced("v0"), "- bigger".to_string()]);
        let editor = ScriptedEditor::new([EditAction::Keep]);
        let toolchain = ScriptedToolchain::succeeding();
        let deps = Collaborators {
            client: &client,
            editor: &editor,
            toolchain: &toolchain,
        };
        let mut transcript = Transcript::new(Vec::new());

        let outcome =
            run_iteration(0, None, &ctx(&fixture), &deps, &mut transcript).expect("iteration");

        let paths = fixture.store.paths(0);
        assert_eq!(
            outcome,
            IterationOutcome::Continue(PriorIteration {
                index: 0,
                source: "v0".to_string(),
                critique: "- bigger".to_string(),
                raster_path: paths.raster_path.clone(),
            })
        );
        assert_eq!(editor.edited(), vec![paths.critique_path.clone()]);
        assert_eq!(fs::read_to_string(&paths.critique_path).expect("critique"), "- bigger");

        let text = String::from_utf8(transcript.into_inner()).expect("utf8");
        assert!(text.contains("----LaTeX----\nv0\n----LaTeX----"));
        assert!(text.contains("----CRITIQUE----\n- bigger\n----CRITIQUE----"));
    }

    #[test]
    fn regeneration_sends_prior_render() {
        let fixture = fixture();
        let prior_paths = fixture.store.paths(0);
        fs::write(&prior_paths.raster_path, render_bytes("figure-0")).expect("raster");
        let prior = PriorIteration {
            index: 0,
            source: "v0".to_string(),
            critique: "- bigger".to_string(),
            raster_path: prior_paths.raster_path.clone(),
        };

        let config = bounded_config();
        let client = scripted_client(&config, [fenced("v1"), "- fine".to_string()]);
        let editor = ScriptedEditor::new([EditAction::Replace(String::new())]);
        let toolchain = ScriptedToolchain::succeeding();
        let deps = Collaborators {
            client: &client,
            editor: &editor,
            toolchain: &toolchain,
        };
        let mut transcript = Transcript::new(Vec::new());

        let outcome = run_iteration(1, Some(&prior), &ctx(&fixture), &deps, &mut transcript)
            .expect("iteration");
        assert_eq!(outcome, IterationOutcome::Aborted);

        let requests = client.completer().requests();
        let regenerate = &requests[0][1];
        let prior_uri = encode_data_uri(&prior_paths.raster_path).expect("uri");
        assert_eq!(
            regenerate.image_urls(),
            vec!["data:image/png;base64,c2tldGNo", prior_uri.as_str()]
        );
        assert!(regenerate.text().contains("```- bigger```"));
        assert!(fixture.store.paths(1).raster_path.is_file());

        let text = String::from_utf8(transcript.into_inner()).expect("utf8");
        assert!(!text.contains("----CRITIQUE----"));
    }
}
