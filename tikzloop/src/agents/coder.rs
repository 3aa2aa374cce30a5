//! Coder agent: produces LaTeX source for the figure.
//!
//! Every reply is reduced to the body of its first fenced block; replies
//! without one are re-requested.

use anyhow::{Context, Result};
use tracing::instrument;

use crate::core::extract::FencedBlock;
use crate::core::retry::RetryPolicy;
use crate::core::types::{ContentPart, Message};
use crate::io::model::{Completer, ModelClient};
use crate::io::prompt::PromptBuilder;

use super::ask_for_code;

/// The previous iteration's result that a regeneration builds on.
#[derive(Debug, Clone, Copy)]
pub struct PriorRender<'a> {
    pub source: &'a str,
    pub critique: &'a str,
    /// Data URI of the previous iteration's raster.
    pub raster: &'a str,
}

pub struct CoderAgent {
    prompts: PromptBuilder,
    fence: FencedBlock,
    extraction: RetryPolicy,
}

impl CoderAgent {
    pub fn new(fence_language: &str, extraction: RetryPolicy) -> Result<Self> {
        Ok(Self {
            prompts: PromptBuilder::new(),
            fence: FencedBlock::new(fence_language)?,
            extraction,
        })
    }

    /// First draft from the sketch and the approved instruction.
    #[instrument(skip_all)]
    pub fn generate<C: Completer>(
        &self,
        client: &ModelClient<C>,
        image: &str,
        instruction: &str,
    ) -> Result<String> {
        let messages = [Message::user(vec![
            ContentPart::text(self.prompts.generate(instruction)?),
            ContentPart::image(image),
        ])];
        ask_for_code(client, &self.fence, self.extraction, &messages).context("generate code")
    }

    /// Revised source from the previous source, its render and the approved critique.
    #[instrument(skip_all)]
    pub fn regenerate<C: Completer>(
        &self,
        client: &ModelClient<C>,
        image: &str,
        instruction: &str,
        prior: &PriorRender<'_>,
    ) -> Result<String> {
        let prompt = self
            .prompts
            .regenerate(prior.source, instruction, prior.critique)?;
        let messages = [Message::user(vec![
            ContentPart::text(prompt),
            ContentPart::image(image),
            ContentPart::image(prior.raster),
        ])];
        ask_for_code(client, &self.fence, self.extraction, &messages).context("regenerate code")
    }

    /// Corrected source for a compile failure. Text only.
    #[instrument(skip_all, fields(log_bytes = log.len()))]
    pub fn repair<C: Completer>(
        &self,
        client: &ModelClient<C>,
        source: &str,
        log: &str,
    ) -> Result<String> {
        let messages = [Message::user(vec![ContentPart::text(
            self.prompts.repair(source, log)?,
        )])];
        ask_for_code(client, &self.fence, self.extraction, &messages).context("repair code")
    }
}
