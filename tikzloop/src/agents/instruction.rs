//! Instruction agent: asks the model for a formal description of the sketch.

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::core::types::{ContentPart, Message};
use crate::io::model::{Completer, ModelClient};
use crate::io::prompt::PromptBuilder;

#[derive(Default)]
pub struct InstructionAgent {
    prompts: PromptBuilder,
}

impl InstructionAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Describe the sketch at `image` (a data URI), guided by the user's hint.
    ///
    /// The reply is returned as-is for the user to edit.
    #[instrument(skip_all, fields(hint_len = hint.len()))]
    pub fn describe<C: Completer>(
        &self,
        client: &ModelClient<C>,
        image: &str,
        hint: &str,
    ) -> Result<String> {
        let prompt = self.prompts.instruction(hint)?;
        let reply = client
            .query(vec![Message::user(vec![
                ContentPart::text(prompt),
                ContentPart::image(image),
            ])])
            .context("generate instruction")?;
        info!(bytes = reply.len(), "instruction drafted");
        Ok(reply)
    }
}
