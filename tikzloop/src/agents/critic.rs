//! Critic agent: compares the render with the sketch and suggests fixes.

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::core::types::{ContentPart, Message};
use crate::io::model::{Completer, ModelClient};
use crate::io::prompt::PromptBuilder;

#[derive(Default)]
pub struct CriticAgent {
    prompts: PromptBuilder,
}

impl CriticAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bullet-point feedback on `source`, whose render is `raster`.
    ///
    /// The sketch is attached first and the render second, matching the prompt's
    /// "first figure" and "second figure".
    #[instrument(skip_all)]
    pub fn critique<C: Completer>(
        &self,
        client: &ModelClient<C>,
        image: &str,
        instruction: &str,
        raster: &str,
        source: &str,
    ) -> Result<String> {
        let prompt = self.prompts.critique(source, instruction)?;
        let reply = client
            .query(vec![Message::user(vec![
                ContentPart::text(prompt),
                ContentPart::image(image),
                ContentPart::image(raster),
            ])])
            .context("generate critique")?;
        info!(bytes = reply.len(), "critique drafted");
        Ok(reply)
    }
}
