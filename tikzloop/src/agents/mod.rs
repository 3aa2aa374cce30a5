//! Model-facing agents: each turns session state into one kind of request.

use std::thread;

use anyhow::{Result, bail};
use tracing::{debug, warn};

use crate::core::extract::FencedBlock;
use crate::core::retry::{Attempts, RetryPolicy};
use crate::core::types::Message;
use crate::io::config::TikzConfig;
use crate::io::model::{Completer, ModelClient};

pub mod coder;
pub mod critic;
pub mod instruction;

use coder::CoderAgent;
use critic::CriticAgent;
use instruction::InstructionAgent;

/// The three agents a session talks through.
pub struct Agents {
    pub instruction: InstructionAgent,
    pub coder: CoderAgent,
    pub critic: CriticAgent,
}

impl Agents {
    pub fn from_config(config: &TikzConfig) -> Result<Self> {
        Ok(Self {
            instruction: InstructionAgent::new(),
            coder: CoderAgent::new(&config.fence_language, config.retry.extraction)?,
            critic: CriticAgent::new(),
        })
    }
}

/// Send `messages` until a reply carries a fenced block, and return the block.
///
/// The identical request is re-sent each time; the policy bounds the attempts.
pub(crate) fn ask_for_code<C: Completer>(
    client: &ModelClient<C>,
    fence: &FencedBlock,
    policy: RetryPolicy,
    messages: &[Message],
) -> Result<String> {
    let mut attempts = Attempts::new(policy);
    while let Some(delay) = attempts.next() {
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        let reply = client.query(messages.to_vec())?;
        if let Some(code) = fence.extract(&reply) {
            debug!(attempt = attempts.made(), bytes = code.len(), "extracted code block");
            return Ok(code.to_string());
        }
        warn!(
            attempt = attempts.made(),
            language = fence.language(),
            "reply had no fenced code block, retrying"
        );
    }
    bail!(
        "no ```{} block in {} model replies",
        fence.language(),
        attempts.made()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ContentPart;
    use crate::test_support::{bounded_config, fenced, scripted_client};

    fn request() -> Vec<Message> {
        vec![Message::user(vec![ContentPart::text("code please")])]
    }

    #[test]
    fn retries_identical_request_until_block_appears() {
        let config = bounded_config();
        let client = scripted_client(
            &config,
            ["sure, thinking about it", "still no code", fenced("\n\\tikz;\n").as_str()],
        );
        let fence = FencedBlock::new("latex").expect("fence");

        let code = ask_for_code(&client, &fence, RetryPolicy::UNBOUNDED, &request())
            .expect("code");
        assert_eq!(code, "\n\\tikz;\n");

        let requests = client.completer().requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0], requests[2]);
    }

    #[test]
    fn exhausted_policy_is_an_error() {
        let config = bounded_config();
        let client = scripted_client(&config, ["nope", "nope"]);
        let fence = FencedBlock::new("latex").expect("fence");

        let err = ask_for_code(&client, &fence, RetryPolicy::bounded(2), &request()).unwrap_err();
        assert!(err.to_string().contains("no ```latex block in 2 model replies"));
    }

    #[test]
    fn refusals_do_not_count_against_extraction() {
        let config = bounded_config();
        let client = scripted_client(
            &config,
            ["I'm sorry, I can't.", "no block", fenced("x").as_str()],
        );
        let fence = FencedBlock::new("latex").expect("fence");

        let code = ask_for_code(&client, &fence, RetryPolicy::bounded(2), &request())
            .expect("code");
        assert_eq!(code, "x");
        assert_eq!(client.completer().request_count(), 3);
    }
}
