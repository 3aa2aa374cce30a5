//! Model client: chat-completions transport plus refusal retry.
//!
//! The [`Completer`] trait is the single network seam (one blocking round trip).
//! [`ModelClient`] wraps a completer with the session's request conventions:
//! an empty system message in front of every request and re-sending the
//! identical request while the model refuses. Tests use scripted completers
//! that return queued replies without touching the network.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::core::extract::is_refusal;
use crate::core::retry::{Attempts, RetryPolicy};
use crate::core::types::Message;
use crate::io::config::ModelConfig;
use crate::io::non_empty_env;

/// One blocking completion round trip.
pub trait Completer {
    /// Send `messages` as-is and return the reply text.
    fn complete(&self, messages: &[Message]) -> Result<String>;
}

/// Completer backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompleter {
    http: HttpClient,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiCompleter {
    /// Build from config. Fails when the API key variable is unset or empty.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let api_key = non_empty_env(&config.api_key_env)
            .ok_or_else(|| anyhow!("{} not set", config.api_key_env))?;
        let api_base = non_empty_env("OPENAI_API_BASE").unwrap_or_else(|| config.api_base.clone());
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", api_base.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

impl Completer for OpenAiCompleter {
    #[instrument(skip_all, fields(model = %self.model, messages = messages.len()))]
    fn complete(&self, messages: &[Message]) -> Result<String> {
        let payload = build_payload(&self.model, self.max_tokens, messages);
        debug!(endpoint = %self.endpoint, "sending completion request");
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("accept", "application/json")
            .header(CONTENT_TYPE, "application/json")
            .json(&payload)
            .send()
            .with_context(|| format!("completion request failed ({})", self.endpoint))?;

        let status = response.status();
        let body = response
            .text()
            .context("completion response body read failed")?;
        if !status.is_success() {
            bail!(
                "completion request failed ({}): {}",
                status.as_u16(),
                truncate_text(&body, 512)
            );
        }
        let parsed: Value =
            serde_json::from_str(&body).context("completion endpoint returned invalid JSON")?;
        reply_text(&parsed)
    }
}

fn build_payload(model: &str, max_tokens: u32, messages: &[Message]) -> Value {
    json!({
        "model": model,
        "messages": messages,
        "max_tokens": max_tokens,
    })
}

fn reply_text(payload: &Value) -> Result<String> {
    payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            anyhow!(
                "completion response missing choices[0].message.content: {}",
                truncate_text(&payload.to_string(), 512)
            )
        })
}

/// Session-scoped model client. Construct once and pass by reference.
pub struct ModelClient<C> {
    completer: C,
    refusal_markers: Vec<String>,
    refusal_policy: RetryPolicy,
}

impl<C: Completer> ModelClient<C> {
    pub fn new(completer: C, refusal_markers: Vec<String>, refusal_policy: RetryPolicy) -> Self {
        Self {
            completer,
            refusal_markers,
            refusal_policy,
        }
    }

    pub fn completer(&self) -> &C {
        &self.completer
    }

    /// Send `messages` behind the empty system message and return the first non-refusing reply.
    ///
    /// Refusals re-send the identical request until the refusal policy is
    /// exhausted. Transport errors are returned immediately.
    #[instrument(skip_all, fields(messages = messages.len()))]
    pub fn query(&self, messages: Vec<Message>) -> Result<String> {
        let mut request = Vec::with_capacity(messages.len() + 1);
        request.push(Message::empty_system());
        request.extend(messages);

        let mut attempts = Attempts::new(self.refusal_policy);
        while let Some(delay) = attempts.next() {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            let reply = self.completer.complete(&request)?;
            if !is_refusal(&reply, &self.refusal_markers) {
                debug!(attempt = attempts.made(), bytes = reply.len(), "model replied");
                return Ok(reply);
            }
            warn!(
                attempt = attempts.made(),
                reply = %truncate_text(&reply, 200),
                "request rejected by model, retrying"
            );
        }
        bail!("model refused the request {} times", attempts.made())
    }
}

fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ContentPart, Role};
    use std::cell::RefCell;
    use std::collections::VecDeque;

    struct QueueCompleter {
        replies: RefCell<VecDeque<String>>,
        requests: RefCell<Vec<Vec<Message>>>,
    }

    impl QueueCompleter {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: RefCell::new(replies.iter().map(|r| r.to_string()).collect()),
                requests: RefCell::new(Vec::new()),
            }
        }
    }

    impl Completer for QueueCompleter {
        fn complete(&self, messages: &[Message]) -> Result<String> {
            self.requests.borrow_mut().push(messages.to_vec());
            self.replies
                .borrow_mut()
                .pop_front()
                .ok_or_else(|| anyhow!("no scripted reply"))
        }
    }

    fn markers() -> Vec<String> {
        vec!["I'm sorry,".to_string()]
    }

    fn prompt() -> Vec<Message> {
        vec![Message::user(vec![ContentPart::text("draw it")])]
    }

    #[test]
    fn query_prepends_empty_system_message() {
        let client = ModelClient::new(
            QueueCompleter::new(&["ok"]),
            markers(),
            RetryPolicy::UNBOUNDED,
        );

        let reply = client.query(prompt()).expect("query");
        assert_eq!(reply, "ok");

        let requests = client.completer().requests.borrow();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0][0], Message::empty_system());
        assert_eq!(requests[0][1].role, Role::User);
    }

    #[test]
    fn refusals_resend_identical_request() {
        let client = ModelClient::new(
            QueueCompleter::new(&["I'm sorry, no.", "I'm sorry, still no.", "fine"]),
            markers(),
            RetryPolicy::UNBOUNDED,
        );

        let reply = client.query(prompt()).expect("query");
        assert_eq!(reply, "fine");

        let requests = client.completer().requests.borrow();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0], requests[1]);
        assert_eq!(requests[1], requests[2]);
        assert_eq!(requests[2].len(), 2, "system message is not stacked on retry");
    }

    #[test]
    fn bounded_refusal_policy_gives_up() {
        let client = ModelClient::new(
            QueueCompleter::new(&["I'm sorry, no.", "I'm sorry, no.", "fine"]),
            markers(),
            RetryPolicy::bounded(2),
        );

        let err = client.query(prompt()).unwrap_err();
        assert!(err.to_string().contains("refused the request 2 times"));
        assert_eq!(client.completer().requests.borrow().len(), 2);
    }

    #[test]
    fn transport_errors_are_not_retried() {
        let client = ModelClient::new(QueueCompleter::new(&[]), markers(), RetryPolicy::UNBOUNDED);
        let err = client.query(prompt()).unwrap_err();
        assert!(err.to_string().contains("no scripted reply"));
        assert_eq!(client.completer().requests.borrow().len(), 1);
    }

    #[test]
    fn payload_carries_model_and_limit() {
        let payload = build_payload("gpt-test", 42, &prompt());
        assert_eq!(payload["model"], "gpt-test");
        assert_eq!(payload["max_tokens"], 42);
        assert_eq!(payload["messages"][0]["role"], "user");
        assert_eq!(payload["messages"][0]["content"][0]["text"], "draw it");
    }

    #[test]
    fn reply_text_reads_first_choice() {
        let payload = json!({"choices": [{"message": {"role": "assistant", "content": "hi"}}]});
        assert_eq!(reply_text(&payload).expect("reply"), "hi");

        let err = reply_text(&json!({"choices": []})).unwrap_err();
        assert!(err.to_string().contains("missing choices"));
    }
}
