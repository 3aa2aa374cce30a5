//! Reply parsing: fenced code block extraction and refusal detection.

use anyhow::{Context, Result};
use regex::Regex;

/// Extracts the body of the first fenced block tagged with a language.
#[derive(Debug, Clone)]
pub struct FencedBlock {
    language: String,
    pattern: Regex,
}

impl FencedBlock {
    /// Build an extractor for fences opened with "```<language>".
    pub fn new(language: &str) -> Result<Self> {
        let pattern = Regex::new(&format!(r"(?s)```{}(.*?)```", regex::escape(language)))
            .with_context(|| format!("compile fence pattern for '{language}'"))?;
        Ok(Self {
            language: language.to_string(),
            pattern,
        })
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Return the raw text between the first opening fence and the first closing
    /// fence after it, or `None` when the reply has no such block.
    pub fn extract<'a>(&self, reply: &'a str) -> Option<&'a str> {
        self.pattern
            .captures(reply)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

/// True when the reply contains any of the refusal marker phrases.
pub fn is_refusal(reply: &str, markers: &[String]) -> bool {
    markers
        .iter()
        .filter(|marker| !marker.is_empty())
        .any(|marker| reply.contains(marker.as_str()))
}
