//! Session configuration stored as TOML (default `<workdir>/tikzloop.toml`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::retry::RetryPolicy;

/// Default configuration file name inside the checkpoint directory.
pub const CONFIG_FILE_NAME: &str = "tikzloop.toml";

/// Top-level configuration (TOML).
///
/// Every field has a default, so a missing file or a partial file is valid.
/// Omitting `max_attempts` in a retry table keeps that loop unbounded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TikzConfig {
    /// Language tag of the fenced code block extracted from model replies.
    pub fence_language: String,

    /// Stop after this many iterations in one run. Unset means run until the user aborts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,

    pub model: ModelConfig,
    pub retry: RetryConfig,
    pub toolchain: ToolchainConfig,
    pub editor: EditorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of the chat-completions API. `OPENAI_API_BASE` overrides it.
    pub api_base: String,
    pub model: String,
    pub max_tokens: u32,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    /// Replies containing any of these phrases are treated as refusals and retried.
    pub refusal_markers: Vec<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4-vision-preview".to_string(),
            max_tokens: 1000,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 300,
            refusal_markers: vec!["I'm sorry,".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct RetryConfig {
    /// Re-sending a request the model refused.
    pub refusal: RetryPolicy,
    /// Re-sending a request whose reply had no fenced code block.
    pub extraction: RetryPolicy,
    /// Compile-error repair rounds within one iteration.
    pub repair: RetryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolchainConfig {
    /// LaTeX compiler command; output directory, mode flags and source path are appended.
    pub compiler: Vec<String>,
    /// Extension of the compiler's intermediate output (`dvi` for `dvilualatex`).
    pub intermediate_extension: String,
    /// Intermediate-to-SVG command; `--output=<svg>` and the intermediate path are appended.
    pub vectorizer: Vec<String>,
    /// SVG-to-PNG command; the SVG and PNG paths are appended.
    pub rasterizer: Vec<String>,
    /// Wall-clock limit per tool invocation.
    pub timeout_secs: u64,
    /// Truncate captured tool stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            compiler: vec!["dvilualatex".to_string()],
            intermediate_extension: "dvi".to_string(),
            vectorizer: vec!["dvisvgm".to_string(), "--no-fonts".to_string()],
            rasterizer: vec!["convert".to_string()],
            timeout_secs: 10 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct EditorConfig {
    /// Editor command line (e.g. `"code --wait"`). Falls back to `$VISUAL`, `$EDITOR`, then `vim`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl Default for TikzConfig {
    fn default() -> Self {
        Self {
            fence_language: "latex".to_string(),
            max_iterations: None,
            model: ModelConfig::default(),
            retry: RetryConfig::default(),
            toolchain: ToolchainConfig::default(),
            editor: EditorConfig::default(),
        }
    }
}

impl TikzConfig {
    pub fn validate(&self) -> Result<()> {
        if self.fence_language.trim().is_empty() {
            return Err(anyhow!("fence_language must be non-empty"));
        }
        if self.max_iterations == Some(0) {
            return Err(anyhow!("max_iterations must be > 0 when set"));
        }
        if self.model.api_base.trim().is_empty() {
            return Err(anyhow!("model.api_base must be non-empty"));
        }
        if self.model.model.trim().is_empty() {
            return Err(anyhow!("model.model must be non-empty"));
        }
        if self.model.max_tokens == 0 {
            return Err(anyhow!("model.max_tokens must be > 0"));
        }
        if self.model.timeout_secs == 0 {
            return Err(anyhow!("model.timeout_secs must be > 0"));
        }
        for (name, policy) in [
            ("refusal", &self.retry.refusal),
            ("extraction", &self.retry.extraction),
            ("repair", &self.retry.repair),
        ] {
            if policy.max_attempts == Some(0) {
                return Err(anyhow!("retry.{name}.max_attempts must be > 0 when set"));
            }
        }
        for (name, command) in [
            ("compiler", &self.toolchain.compiler),
            ("vectorizer", &self.toolchain.vectorizer),
            ("rasterizer", &self.toolchain.rasterizer),
        ] {
            if command.is_empty() || command[0].trim().is_empty() {
                return Err(anyhow!("toolchain.{name} must be a non-empty array"));
            }
        }
        if self.toolchain.intermediate_extension.trim().is_empty() {
            return Err(anyhow!("toolchain.intermediate_extension must be non-empty"));
        }
        if self.toolchain.timeout_secs == 0 {
            return Err(anyhow!("toolchain.timeout_secs must be > 0"));
        }
        if self.toolchain.output_limit_bytes == 0 {
            return Err(anyhow!("toolchain.output_limit_bytes must be > 0"));
        }
        if let Some(command) = &self.editor.command
            && command.trim().is_empty()
        {
            return Err(anyhow!("editor.command must be non-empty when set"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `TikzConfig::default()`.
pub fn load_config(path: &Path) -> Result<TikzConfig> {
    if !path.exists() {
        let cfg = TikzConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: TikzConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}
