//! Test doubles and fixtures for session tests.
//!
//! Scripted collaborators replay queued behavior and record what they were
//! asked to do, so tests can assert on exact requests without network access,
//! an interactive editor or a LaTeX installation.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

use crate::core::retry::RetryPolicy;
use crate::core::types::Message;
use crate::io::checkpoint::IterationPaths;
use crate::io::config::TikzConfig;
use crate::io::editor::Editor;
use crate::io::model::{Completer, ModelClient};
use crate::io::toolchain::{CompileOutcome, Toolchain};

/// Bytes written as the source sketch.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nsketch";

/// Bytes a scripted toolchain writes as the render of `stem` (e.g. `figure-0`).
pub fn render_bytes(stem: &str) -> Vec<u8> {
    format!("\u{89}PNG render {stem}").into_bytes()
}

/// Wrap `code` in a reply containing one `latex` fenced block.
pub fn fenced(code: &str) -> String {
    format!("Here is the figure.\n```latex{code}```\nLet me know.")
}

/// Write a fake sketch image and return its path.
pub fn write_sketch(dir: &Path) -> Result<PathBuf> {
    let path = dir.join("sketch.png");
    fs::write(&path, PNG_BYTES)?;
    Ok(path)
}

/// Default config with every retry loop bounded so a broken script fails fast.
pub fn bounded_config() -> TikzConfig {
    let mut config = TikzConfig::default();
    config.retry.refusal = RetryPolicy::bounded(5);
    config.retry.extraction = RetryPolicy::bounded(5);
    config.retry.repair = RetryPolicy::bounded(5);
    config.max_iterations = Some(10);
    config
}

/// Model client over a scripted completer, using `config`'s refusal settings.
pub fn scripted_client<I, S>(config: &TikzConfig, replies: I) -> ModelClient<ScriptedCompleter>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ModelClient::new(
        ScriptedCompleter::new(replies),
        config.model.refusal_markers.clone(),
        config.retry.refusal,
    )
}

/// Completer returning queued replies and capturing every request.
pub struct ScriptedCompleter {
    replies: RefCell<VecDeque<String>>,
    requests: RefCell<Vec<Vec<Message>>>,
}

impl ScriptedCompleter {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: RefCell::new(replies.into_iter().map(Into::into).collect()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.borrow().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn remaining(&self) -> usize {
        self.replies.borrow().len()
    }
}

impl Completer for ScriptedCompleter {
    fn complete(&self, messages: &[Message]) -> Result<String> {
        self.requests.borrow_mut().push(messages.to_vec());
        self.replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted completer has no reply left"))
    }
}

/// What the scripted user does in the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditAction {
    /// Save the proposed text unchanged.
    Keep,
    /// Replace the text (an empty string aborts the session).
    Replace(String),
}

/// Editor replaying queued actions against the real file.
pub struct ScriptedEditor {
    actions: RefCell<VecDeque<EditAction>>,
    edited: RefCell<Vec<PathBuf>>,
}

impl ScriptedEditor {
    pub fn new(actions: impl IntoIterator<Item = EditAction>) -> Self {
        Self {
            actions: RefCell::new(actions.into_iter().collect()),
            edited: RefCell::new(Vec::new()),
        }
    }

    /// Paths opened so far, in order.
    pub fn edited(&self) -> Vec<PathBuf> {
        self.edited.borrow().clone()
    }
}

impl Editor for ScriptedEditor {
    fn edit(&self, path: &Path, initial: &str) -> Result<String> {
        self.edited.borrow_mut().push(path.to_path_buf());
        let action = self
            .actions
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted editor has no action for {}", path.display()))?;
        let text = match action {
            EditAction::Keep => initial.to_string(),
            EditAction::Replace(text) => text,
        };
        fs::write(path, &text)?;
        Ok(text)
    }
}

/// Scripted result of one compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileScript {
    Success,
    /// Fail, leaving `log` on disk when given and reporting `output` as captured output.
    Failure { log: Option<String>, output: String },
}

impl CompileScript {
    pub fn failure_with_log(log: &str) -> Self {
        Self::Failure {
            log: Some(log.to_string()),
            output: String::new(),
        }
    }
}

/// Toolchain that writes placeholder artifacts instead of running LaTeX.
///
/// Compiles beyond the queued script succeed.
pub struct ScriptedToolchain {
    compiles: RefCell<VecDeque<CompileScript>>,
    compiled_sources: RefCell<Vec<String>>,
    renders: Cell<u32>,
}

impl ScriptedToolchain {
    pub fn succeeding() -> Self {
        Self::new([])
    }

    pub fn new(compiles: impl IntoIterator<Item = CompileScript>) -> Self {
        Self {
            compiles: RefCell::new(compiles.into_iter().collect()),
            compiled_sources: RefCell::new(Vec::new()),
            renders: Cell::new(0),
        }
    }

    /// Contents of the source file at each compile, in order.
    pub fn compiled_sources(&self) -> Vec<String> {
        self.compiled_sources.borrow().clone()
    }

    pub fn compile_count(&self) -> usize {
        self.compiled_sources.borrow().len()
    }

    pub fn render_count(&self) -> u32 {
        self.renders.get()
    }
}

impl Toolchain for ScriptedToolchain {
    fn compile(&self, paths: &IterationPaths) -> Result<CompileOutcome> {
        let source = fs::read_to_string(&paths.source_path)?;
        self.compiled_sources.borrow_mut().push(source);
        let script = self
            .compiles
            .borrow_mut()
            .pop_front()
            .unwrap_or(CompileScript::Success);
        match script {
            CompileScript::Success => {
                fs::write(&paths.intermediate_path, b"dvi")?;
                Ok(CompileOutcome {
                    succeeded: true,
                    exit_code: Some(0),
                    output: String::new(),
                })
            }
            CompileScript::Failure { log, output } => {
                if let Some(log) = log {
                    fs::write(&paths.log_path, log)?;
                }
                Ok(CompileOutcome {
                    succeeded: false,
                    exit_code: Some(1),
                    output,
                })
            }
        }
    }

    fn vectorize(&self, paths: &IterationPaths) -> Result<()> {
        if !paths.intermediate_path.is_file() {
            return Err(anyhow!("missing {}", paths.intermediate_path.display()));
        }
        fs::write(&paths.vector_path, b"<svg/>")?;
        Ok(())
    }

    fn rasterize(&self, paths: &IterationPaths) -> Result<()> {
        fs::write(&paths.raster_path, render_bytes(&paths.stem))?;
        self.renders.set(self.renders.get() + 1);
        Ok(())
    }
}
