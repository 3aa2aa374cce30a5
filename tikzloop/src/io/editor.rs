//! Interactive editor gate.
//!
//! Model output that steers the session (the instruction and every critique) is
//! handed to the user's editor before it is used. Saving an empty file is the
//! user's way of stopping the session.

use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument, warn};

use crate::io::non_empty_env;

const FALLBACK_EDITOR: &str = "vim";

/// Result of passing text through the editor gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// The user kept non-empty text; continue with it.
    Approved(String),
    /// The user saved an empty file.
    Aborted,
}

/// Abstraction over interactive editing.
pub trait Editor {
    /// Write `initial` to `path`, let the user edit it, and return the saved contents.
    fn edit(&self, path: &Path, initial: &str) -> Result<String>;
}

/// Editor that launches an external program and blocks until it exits.
#[derive(Debug, Clone)]
pub struct ExternalEditor {
    program: String,
    args: Vec<String>,
}

impl ExternalEditor {
    /// Parse an editor command line such as `"code --wait"`.
    pub fn from_command_line(command: &str) -> Result<Self> {
        let mut words = shell_words::split(command)
            .with_context(|| format!("parse editor command `{command}`"))?;
        if words.is_empty() {
            bail!("editor command is empty");
        }
        let program = words.remove(0);
        Ok(Self {
            program,
            args: words,
        })
    }

    /// Resolve the editor: explicit override, then `$VISUAL`, then `$EDITOR`, then `vim`.
    pub fn resolve(configured: Option<&str>) -> Result<Self> {
        let command = configured
            .map(str::to_string)
            .or_else(|| non_empty_env("VISUAL"))
            .or_else(|| non_empty_env("EDITOR"))
            .unwrap_or_else(|| FALLBACK_EDITOR.to_string());
        Self::from_command_line(&command)
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Editor for ExternalEditor {
    #[instrument(skip_all, fields(editor = %self.program, path = %path.display()))]
    fn edit(&self, path: &Path, initial: &str) -> Result<String> {
        write_initial(path, initial)?;

        debug!("launching editor");
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .status()
            .with_context(|| format!("launch editor `{}`", self.program))?;
        if !status.success() {
            warn!(status = ?status.code(), "editor exited unsuccessfully, reading the file anyway");
        }

        fs::read_to_string(path).with_context(|| format!("read edited {}", path.display()))
    }
}

/// Run `initial` through the editor and classify the result.
pub fn edit_gate<E: Editor>(editor: &E, path: &Path, initial: &str) -> Result<GateDecision> {
    let edited = editor.edit(path, initial)?;
    if edited.is_empty() {
        info!(path = %path.display(), "edited file is empty, stopping");
        return Ok(GateDecision::Aborted);
    }
    Ok(GateDecision::Approved(edited))
}

fn write_initial(path: &Path, initial: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, initial).with_context(|| format!("write {}", path.display()))
}
