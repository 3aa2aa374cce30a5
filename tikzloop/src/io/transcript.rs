//! User-facing transcript printed on stdout.
//!
//! Each artifact the session shows the user is framed by a banner line above
//! and below. This is product output, independent of `RUST_LOG`.

use std::io::Write;

use anyhow::{Context, Result};

/// Banner labels for the artifacts a session prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Instruction,
    Latex,
    Critique,
}

impl Artifact {
    pub fn label(self) -> &'static str {
        match self {
            Self::Instruction => "INSTRUCTION",
            Self::Latex => "LaTeX",
            Self::Critique => "CRITIQUE",
        }
    }
}

pub struct Transcript<W> {
    out: W,
}

impl<W: Write> Transcript<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Print `body` between two `----LABEL----` banners.
    pub fn show(&mut self, artifact: Artifact, body: &str) -> Result<()> {
        let banner = format!("----{}----", artifact.label());
        writeln!(self.out, "{banner}\n{body}\n{banner}").context("write transcript")?;
        self.out.flush().context("flush transcript")
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
