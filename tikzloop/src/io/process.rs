//! Running external tools (compiler, vectorizer, rasterizer) with a timeout and bounded output.

use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured result of one tool invocation.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl ToolOutput {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    /// Render stdout and stderr as one log text, noting truncation and timeouts.
    pub fn transcript(&self, label: &str) -> String {
        let mut buf = String::new();
        buf.push_str("=== stdout ===\n");
        buf.push_str(&String::from_utf8_lossy(&self.stdout));
        if self.stdout_truncated > 0 {
            buf.push_str(&format!(
                "\n[{label} stdout truncated {} bytes]\n",
                self.stdout_truncated
            ));
        }
        buf.push_str("\n=== stderr ===\n");
        buf.push_str(&String::from_utf8_lossy(&self.stderr));
        if self.stderr_truncated > 0 {
            buf.push_str(&format!(
                "\n[{label} stderr truncated {} bytes]\n",
                self.stderr_truncated
            ));
        }
        if self.timed_out {
            buf.push_str(&format!("\n[{label} timed out]\n"));
        }
        buf
    }
}

/// Run a tool to completion (or until `timeout`), capturing stdout/stderr without pipe deadlocks.
///
/// Stdin is closed: every tool is run non-interactively. Output beyond
/// `output_limit_bytes` per stream is drained and discarded.
#[instrument(skip_all, fields(tool = label, timeout_secs = timeout.as_secs()))]
pub fn run_tool(
    label: &str,
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<ToolOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!(command = ?cmd, "spawning tool");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn tool");
            return Err(e).with_context(|| format!("spawn {label}"));
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("{label} stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("{label} stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child
        .wait_timeout(timeout)
        .with_context(|| format!("wait for {label}"))?
    {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "tool timed out, killing");
            timed_out = true;
            child.kill().with_context(|| format!("kill {label}"))?;
            child
                .wait()
                .with_context(|| format!("wait for {label} after kill"))?
        }
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "tool finished");
    Ok(ToolOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
