//! External LaTeX toolchain: compile, then render to SVG and PNG.
//!
//! The [`Toolchain`] trait decouples the session from the installed binaries.
//! Tests use scripted toolchains that write placeholder artifacts.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::io::checkpoint::IterationPaths;
use crate::io::config::ToolchainConfig;
use crate::io::process::{ToolOutput, run_tool};

/// Result of one compiler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutcome {
    pub succeeded: bool,
    pub exit_code: Option<i32>,
    /// Captured compiler stdout/stderr, used when the compiler leaves no log file.
    pub output: String,
}

/// Abstraction over the compiler and the two render conversions.
pub trait Toolchain {
    /// Compile `paths.source_path` into `paths.intermediate_path`, writing `paths.log_path`.
    fn compile(&self, paths: &IterationPaths) -> Result<CompileOutcome>;
    /// Convert the compiler's intermediate output to `paths.vector_path`.
    fn vectorize(&self, paths: &IterationPaths) -> Result<()>;
    /// Convert `paths.vector_path` to `paths.raster_path`.
    fn rasterize(&self, paths: &IterationPaths) -> Result<()>;
}

/// Toolchain that shells out to `dvilualatex`, `dvisvgm` and `convert` (or configured equivalents).
#[derive(Debug, Clone)]
pub struct LatexToolchain {
    config: ToolchainConfig,
}

impl LatexToolchain {
    pub fn new(config: ToolchainConfig) -> Self {
        Self { config }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    fn command(&self, argv: &[String]) -> Result<Command> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("toolchain command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args);
        Ok(cmd)
    }

    fn run_required(&self, label: &str, cmd: Command) -> Result<()> {
        let output = run_tool(label, cmd, self.timeout(), self.config.output_limit_bytes)?;
        ensure_succeeded(label, &output)
    }
}

impl Toolchain for LatexToolchain {
    #[instrument(skip_all, fields(figure = %paths.stem))]
    fn compile(&self, paths: &IterationPaths) -> Result<CompileOutcome> {
        let out_dir = output_dir(&paths.source_path)?;
        let mut cmd = self.command(&self.config.compiler)?;
        cmd.arg(format!("--output-directory={}", out_dir.display()))
            .arg("--interaction=nonstopmode")
            .arg("--halt-on-error")
            .arg(&paths.source_path);

        let output = run_tool(
            "compiler",
            cmd,
            self.timeout(),
            self.config.output_limit_bytes,
        )?;
        if output.timed_out {
            warn!(timeout_secs = self.config.timeout_secs, "compiler timed out");
        }
        Ok(CompileOutcome {
            succeeded: output.succeeded(),
            exit_code: output.status.code(),
            output: output.transcript("compiler"),
        })
    }

    #[instrument(skip_all, fields(figure = %paths.stem))]
    fn vectorize(&self, paths: &IterationPaths) -> Result<()> {
        let mut cmd = self.command(&self.config.vectorizer)?;
        cmd.arg(format!("--output={}", paths.vector_path.display()))
            .arg(&paths.intermediate_path);
        self.run_required("vectorizer", cmd)
    }

    #[instrument(skip_all, fields(figure = %paths.stem))]
    fn rasterize(&self, paths: &IterationPaths) -> Result<()> {
        let mut cmd = self.command(&self.config.rasterizer)?;
        cmd.arg(&paths.vector_path).arg(&paths.raster_path);
        self.run_required("rasterizer", cmd)
    }
}

/// Render a compiled iteration: intermediate → SVG → PNG. Any failure is fatal.
pub fn render_figure<T: Toolchain>(toolchain: &T, paths: &IterationPaths) -> Result<PathBuf> {
    toolchain.vectorize(paths)?;
    if !paths.vector_path.is_file() {
        return Err(anyhow!(
            "vectorizer produced no output at {}",
            paths.vector_path.display()
        ));
    }
    toolchain.rasterize(paths)?;
    if !paths.raster_path.is_file() {
        return Err(anyhow!(
            "rasterizer produced no output at {}",
            paths.raster_path.display()
        ));
    }
    debug!(raster = %paths.raster_path.display(), "figure rendered");
    Ok(paths.raster_path.clone())
}

fn ensure_succeeded(label: &str, output: &ToolOutput) -> Result<()> {
    if output.timed_out {
        return Err(anyhow!("{label} timed out\n{}", output.transcript(label)));
    }
    if !output.status.success() {
        return Err(anyhow!(
            "{label} failed with status {:?}\n{}",
            output.status.code(),
            output.transcript(label)
        ));
    }
    Ok(())
}

fn output_dir(source_path: &Path) -> Result<&Path> {
    source_path
        .parent()
        .ok_or_else(|| anyhow!("source path has no parent {}", source_path.display()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string(), "tool".to_string()]
    }

    fn config(compiler: Vec<String>, vectorizer: Vec<String>, rasterizer: Vec<String>) -> ToolchainConfig {
        ToolchainConfig {
            compiler,
            vectorizer,
            rasterizer,
            timeout_secs: 10,
            ..ToolchainConfig::default()
        }
    }

    #[test]
    fn compile_passes_output_dir_and_flags() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = IterationPaths::new(temp.path(), 0, "dvi");
        fs::write(&paths.source_path, "x").expect("source");
        let args_path = temp.path().join("args");
        let script = format!("printf '%s\\n' \"$@\" > '{}'", args_path.display());
        let toolchain = LatexToolchain::new(config(sh(&script), sh("true"), sh("true")));

        let outcome = toolchain.compile(&paths).expect("compile");
        assert!(outcome.succeeded);

        let args = fs::read_to_string(&args_path).expect("args");
        let lines: Vec<&str> = args.lines().collect();
        assert_eq!(
            lines,
            vec![
                format!("--output-directory={}", temp.path().display()).as_str(),
                "--interaction=nonstopmode",
                "--halt-on-error",
                paths.source_path.to_str().expect("utf8"),
            ]
        );
    }

    #[test]
    fn compile_failure_is_an_outcome_not_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = IterationPaths::new(temp.path(), 1, "dvi");
        let toolchain = LatexToolchain::new(config(
            sh("echo '! Undefined control sequence.'; exit 1"),
            sh("true"),
            sh("true"),
        ));

        let outcome = toolchain.compile(&paths).expect("compile");
        assert!(!outcome.succeeded);
        assert_eq!(outcome.exit_code, Some(1));
        assert!(outcome.output.contains("Undefined control sequence"));
    }

    #[test]
    fn render_runs_both_conversions() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = IterationPaths::new(temp.path(), 0, "dvi");
        let toolchain = LatexToolchain::new(config(
            sh("true"),
            sh("for a in \"$@\"; do case \"$a\" in --output=*) touch \"${a#--output=}\";; esac; done"),
            sh("touch \"$2\""),
        ));

        let raster = render_figure(&toolchain, &paths).expect("render");
        assert_eq!(raster, paths.raster_path);
        assert!(paths.vector_path.is_file());
        assert!(paths.raster_path.is_file());
    }

    #[test]
    fn render_failure_is_fatal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = IterationPaths::new(temp.path(), 0, "dvi");
        let toolchain = LatexToolchain::new(config(sh("true"), sh("exit 2"), sh("true")));

        let err = render_figure(&toolchain, &paths).unwrap_err();
        assert!(err.to_string().contains("vectorizer failed"));
        assert!(!paths.raster_path.exists());
    }
}
