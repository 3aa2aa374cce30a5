//! Checkpoint store for the session's working directory.
//!
//! Every artifact is a flat file keyed by iteration index:
//!
//! ```text
//! <dir>/instruction
//! <dir>/figure-<n>.tex        source (rewritten on each compile attempt)
//! <dir>/figure-<n>.log        compiler log (only meaningful after a failed compile)
//! <dir>/figure-<n>.<ext>      compiler intermediate output (dvi by default)
//! <dir>/figure-<n>.svg        vector render
//! <dir>/figure-<n>.png        raster render
//! <dir>/figure-<n>.critique   approved critique
//! ```
//!
//! Files are never deleted by the store. A later run resumes by loading the
//! record of the iteration it continues from.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::debug;

/// Resolved paths for one iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationPaths {
    pub index: u32,
    pub stem: String,
    pub source_path: PathBuf,
    pub log_path: PathBuf,
    pub intermediate_path: PathBuf,
    pub vector_path: PathBuf,
    pub raster_path: PathBuf,
    pub critique_path: PathBuf,
}

impl IterationPaths {
    pub fn new(dir: &Path, index: u32, intermediate_extension: &str) -> Self {
        let stem = format!("figure-{index}");
        Self {
            index,
            source_path: dir.join(format!("{stem}.tex")),
            log_path: dir.join(format!("{stem}.log")),
            intermediate_path: dir.join(format!("{stem}.{intermediate_extension}")),
            vector_path: dir.join(format!("{stem}.svg")),
            raster_path: dir.join(format!("{stem}.png")),
            critique_path: dir.join(format!("{stem}.critique")),
            stem,
        }
    }
}

/// Everything persisted for one iteration. Fields fill in as the iteration progresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationRecord {
    pub index: u32,
    pub source: Option<String>,
    pub raster_path: Option<PathBuf>,
    pub critique: Option<String>,
}

/// State needed to continue a session after iteration `from.index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePoint {
    pub instruction: String,
    pub from: IterationPaths,
    pub source: String,
    pub critique: String,
}

/// Keyed store (iteration index → record) over a checkpoint directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    intermediate_extension: String,
}

impl CheckpointStore {
    /// Open (creating if needed) the checkpoint directory.
    pub fn open(dir: impl Into<PathBuf>, intermediate_extension: &str) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("create checkpoint dir {}", dir.display()))?;
        Ok(Self {
            dir,
            intermediate_extension: intermediate_extension.to_string(),
        })
    }

    pub fn instruction_path(&self) -> PathBuf {
        self.dir.join("instruction")
    }

    pub fn paths(&self, index: u32) -> IterationPaths {
        IterationPaths::new(&self.dir, index, &self.intermediate_extension)
    }

    pub fn load_instruction(&self) -> Result<String> {
        read_required(&self.instruction_path(), "instruction")
    }

    /// Persist the current source for `index`, replacing any earlier attempt.
    pub fn save_source(&self, index: u32, source: &str) -> Result<PathBuf> {
        let path = self.paths(index).source_path;
        debug!(index, path = %path.display(), "saving source");
        write_atomic(&path, source)?;
        Ok(path)
    }

    pub fn save_log(&self, index: u32, log: &str) -> Result<PathBuf> {
        let path = self.paths(index).log_path;
        fs::write(&path, log).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    /// Remove the compiler log for `index` so a later read only sees a fresh one.
    pub fn clear_log(&self, index: u32) -> Result<()> {
        let path = self.paths(index).log_path;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("remove stale log {}", path.display())),
        }
    }

    /// Compiler log for `index`, if one was left on disk.
    pub fn load_log(&self, index: u32) -> Result<Option<String>> {
        read_optional(&self.paths(index).log_path)
    }

    /// Load whatever exists for `index`.
    pub fn load_record(&self, index: u32) -> Result<IterationRecord> {
        let paths = self.paths(index);
        Ok(IterationRecord {
            index,
            source: read_optional(&paths.source_path)?,
            raster_path: paths.raster_path.is_file().then(|| paths.raster_path.clone()),
            critique: read_optional(&paths.critique_path)?,
        })
    }

    /// Load the state a session needs to continue after iteration `from`.
    ///
    /// Requires a non-empty instruction, the iteration's source, a non-empty
    /// critique, and the raster the critique was written against.
    pub fn load_resume(&self, from: u32) -> Result<ResumePoint> {
        let instruction = self.load_instruction()?;
        if instruction.is_empty() {
            return Err(anyhow!(
                "instruction {} is empty; nothing to resume",
                self.instruction_path().display()
            ));
        }
        let record = self.load_record(from)?;
        let paths = self.paths(from);
        let source = record.source.ok_or_else(|| {
            anyhow!(
                "missing {} (cannot resume after iteration {from})",
                paths.source_path.display()
            )
        })?;
        let critique = record.critique.ok_or_else(|| {
            anyhow!(
                "missing {} (cannot resume after iteration {from})",
                paths.critique_path.display()
            )
        })?;
        if critique.is_empty() {
            return Err(anyhow!(
                "{} is empty; write the feedback to apply before resuming",
                paths.critique_path.display()
            ));
        }
        if record.raster_path.is_none() {
            return Err(anyhow!(
                "missing {} (cannot resume after iteration {from})",
                paths.raster_path.display()
            ));
        }
        debug!(from, "loaded resume point");
        Ok(ResumePoint {
            instruction,
            from: paths,
            source,
            critique,
        })
    }
}

fn read_required(path: &Path, what: &str) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {what} {}", path.display()))
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(Some(contents))
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp_path = path.with_extension("tex.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp source {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace source {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, CheckpointStore) {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = CheckpointStore::open(temp.path().join("tmp"), "dvi").expect("open");
        (temp, store)
    }

    #[test]
    fn iteration_paths_are_stable() {
        let paths = IterationPaths::new(Path::new("tmp"), 3, "dvi");

        assert_eq!(paths.stem, "figure-3");
        assert!(paths.source_path.ends_with("tmp/figure-3.tex"));
        assert!(paths.log_path.ends_with("figure-3.log"));
        assert!(paths.intermediate_path.ends_with("figure-3.dvi"));
        assert!(paths.vector_path.ends_with("figure-3.svg"));
        assert!(paths.raster_path.ends_with("figure-3.png"));
        assert!(paths.critique_path.ends_with("figure-3.critique"));
    }

    #[test]
    fn save_source_overwrites_previous_attempt() {
        let (_temp, store) = store();
        store.save_source(0, "first").expect("save");
        let path = store.save_source(0, "second").expect("save");

        assert_eq!(fs::read_to_string(path).expect("read"), "second");
        assert!(!store.paths(0).source_path.with_extension("tex.tmp").exists());
    }

    #[test]
    fn clear_log_removes_only_existing_logs() {
        let (_temp, store) = store();
        store.clear_log(0).expect("clear missing");

        store.save_log(0, "! old").expect("log");
        store.clear_log(0).expect("clear");
        assert_eq!(store.load_log(0).expect("load"), None);
    }

    #[test]
    fn record_fills_progressively() {
        let (_temp, store) = store();
        let empty = store.load_record(1).expect("record");
        assert_eq!(empty.source, None);
        assert_eq!(empty.raster_path, None);

        store.save_source(1, "code").expect("save");
        store.save_log(1, "! error").expect("log");
        fs::write(store.paths(1).raster_path, b"png").expect("raster");
        fs::write(store.paths(1).critique_path, "- fix").expect("critique");

        let record = store.load_record(1).expect("record");
        assert_eq!(record.source.as_deref(), Some("code"));
        assert_eq!(record.raster_path, Some(store.paths(1).raster_path));
        assert_eq!(record.critique.as_deref(), Some("- fix"));
    }

    #[test]
    fn resume_loads_instruction_source_and_critique() {
        let (_temp, store) = store();
        fs::write(store.instruction_path(), "brief").expect("instruction");
        store.save_source(2, "code-2").expect("save");
        fs::write(store.paths(2).raster_path, b"png").expect("raster");
        fs::write(store.paths(2).critique_path, "- tweak").expect("critique");

        let resume = store.load_resume(2).expect("resume");
        assert_eq!(resume.instruction, "brief");
        assert_eq!(resume.source, "code-2");
        assert_eq!(resume.critique, "- tweak");
        assert_eq!(resume.from.index, 2);
    }

    #[test]
    fn resume_requires_raster() {
        let (_temp, store) = store();
        fs::write(store.instruction_path(), "brief").expect("instruction");
        store.save_source(0, "code").expect("save");
        fs::write(store.paths(0).critique_path, "- tweak").expect("critique");

        let err = store.load_resume(0).unwrap_err();
        assert!(err.to_string().contains("figure-0.png"));
    }

    #[test]
    fn resume_rejects_empty_critique() {
        let (_temp, store) = store();
        fs::write(store.instruction_path(), "brief").expect("instruction");
        store.save_source(0, "code").expect("save");
        fs::write(store.paths(0).raster_path, b"png").expect("raster");
        fs::write(store.paths(0).critique_path, "").expect("critique");

        let err = store.load_resume(0).unwrap_err();
        assert!(err.to_string().contains("is empty"));
    }

    #[test]
    fn resume_without_instruction_fails() {
        let (_temp, store) = store();
        let err = store.load_resume(0).unwrap_err();
        assert!(format!("{err:#}").contains("instruction"));
    }
}
