//! Per-run journal under `<run_log_dir>/<run-id>/`.
//!
//! - `steps.jsonl`: one [`StepOutcome`] per executed action, appended as the
//!   run progresses.
//! - `state.json`: the final State Store snapshot.
//! - `meta.json`: how the run ended.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::debug;

use crate::core::state::StateStore;
use crate::run::StepOutcome;

/// How a journaled run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunEnd {
    GoalReached { goal_action: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub run_id: String,
    pub started_at: String,
    pub ended_at: String,
    pub duration_ms: u64,
    pub steps: u32,
    #[serde(flatten)]
    pub end: RunEnd,
    pub report_path: Option<String>,
}

#[derive(Debug)]
pub struct RunLog {
    run_id: String,
    dir: PathBuf,
    started_at: DateTime<Utc>,
    steps: u32,
}

impl RunLog {
    /// Open a fresh journal directory named after the current UTC time.
    pub fn create(root: &Path) -> Result<Self> {
        let started_at = Utc::now();
        let base = started_at.format("%Y%m%d-%H%M%S-%3f").to_string();
        fs::create_dir_all(root).with_context(|| format!("create {}", root.display()))?;

        let mut suffix = 0u32;
        loop {
            let run_id = if suffix == 0 {
                base.clone()
            } else {
                format!("{base}-{suffix}")
            };
            let dir = root.join(&run_id);
            match fs::create_dir(&dir) {
                Ok(()) => {
                    debug!(%run_id, dir = %dir.display(), "run journal opened");
                    return Ok(Self {
                        run_id,
                        dir,
                        started_at,
                        steps: 0,
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
                Err(err) => {
                    return Err(err).with_context(|| format!("create {}", dir.display()));
                }
            }
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn steps_path(&self) -> PathBuf {
        self.dir.join("steps.jsonl")
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join("state.json")
    }

    pub fn meta_path(&self) -> PathBuf {
        self.dir.join("meta.json")
    }

    pub fn record_step(&mut self, outcome: &StepOutcome) -> Result<()> {
        let path = self.steps_path();
        let mut line = serde_json::to_string(outcome).context("serialize step outcome")?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open {}", path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append {}", path.display()))?;
        self.steps += 1;
        Ok(())
    }

    /// Write the state snapshot and the run summary.
    pub fn finish(
        &self,
        state: &StateStore,
        end: RunEnd,
        report_path: Option<&Path>,
    ) -> Result<RunMeta> {
        write_json(&self.state_path(), state)?;

        let ended_at = Utc::now();
        let meta = RunMeta {
            run_id: self.run_id.clone(),
            started_at: self.started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            ended_at: ended_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            duration_ms: (ended_at - self.started_at).num_milliseconds().max(0) as u64,
            steps: self.steps,
            end,
            report_path: report_path.map(|p| p.display().to_string()),
        };
        write_json(&self.meta_path(), &meta)?;
        Ok(meta)
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}
