//! Flow configuration stored at `.goalflow/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Default config location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".goalflow/config.toml";

/// Flow configuration (TOML).
///
/// Meant to be edited by hand. Missing fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FlowConfig {
    /// Attempts per acceptance-retry loop, including the first.
    pub max_attempts: u32,

    /// Executed actions allowed per run, reruns included.
    pub max_steps: u32,

    /// Word limit handed to the plan prompt.
    pub max_word_count: u32,

    /// Directory that receives finished reports.
    pub report_dir: PathBuf,

    /// Directory that receives per-run journals.
    pub run_log_dir: PathBuf,

    /// Model command that drafts responses.
    pub generator: CommandConfig,

    /// Model command that judges and rewrites.
    pub critic: CommandConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommandConfig {
    /// argv; the request is written to stdin.
    pub command: Vec<String>,

    pub timeout_secs: u64,

    /// Captured stdout/stderr beyond this many bytes is dropped.
    pub output_limit_bytes: usize,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            command: ["codex", "exec", "--skip-git-repo-check", "-"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            timeout_secs: 600,
            output_limit_bytes: 200_000,
        }
    }
}

impl CommandConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self, label: &str) -> Result<()> {
        if self.command.is_empty() || self.command[0].trim().is_empty() {
            return Err(anyhow!("{label}.command must be a non-empty array"));
        }
        if self.timeout_secs == 0 {
            return Err(anyhow!("{label}.timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("{label}.output_limit_bytes must be > 0"));
        }
        Ok(())
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_steps: 32,
            max_word_count: 300,
            report_dir: PathBuf::from("reports"),
            run_log_dir: PathBuf::from(".goalflow/runs"),
            generator: CommandConfig::default(),
            critic: CommandConfig::default(),
        }
    }
}

impl FlowConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be > 0"));
        }
        if self.max_steps == 0 {
            return Err(anyhow!("max_steps must be > 0"));
        }
        if self.max_word_count == 0 {
            return Err(anyhow!("max_word_count must be > 0"));
        }
        self.generator.validate("generator")?;
        self.critic.validate("critic")?;
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `FlowConfig::default()`.
pub fn load_config(path: &Path) -> Result<FlowConfig> {
    if !path.exists() {
        let cfg = FlowConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: FlowConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &FlowConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Write `contents` next to `path` and rename it into place, creating the
/// parent directory when needed.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path has no file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents).with_context(|| format!("write temp {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
