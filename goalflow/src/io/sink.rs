//! Where finished outputs are written.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::info;

use crate::io::config::write_atomic;

/// Destination for a run's rendered output.
pub trait PersistenceSink {
    /// Store `content` under `name` and return where it went.
    fn persist(&self, name: &str, content: &str) -> Result<PathBuf>;
}

/// Writes documents into a directory, creating it on demand.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl PersistenceSink for FileSink {
    fn persist(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.dir.join(name);
        write_atomic(&path, content)?;
        info!(path = %path.display(), bytes = content.len(), "output persisted");
        Ok(path)
    }
}
