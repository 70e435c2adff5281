//! Transformer backed by an external model CLI.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::feedback::Transformer;
use crate::io::config::CommandConfig;
use crate::io::process::run_command_with_timeout;

/// Runs a command per request: the request goes to stdin, trimmed stdout is
/// the response.
#[derive(Debug, Clone)]
pub struct CommandTransformer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandTransformer {
    pub fn new(argv: &[String], timeout: Duration, output_limit_bytes: usize) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("command must be a non-empty array"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
            output_limit_bytes,
        })
    }

    pub fn from_config(cfg: &CommandConfig) -> Result<Self> {
        Self::new(&cfg.command, cfg.timeout(), cfg.output_limit_bytes)
    }
}

impl Transformer for CommandTransformer {
    type Output = String;

    #[instrument(skip_all, fields(program = %self.program, timeout_secs = self.timeout.as_secs()))]
    fn transform(&self, request: &str) -> Result<String> {
        info!(request_bytes = request.len(), "invoking model command");
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        let output = run_command_with_timeout(
            cmd,
            Some(request.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .with_context(|| format!("run {}", self.program))?;

        if output.timed_out {
            warn!("model command timed out");
            return Err(anyhow!(
                "{} timed out after {:?}",
                self.program,
                self.timeout
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "model command failed");
            return Err(anyhow!(
                "{} failed with status {:?}: {}",
                self.program,
                output.status.code(),
                output.stderr_tail(400)
            ));
        }

        let response = output.stdout_text().trim().to_string();
        if response.is_empty() {
            return Err(anyhow!("{} returned an empty response", self.program));
        }
        debug!(response_bytes = response.len(), "model command completed");
        Ok(response)
    }
}
