//! Process execution for the external tool.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use super::invocation::ToolInvocation;

const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("extraction tool not found: {0}")]
    ToolMissing(PathBuf),

    #[error("failed to start extraction tool: {0}")]
    Spawn(std::io::Error),

    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("I/O error while waiting for extraction tool: {0}")]
    Io(#[from] std::io::Error),
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl From<std::process::Output> for ToolOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Runs the external extraction tool
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Execute one invocation, bounded by `invocation.timeout`
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, InvocationError>;

    /// Report the tool version, failing if the tool cannot be started
    async fn version(&self) -> Result<String, InvocationError>;
}

/// Runner backed by a real `yt-dlp` binary
#[derive(Debug, Clone)]
pub struct SystemRunner {
    binary: PathBuf,
}

impl SystemRunner {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    async fn execute(
        &self,
        args: Vec<String>,
        timeout: Duration,
    ) -> Result<ToolOutput, InvocationError> {
        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the wait future on timeout or job abort must not leave the child behind
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => InvocationError::ToolMissing(self.binary.clone()),
                _ => InvocationError::Spawn(e),
            })?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => Ok(ToolOutput::from(output?)),
            Err(_) => Err(InvocationError::Timeout(timeout)),
        }
    }
}

#[async_trait]
impl ToolRunner for SystemRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, InvocationError> {
        let args = invocation.to_args();
        debug!(
            binary = %self.binary.display(),
            purpose = %invocation.purpose,
            client = %invocation.client.label,
            args = %args.join(" "),
            "Invoking extraction tool"
        );
        self.execute(args, invocation.timeout).await
    }

    async fn version(&self) -> Result<String, InvocationError> {
        let output = self
            .execute(vec!["--version".to_string()], VERSION_TIMEOUT)
            .await?;
        if !output.success {
            return Err(InvocationError::Spawn(std::io::Error::other(format!(
                "--version exited with {:?}: {}",
                output.exit_code,
                output.stderr.trim()
            ))));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
