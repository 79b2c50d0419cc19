//! Scripted stand-in for the external tool, used by tests and local development.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::invocation::{Purpose, ToolInvocation};
use super::runner::{InvocationError, ToolOutput, ToolRunner};

/// Runner that answers from canned data instead of spawning a process
///
/// Media invocations write `media_bytes` to the output template with
/// `%(id)s` and `%(ext)s` expanded, the way the real tool would.
#[derive(Debug)]
pub struct ScriptedRunner {
    metadata: serde_json::Value,
    media_ext: String,
    media_bytes: Vec<u8>,
    failing: HashSet<(Purpose, String)>,
    failing_purposes: HashSet<Purpose>,
    stalls: HashMap<String, Duration>,
    delay: Duration,
    write_output: bool,
    tool_missing: bool,
    invocations: Mutex<Vec<ToolInvocation>>,
}

impl ScriptedRunner {
    pub fn new(metadata: serde_json::Value) -> Self {
        Self {
            metadata,
            media_ext: "mp4".to_string(),
            media_bytes: b"\x00\x00\x00\x18ftypmp42scripted-media".to_vec(),
            failing: HashSet::new(),
            failing_purposes: HashSet::new(),
            stalls: HashMap::new(),
            delay: Duration::ZERO,
            write_output: true,
            tool_missing: false,
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Reject invocations from one client identity
    pub fn fail_client(mut self, purpose: Purpose, label: &str) -> Self {
        self.failing.insert((purpose, label.to_string()));
        self
    }

    /// Reject every invocation for a purpose
    pub fn fail_all(mut self, purpose: Purpose) -> Self {
        self.failing_purposes.insert(purpose);
        self
    }

    /// Make one client identity hang for `duration`
    pub fn stall_client(mut self, label: &str, duration: Duration) -> Self {
        self.stalls.insert(label.to_string(), duration);
        self
    }

    /// Delay every invocation
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_media(mut self, ext: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.media_ext = ext.to_string();
        self.media_bytes = bytes.into();
        self
    }

    /// Report success for media invocations without producing a file
    pub fn without_output(mut self) -> Self {
        self.write_output = false;
        self
    }

    /// Behave as if the binary were not installed
    pub fn missing_tool(mut self) -> Self {
        self.tool_missing = true;
        self
    }

    /// Invocations seen so far, as (purpose, client label)
    pub fn calls(&self) -> Vec<(Purpose, String)> {
        self.invocations()
            .into_iter()
            .map(|invocation| (invocation.purpose, invocation.client.label))
            .collect()
    }

    /// Full invocations seen so far, oldest first
    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn video_id(&self) -> String {
        self.metadata
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string()
    }

    fn rejection(label: &str) -> ToolOutput {
        ToolOutput {
            success: false,
            exit_code: Some(1),
            stdout: Vec::new(),
            stderr: format!(
                "ERROR: [youtube] client {label} rejected: Sign in to confirm you're not a bot"
            ),
        }
    }
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, InvocationError> {
        let label = invocation.client.label.clone();
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invocation.clone());

        if self.tool_missing {
            return Err(InvocationError::ToolMissing("yt-dlp".into()));
        }

        let wait = self.delay + self.stalls.get(&label).copied().unwrap_or_default();
        if wait > invocation.timeout {
            tokio::time::sleep(invocation.timeout).await;
            return Err(InvocationError::Timeout(invocation.timeout));
        }
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        let rejected = self.failing_purposes.contains(&invocation.purpose)
            || self.failing.contains(&(invocation.purpose, label.clone()));
        if rejected {
            return Ok(Self::rejection(&label));
        }

        match invocation.purpose {
            Purpose::Metadata => Ok(ToolOutput {
                success: true,
                exit_code: Some(0),
                stdout: serde_json::to_vec(&self.metadata).unwrap_or_default(),
                stderr: String::new(),
            }),
            Purpose::Media => {
                if self.write_output {
                    if let Some(template) = &invocation.output_template {
                        let target = template
                            .display()
                            .to_string()
                            .replace("%(id)s", &self.video_id())
                            .replace("%(ext)s", &self.media_ext);
                        tokio::fs::write(&target, &self.media_bytes).await?;
                    }
                }
                Ok(ToolOutput {
                    success: true,
                    exit_code: Some(0),
                    ..ToolOutput::default()
                })
            }
        }
    }

    async fn version(&self) -> Result<String, InvocationError> {
        if self.tool_missing {
            return Err(InvocationError::ToolMissing("yt-dlp".into()));
        }
        Ok("scripted".to_string())
    }
}
