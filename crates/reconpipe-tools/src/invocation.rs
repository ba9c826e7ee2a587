//! Tool invocation: launching through a `ProcessLauncher` and folding the
//! result into an adapter outcome

use crate::launcher::{ProcessLauncher, ProcessOutput};
use reconpipe_core::{Error, Finding, Result, StageStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Status of a single adapter run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Completed,
    Error,
    Timeout,
}

impl From<ToolStatus> for StageStatus {
    fn from(status: ToolStatus) -> Self {
        match status {
            ToolStatus::Completed => StageStatus::Completed,
            ToolStatus::Error => StageStatus::Error,
            ToolStatus::Timeout => StageStatus::Timeout,
        }
    }
}

/// Result of one launch as seen by an adapter
#[derive(Debug)]
pub enum Invocation {
    /// The process ran to exit, whatever its exit code
    Exited(ProcessOutput),
    /// The process could not be started or ran past its timeout
    Failed { status: ToolStatus, error: String },
}

/// What an adapter hands back to the pipeline.
///
/// `artifact` is what successor stages consume; it stays at its default when
/// the run did not complete.
#[derive(Debug, Clone)]
pub struct AdapterRun<T> {
    pub status: ToolStatus,
    pub artifact: T,
    pub findings: Vec<Finding>,
    /// Truncated stdout
    pub raw_output: String,
    /// Truncated stderr or failure description
    pub error: Option<String>,
}

impl<T: Default> AdapterRun<T> {
    pub fn completed(artifact: T, findings: Vec<Finding>, raw_output: String) -> Self {
        Self {
            status: ToolStatus::Completed,
            artifact,
            findings,
            raw_output,
            error: None,
        }
    }

    pub fn failed(status: ToolStatus, error: impl Into<String>) -> Self {
        Self {
            status,
            artifact: T::default(),
            findings: Vec::new(),
            raw_output: String::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ToolStatus::Completed
    }
}

/// Shared launcher handle plus output truncation policy
#[derive(Clone)]
pub struct Invoker {
    launcher: Arc<dyn ProcessLauncher>,
    truncate_bytes: usize,
}

impl Invoker {
    pub fn new(launcher: Arc<dyn ProcessLauncher>, truncate_bytes: usize) -> Self {
        Self {
            launcher,
            truncate_bytes,
        }
    }

    /// Launch one command. Only cancellation is returned as an error; start
    /// failures and timeouts are folded into `Invocation::Failed`.
    pub async fn invoke(
        &self,
        argv: Vec<String>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Invocation> {
        let tool = argv.first().cloned().unwrap_or_default();

        match self.launcher.launch(&argv, timeout, cancel).await {
            Ok(output) => {
                debug!(tool = %tool, exit_code = ?output.exit_code, "Tool exited");
                Ok(Invocation::Exited(output))
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e @ Error::ToolTimeout { .. }) => {
                warn!(tool = %tool, code = e.code(), "{}", e);
                Ok(Invocation::Failed {
                    status: ToolStatus::Timeout,
                    error: e.to_string(),
                })
            }
            Err(e) => {
                warn!(tool = %tool, code = e.code(), "{}", e);
                Ok(Invocation::Failed {
                    status: ToolStatus::Error,
                    error: e.to_string(),
                })
            }
        }
    }

    /// A non-zero exit turned into a failed run carrying stderr
    pub fn exit_failure<T: Default>(&self, output: &ProcessOutput) -> AdapterRun<T> {
        let stderr = self.truncate(output.stderr.trim());
        let error = if stderr.is_empty() {
            match output.exit_code {
                Some(code) => format!("exited with status {}", code),
                None => "terminated by signal".to_string(),
            }
        } else {
            stderr
        };
        AdapterRun::failed(ToolStatus::Error, error)
    }

    pub fn truncate(&self, text: &str) -> String {
        truncate_utf8(text, self.truncate_bytes)
    }
}

/// Cut `text` to at most `max_bytes`, backing off to a char boundary
pub fn truncate_utf8(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
