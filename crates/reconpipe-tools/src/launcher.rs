//! Child-process launching with timeout and cancellation

use async_trait::async_trait;
use reconpipe_core::{Error, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// What a finished child process left behind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs one external command to completion.
///
/// Implementations must return `Error::ToolInvocation` when the binary cannot
/// be started, `Error::ToolTimeout` when `timeout` elapses and
/// `Error::Cancelled` when `cancel` fires. In the last two cases the child
/// must not outlive the call.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(
        &self,
        argv: &[String],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput>;
}

/// Launcher backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioLauncher;

#[async_trait]
impl ProcessLauncher for TokioLauncher {
    async fn launch(
        &self,
        argv: &[String],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput> {
        let (program, args) = argv.split_first().ok_or_else(|| Error::ToolInvocation {
            tool: String::new(),
            message: "empty command line".into(),
        })?;

        debug!(tool = %program, ?args, timeout_secs = timeout.as_secs(), "Spawning tool");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ToolInvocation {
                tool: program.clone(),
                message: e.to_string(),
            })?;

        // Dropping the wait future drops the child, which kills it.
        tokio::select! {
            waited = tokio::time::timeout(timeout, child.wait_with_output()) => {
                let output = waited
                    .map_err(|_| Error::ToolTimeout {
                        tool: program.clone(),
                        timeout_seconds: timeout.as_secs(),
                    })?
                    .map_err(|e| Error::ToolInvocation {
                        tool: program.clone(),
                        message: format!("failed while waiting: {}", e),
                    })?;

                Ok(ProcessOutput {
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
            _ = cancel.cancelled() => {
                debug!(tool = %program, "Tool cancelled");
                Err(Error::Cancelled)
            }
        }
    }
}
