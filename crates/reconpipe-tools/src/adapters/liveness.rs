//! ICMP liveness probe

use super::ToolCommand;
use crate::invocation::{AdapterRun, Invocation, Invoker};
use reconpipe_common::ToolConfig;
use reconpipe_core::{Result, ScanTarget};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_BINARY: &str = "ping";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// `ping -c 1 -W 3 <host>`; the artifact is the reachability flag
#[derive(Debug, Clone)]
pub struct LivenessAdapter {
    command: ToolCommand,
}

impl LivenessAdapter {
    pub fn from_config(config: &ToolConfig) -> Self {
        Self {
            command: ToolCommand::from_config(config, DEFAULT_BINARY, DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.command.timeout
    }

    pub fn argv(&self, target: &ScanTarget) -> Vec<String> {
        self.command.argv(["-c", "1", "-W", "3"], [target.host()])
    }

    pub async fn run(
        &self,
        invoker: &Invoker,
        target: &ScanTarget,
        cancel: &CancellationToken,
    ) -> Result<AdapterRun<bool>> {
        let output = match invoker
            .invoke(self.argv(target), self.command.timeout, cancel)
            .await?
        {
            Invocation::Exited(output) => output,
            Invocation::Failed { status, error } => return Ok(AdapterRun::failed(status, error)),
        };

        if !output.success() {
            // Unreachable host: recorded, never blocks later stages
            return Ok(invoker.exit_failure(&output));
        }
        Ok(AdapterRun::completed(
            true,
            Vec::new(),
            invoker.truncate(output.stdout.trim()),
        ))
    }
}
