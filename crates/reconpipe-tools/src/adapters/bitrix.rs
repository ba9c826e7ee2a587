//! 1C-Bitrix checks via check_bitrix

use super::{SpecializedScanner, ToolCommand};
use crate::invocation::{AdapterRun, Invocation, Invoker};
use crate::normalize::Normalizer;
use async_trait::async_trait;
use regex::Regex;
use reconpipe_common::ToolConfig;
use reconpipe_core::{Finding, Result, SourceTool};
use std::sync::OnceLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_BINARY: &str = "check_bitrix";
const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct BitrixScanner {
    command: ToolCommand,
}

impl BitrixScanner {
    pub fn from_config(config: &ToolConfig) -> Self {
        Self {
            command: ToolCommand::from_config(config, DEFAULT_BINARY, DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn argv(&self, url: &str) -> Vec<String> {
        self.command
            .argv(std::iter::empty::<String>(), ["-t", url, "scan"])
    }
}

#[async_trait]
impl SpecializedScanner for BitrixScanner {
    fn signature(&self) -> &str {
        "bitrix"
    }

    fn timeout(&self) -> Duration {
        self.command.timeout
    }

    fn tool(&self) -> SourceTool {
        SourceTool::Bitrix
    }

    async fn scan(
        &self,
        invoker: &Invoker,
        normalizer: &Normalizer,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<AdapterRun<()>> {
        let output = match invoker
            .invoke(self.argv(url), self.command.timeout, cancel)
            .await?
        {
            Invocation::Exited(output) => output,
            Invocation::Failed { status, error } => return Ok(AdapterRun::failed(status, error)),
        };

        if !output.success() {
            return Ok(invoker.exit_failure(&output));
        }

        let findings = parse_bitrix_output(&output.stdout, url, normalizer);
        Ok(AdapterRun::completed(
            (),
            findings,
            invoker.truncate(output.stdout.trim()),
        ))
    }
}

/// Each `[+]` line is a positive check result and becomes an advisory
pub fn parse_bitrix_output(stdout: &str, url: &str, normalizer: &Normalizer) -> Vec<Finding> {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    let ansi = ANSI.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").expect("valid ANSI pattern"));

    ansi.replace_all(stdout, "")
        .lines()
        .filter_map(|line| line.trim().strip_prefix("[+]"))
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| {
            normalizer.advisory(
                SourceTool::Bitrix,
                &format!("Bitrix: {}", text),
                url,
                text,
            )
        })
        .collect()
}
