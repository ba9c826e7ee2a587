//! Vulnerability template scanning via nuclei JSON lines

use super::ToolCommand;
use crate::invocation::{AdapterRun, Invocation, Invoker};
use crate::normalize::{Normalizer, TemplateMatch};
use reconpipe_common::config::NucleiConfig;
use reconpipe_core::{Finding, Result, ScanProfile};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const DEFAULT_BINARY: &str = "nuclei";
const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct NucleiAdapter {
    command: ToolCommand,
    templates_dir: Option<String>,
    severity: Vec<String>,
    rate_limit: u32,
}

impl NucleiAdapter {
    pub fn from_config(config: &NucleiConfig) -> Self {
        Self {
            command: ToolCommand::from_config(&config.tool, DEFAULT_BINARY, DEFAULT_TIMEOUT_SECS),
            templates_dir: config.templates_dir.clone(),
            severity: config.severity.clone(),
            rate_limit: config.rate_limit,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.command.timeout
    }

    /// The quick profile narrows the run to CVE templates
    pub fn argv(&self, urls: &[String], profile: ScanProfile) -> Vec<String> {
        let mut args = vec![
            "-u".to_string(),
            urls.join(","),
            "-silent".into(),
            "-jsonl".into(),
            "-rate-limit".into(),
            self.rate_limit.to_string(),
            "-timeout".into(),
            "5".into(),
        ];
        if !self.severity.is_empty() {
            args.push("-severity".into());
            args.push(self.severity.join(","));
        }
        match (&self.templates_dir, profile) {
            (Some(dir), ScanProfile::Full) => {
                args.push("-t".into());
                args.push(dir.clone());
            }
            (Some(dir), ScanProfile::Quick) => {
                args.push("-t".into());
                args.push(format!("{}/cves/", dir.trim_end_matches('/')));
            }
            (None, ScanProfile::Quick) => {
                args.push("-tags".into());
                args.push("cve".into());
            }
            (None, ScanProfile::Full) => {}
        }
        self.command.argv(args, std::iter::empty::<String>())
    }

    pub async fn run(
        &self,
        invoker: &Invoker,
        normalizer: &Normalizer,
        urls: &[String],
        profile: ScanProfile,
        cancel: &CancellationToken,
    ) -> Result<AdapterRun<()>> {
        let output = match invoker
            .invoke(self.argv(urls, profile), self.command.timeout, cancel)
            .await?
        {
            Invocation::Exited(output) => output,
            Invocation::Failed { status, error } => return Ok(AdapterRun::failed(status, error)),
        };

        if !output.success() {
            return Ok(invoker.exit_failure(&output));
        }

        let findings = parse_nuclei_output(&output.stdout, normalizer);
        debug!(target = normalizer.target(), findings = findings.len(), "Template scan finished");
        Ok(AdapterRun::completed(
            (),
            findings,
            invoker.truncate(output.stdout.trim()),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct NucleiRecord {
    #[serde(rename = "template-id")]
    template_id: String,
    #[serde(default)]
    info: Option<NucleiInfo>,
    #[serde(rename = "matched-at")]
    matched_at: Option<String>,
    host: Option<String>,
    #[serde(rename = "extracted-results", default)]
    extracted_results: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct NucleiInfo {
    name: Option<String>,
    severity: Option<String>,
    description: Option<String>,
    #[serde(default)]
    reference: Value,
    #[serde(default)]
    classification: Option<Classification>,
}

#[derive(Debug, Default, Deserialize)]
struct Classification {
    #[serde(rename = "cvss-score", default)]
    cvss_score: Value,
    #[serde(rename = "cve-id", default)]
    cve_id: Value,
}

/// Decode JSON lines independently; a malformed line is skipped and the
/// lines after it are still read.
pub fn parse_nuclei_output(stdout: &str, normalizer: &Normalizer) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut skipped = 0usize;

    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match serde_json::from_str::<NucleiRecord>(line) {
            Ok(record) => findings.push(normalizer.template_match(into_match(record))),
            Err(e) => {
                skipped += 1;
                debug!(error = %e, "Skipping malformed nuclei line");
            }
        }
    }

    if skipped > 0 {
        warn!(target = normalizer.target(), skipped, "Skipped malformed nuclei records");
    }
    findings
}

fn into_match(record: NucleiRecord) -> TemplateMatch {
    let info = record.info.unwrap_or_default();
    let classification = info.classification.unwrap_or_default();
    TemplateMatch {
        template_id: record.template_id,
        name: info.name,
        severity: info.severity,
        description: info.description,
        matched_at: record.matched_at.or(record.host),
        cvss_score: number(&classification.cvss_score),
        cve_ids: strings(&classification.cve_id),
        references: strings(&info.reference),
        evidence: record.extracted_results.unwrap_or_default(),
    }
}

/// Accept a bare string or an array of strings
fn strings(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) if !s.is_empty() => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn number(value: &Value) -> Option<f32> {
    match value {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
