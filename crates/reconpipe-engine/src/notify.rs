//! Outbound seams: progress reporting and critical-finding delivery

use async_trait::async_trait;
use reconpipe_core::{Finding, JobStatus, Result, ScanJob, StageKind, VulnerabilityCounts};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Snapshot of a job's progress sent to external consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: u8,
    pub vulnerabilities: VulnerabilityCounts,
    /// Tools that have executed so far
    pub tools_used: Vec<String>,
    /// Findings produced by the stage that triggered this update
    #[serde(default)]
    pub findings: Vec<Finding>,
}

impl ProgressUpdate {
    pub fn from_job(job: &ScanJob, findings: Vec<Finding>) -> Self {
        let mut vulnerabilities = job.counts;
        if !job.is_terminal() {
            // Counts on the record are only final at the end; report a running tally
            vulnerabilities = VulnerabilityCounts::default();
            for finding in job.findings() {
                vulnerabilities.add(finding.severity);
            }
        }

        Self {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            vulnerabilities,
            tools_used: tools_used(job),
            findings,
        }
    }
}

fn tools_used(job: &ScanJob) -> Vec<String> {
    let mut tools = BTreeSet::new();
    for result in job.results.values() {
        for (stage, outcome) in &result.stages {
            if !outcome.status.executed() {
                continue;
            }
            match stage {
                StageKind::Liveness => tools.insert("ping".to_string()),
                StageKind::PortDiscovery => tools.insert("nmap".to_string()),
                StageKind::WebDiscovery => tools.insert("httpx".to_string()),
                StageKind::TechFingerprint => tools.insert("whatweb".to_string()),
                StageKind::VulnScan => tools.insert("nuclei".to_string()),
                StageKind::Specialized => false,
            };
        }
        for run in &result.artifacts.specialized {
            tools.insert(run.tool.to_string());
        }
    }
    tools.into_iter().collect()
}

/// Receives progress snapshots. Calls come from a per-job delivery task,
/// one at a time; failures never reach the pipeline.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn report(&self, update: ProgressUpdate) -> Result<()>;
}

/// Writes progress to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgressReporter;

#[async_trait]
impl ProgressReporter for LogProgressReporter {
    async fn report(&self, update: ProgressUpdate) -> Result<()> {
        info!(
            job_id = %update.job_id,
            status = %update.status,
            progress = update.progress,
            findings = update.vulnerabilities.total,
            "Scan progress"
        );
        Ok(())
    }
}

/// Delivers one job's progress updates to the reporter in the order they
/// were queued. Pushing never blocks; reporter failures are logged and
/// dropped.
#[derive(Debug, Clone)]
pub struct ProgressQueue {
    tx: mpsc::UnboundedSender<ProgressUpdate>,
}

impl ProgressQueue {
    /// Start the delivery task. It drains the backlog and exits once every
    /// queue handle is dropped.
    pub fn spawn(reporter: Arc<dyn ProgressReporter>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<ProgressUpdate>();
        let handle = tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                let job_id = update.job_id;
                if let Err(e) = reporter.report(update).await {
                    warn!(job_id = %job_id, code = e.code(), "Progress report failed: {}", e);
                }
            }
        });
        (Self { tx }, handle)
    }

    pub fn push(&self, update: ProgressUpdate) {
        if let Err(e) = self.tx.send(update) {
            debug!(job_id = %e.0.job_id, "Progress delivery task gone; dropping update");
        }
    }
}

/// Invoked synchronously once per critical finding; delivery happens elsewhere
pub trait CriticalFindingSink: Send + Sync {
    fn on_critical_finding(&self, job_id: Uuid, finding: &Finding);
}

/// Logs critical findings
#[derive(Debug, Clone, Copy, Default)]
pub struct LogCriticalSink;

impl CriticalFindingSink for LogCriticalSink {
    fn on_critical_finding(&self, job_id: Uuid, finding: &Finding) {
        warn!(
            job_id = %job_id,
            target = %finding.target,
            tool = %finding.source_tool,
            "Critical finding: {}",
            finding.title
        );
    }
}

/// A critical finding queued for delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalAlert {
    pub job_id: Uuid,
    pub finding: Finding,
}

/// Hands critical findings to an async consumer over a channel
#[derive(Debug, Clone)]
pub struct ChannelCriticalSink {
    tx: mpsc::UnboundedSender<CriticalAlert>,
}

impl ChannelCriticalSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CriticalAlert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl CriticalFindingSink for ChannelCriticalSink {
    fn on_critical_finding(&self, job_id: Uuid, finding: &Finding) {
        let alert = CriticalAlert {
            job_id,
            finding: finding.clone(),
        };
        if self.tx.send(alert).is_err() {
            debug!(job_id = %job_id, "Critical alert consumer gone; dropping alert");
        }
    }
}
