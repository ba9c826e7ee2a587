//! Scan jobs, per-target results and the job state machine

use crate::error::{Error, Result};
use crate::finding::{Finding, SourceTool};
use crate::module::{ModuleSet, ScanProfile, StageKind};
use crate::severity::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// Lifecycle status of a scan job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Queued,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Stopped
        )
    }

    /// queued -> running -> {completed, failed, stopped}; queued may also stop or fail
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Queued, JobStatus::Stopped)
                | (JobStatus::Queued, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Stopped)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome status of one stage for one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Completed,
    Skipped,
    Error,
    Timeout,
}

impl StageStatus {
    /// Whether the stage actually executed a tool
    pub fn executed(&self) -> bool {
        !matches!(self, StageStatus::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Completed => "completed",
            StageStatus::Skipped => "skipped",
            StageStatus::Error => "error",
            StageStatus::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What one stage did for one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub status: StageStatus,
    #[serde(default)]
    pub findings: Vec<Finding>,
    /// Why the stage was skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Truncated stderr or failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Truncated raw tool output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl StageOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Skipped,
            findings: Vec::new(),
            reason: Some(reason.into()),
            error: None,
            output: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn executed(status: StageStatus, started_at: DateTime<Utc>) -> Self {
        Self {
            status,
            findings: Vec::new(),
            reason: None,
            error: None,
            output: None,
            started_at: Some(started_at),
            finished_at: Some(Utc::now()),
        }
    }

    pub fn with_findings(mut self, findings: Vec<Finding>) -> Self {
        self.findings = findings;
        self
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error = error.filter(|e| !e.is_empty());
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        let output = output.into();
        if !output.is_empty() {
            self.output = Some(output);
        }
        self
    }
}

/// An open port reported by discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPort {
    pub port: u16,
    pub protocol: String,
    pub service: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
}

/// A reachable web endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebService {
    pub url: String,
    pub status_code: Option<u16>,
    pub title: Option<String>,
    /// The probe's line for this URL
    pub details: String,
}

/// One specialized scanner fired by a CMS signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecializedRun {
    pub signature: String,
    pub url: String,
    pub tool: SourceTool,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Artifacts stages hand to their successors
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetArtifacts {
    /// `None` when the liveness probe did not run
    pub alive: Option<bool>,
    #[serde(default)]
    pub open_ports: Vec<OpenPort>,
    #[serde(default)]
    pub web_services: Vec<WebService>,
    /// Fingerprint text keyed by URL
    #[serde(default)]
    pub technologies: BTreeMap<String, String>,
    #[serde(default)]
    pub specialized: Vec<SpecializedRun>,
}

/// Everything the pipeline recorded for one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetResult {
    pub target: String,
    #[serde(default)]
    pub stages: BTreeMap<StageKind, StageOutcome>,
    #[serde(default)]
    pub artifacts: TargetArtifacts,
    /// Cancellation stopped this target before its last stage
    #[serde(default)]
    pub interrupted: bool,
}

impl TargetResult {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            stages: BTreeMap::new(),
            artifacts: TargetArtifacts::default(),
            interrupted: false,
        }
    }

    pub fn record(&mut self, stage: StageKind, outcome: StageOutcome) {
        self.stages.insert(stage, outcome);
    }

    pub fn outcome(&self, stage: StageKind) -> Option<&StageOutcome> {
        self.stages.get(&stage)
    }

    pub fn status(&self, stage: StageKind) -> Option<StageStatus> {
        self.outcome(stage).map(|o| o.status)
    }

    /// Whether the stage ran a tool (with any result)
    pub fn ran(&self, stage: StageKind) -> bool {
        self.status(stage).map(|s| s.executed()).unwrap_or(false)
    }

    /// Highest-ranked stage that executed
    pub fn last_executed_stage(&self) -> Option<StageKind> {
        self.stages
            .iter()
            .filter(|(_, outcome)| outcome.status.executed())
            .map(|(stage, _)| *stage)
            .max()
    }

    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.stages.values().flat_map(|o| o.findings.iter())
    }
}

/// Per-severity finding counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityCounts {
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
    pub info: u32,
    pub total: u32,
}

impl VulnerabilityCounts {
    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::Info => self.info += 1,
        }
        self.total += 1;
    }
}

/// One scan request spanning one or more targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: Uuid,
    pub name: String,
    pub targets: Vec<String>,
    pub modules: ModuleSet,
    #[serde(default)]
    pub profile: ScanProfile,
    pub status: JobStatus,
    /// 0..=100; 100 only once completed
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Keyed by target as submitted
    #[serde(default)]
    pub results: BTreeMap<String, TargetResult>,
    #[serde(default)]
    pub counts: VulnerabilityCounts,
    pub error: Option<String>,
}

impl ScanJob {
    pub fn new(name: impl Into<String>, targets: Vec<String>, modules: ModuleSet) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            targets,
            modules,
            profile: ScanProfile::default(),
            status: JobStatus::Queued,
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            results: BTreeMap::new(),
            counts: VulnerabilityCounts::default(),
            error: None,
        }
    }

    pub fn with_profile(mut self, profile: ScanProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move the job forward through the state machine
    pub fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                job_id: self.id,
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }

        match next {
            JobStatus::Running => self.started_at = Some(Utc::now()),
            JobStatus::Completed => {
                self.progress = 100;
                self.finished_at = Some(Utc::now());
            }
            JobStatus::Failed | JobStatus::Stopped => self.finished_at = Some(Utc::now()),
            JobStatus::Queued => {}
        }
        self.status = next;
        Ok(())
    }

    /// Raise progress; never lowers it and never reaches 100 before completion
    pub fn advance_progress(&mut self, percent: u8) {
        if self.is_terminal() {
            return;
        }
        self.progress = self.progress.max(percent.min(99));
    }

    pub fn record_target(&mut self, result: TargetResult) {
        self.results.insert(result.target.clone(), result);
    }

    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.results.values().flat_map(|r| r.findings())
    }

    /// Recount findings by severity across every target result
    pub fn recompute_counts(&mut self) {
        let mut counts = VulnerabilityCounts::default();
        for finding in self.findings() {
            counts.add(finding.severity);
        }
        self.counts = counts;
    }

    /// True when no two findings share an id
    pub fn finding_ids_unique(&self) -> bool {
        let mut seen = HashSet::new();
        self.findings().all(|f| seen.insert(f.id))
    }
}
