//! Stage pipeline executor - runs the ordered, gated stage sequence for one target

use crate::notify::CriticalFindingSink;
use crate::stage::StagePlan;
use async_trait::async_trait;
use chrono::Utc;
use reconpipe_core::{
    Error, ModuleSet, Result, ScanProfile, ScanTarget, SourceTool, SpecializedRun, StageKind,
    StageOutcome, StageStatus, TargetResult,
};
use reconpipe_tools::adapters::httpx::probe_urls;
use reconpipe_tools::{AdapterRun, Normalizer, SignatureMatch, Toolkit, DEFAULT_WEB_PORTS};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

const REASON_NOT_REQUESTED: &str = "module not requested";
const REASON_NO_ARTIFACT: &str = "predecessor produced no usable artifact";
const REASON_NO_SIGNATURE: &str = "no CMS signature matched";
const REASON_CANCELLED: &str = "job cancelled";

/// Notified after every requested stage resolves, whether it ran or was gated off
#[async_trait]
pub trait StageObserver: Send + Sync {
    /// `partial` holds every stage recorded so far for the target
    async fn stage_resolved(&self, stage: StageKind, partial: &TargetResult);
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

#[async_trait]
impl StageObserver for NoopObserver {
    async fn stage_resolved(&self, _stage: StageKind, _partial: &TargetResult) {}
}

/// Runs the stage plan against single targets
pub struct PipelineExecutor {
    toolkit: Arc<Toolkit>,
    plan: StagePlan,
    sink: Arc<dyn CriticalFindingSink>,
}

impl PipelineExecutor {
    pub fn new(toolkit: Arc<Toolkit>, sink: Arc<dyn CriticalFindingSink>) -> Self {
        let plan = StagePlan::from_toolkit(&toolkit);
        Self {
            toolkit,
            plan,
            sink,
        }
    }

    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    /// Run every stage for one target. Tool failures stay inside their
    /// stage; cancellation marks the result interrupted and records the
    /// remaining stages as skipped.
    pub async fn run_target(
        &self,
        job_id: Uuid,
        target: &ScanTarget,
        modules: &ModuleSet,
        profile: ScanProfile,
        cancel: &CancellationToken,
        observer: &dyn StageObserver,
    ) -> TargetResult {
        let key = target.display();
        let normalizer = Normalizer::new(key.as_str());
        let mut result = TargetResult::new(key.as_str());
        let mut matches: Vec<SignatureMatch> = Vec::new();

        for definition in self.plan.stages() {
            let stage = definition.kind;

            if result.interrupted || cancel.is_cancelled() {
                result.interrupted = true;
                result.record(stage, StageOutcome::skipped(REASON_CANCELLED));
                continue;
            }

            if !definition.applies_to(modules) {
                result.record(stage, StageOutcome::skipped(REASON_NOT_REQUESTED));
                continue;
            }

            if let Some(reason) = self.gate(stage, &result, &mut matches) {
                debug!(job_id = %job_id, target = %key, stage = %stage, reason, "Stage skipped");
                result.record(stage, StageOutcome::skipped(reason));
                observer.stage_resolved(stage, &result).await;
                continue;
            }

            info!(
                job_id = %job_id,
                target = %key,
                stage = %stage,
                timeout_secs = definition.timeout.as_secs(),
                "Running stage"
            );

            let started = Utc::now();
            let outcome = match self
                .execute(stage, target, profile, &normalizer, &mut result, &matches, cancel)
                .await
            {
                Ok(outcome) => outcome,
                Err(Error::Cancelled) => {
                    warn!(job_id = %job_id, target = %key, stage = %stage, "Stage interrupted");
                    result.interrupted = true;
                    result.record(stage, StageOutcome::skipped("cancelled while running"));
                    continue;
                }
                Err(e) => StageOutcome::executed(StageStatus::Error, started)
                    .with_error(Some(e.to_string())),
            };

            if outcome.status != StageStatus::Completed {
                warn!(
                    job_id = %job_id,
                    target = %key,
                    stage = %stage,
                    status = %outcome.status,
                    error = outcome.error.as_deref().unwrap_or_default(),
                    "Stage did not complete"
                );
            }

            for finding in outcome.findings.iter().filter(|f| f.is_critical()) {
                self.sink.on_critical_finding(job_id, finding);
            }
            result.record(stage, outcome);
            observer.stage_resolved(stage, &result).await;
        }

        if !result.interrupted {
            mark_reconnaissance_completed(&normalizer, &mut result);
        }
        result
    }

    /// Skip reason when the stage's predecessor left nothing usable
    fn gate(
        &self,
        stage: StageKind,
        result: &TargetResult,
        matches: &mut Vec<SignatureMatch>,
    ) -> Option<&'static str> {
        match stage {
            StageKind::Liveness | StageKind::PortDiscovery => None,
            StageKind::WebDiscovery => (result.status(StageKind::PortDiscovery)
                != Some(StageStatus::Completed))
            .then_some(REASON_NO_ARTIFACT),
            StageKind::TechFingerprint => result
                .artifacts
                .web_services
                .is_empty()
                .then_some(REASON_NO_ARTIFACT),
            StageKind::VulnScan => (!result.ran(StageKind::TechFingerprint)
                || result.artifacts.web_services.is_empty())
            .then_some(REASON_NO_ARTIFACT),
            StageKind::Specialized => {
                if result.status(StageKind::TechFingerprint) != Some(StageStatus::Completed) {
                    return Some(REASON_NO_ARTIFACT);
                }
                *matches = self
                    .toolkit
                    .signatures
                    .evaluate(&result.artifacts.technologies);
                matches.is_empty().then_some(REASON_NO_SIGNATURE)
            }
        }
    }

    /// Run one stage's tool(s). Only cancellation is returned as an error.
    async fn execute(
        &self,
        stage: StageKind,
        target: &ScanTarget,
        profile: ScanProfile,
        normalizer: &Normalizer,
        result: &mut TargetResult,
        matches: &[SignatureMatch],
        cancel: &CancellationToken,
    ) -> Result<StageOutcome> {
        let started = Utc::now();
        let toolkit = &self.toolkit;
        let invoker = &toolkit.invoker;

        let outcome = match stage {
            StageKind::Liveness => {
                let run = toolkit.liveness.run(invoker, target, cancel).await?;
                let (outcome, alive) = into_outcome(run, started);
                result.artifacts.alive = Some(alive);
                outcome
            }
            StageKind::PortDiscovery => {
                let run = toolkit
                    .nmap
                    .run(invoker, normalizer, target, profile, cancel)
                    .await?;
                let (outcome, ports) = into_outcome(run, started);
                result.artifacts.open_ports = ports;
                outcome
            }
            StageKind::WebDiscovery => {
                let ports: BTreeSet<u16> = result
                    .artifacts
                    .open_ports
                    .iter()
                    .map(|p| p.port)
                    .chain(DEFAULT_WEB_PORTS)
                    .collect();
                let urls = probe_urls(target, &ports);
                let run = toolkit.httpx.run(invoker, normalizer, &urls, cancel).await?;
                let (outcome, services) = into_outcome(run, started);
                result.artifacts.web_services = services;
                outcome
            }
            StageKind::TechFingerprint => {
                let urls = web_urls(result);
                let run = toolkit.whatweb.run(invoker, &urls, cancel).await?;
                let (outcome, technologies) = into_outcome(run, started);
                result.artifacts.technologies = technologies;
                outcome
            }
            StageKind::VulnScan => {
                let urls = web_urls(result);
                let run = toolkit
                    .nuclei
                    .run(invoker, normalizer, &urls, profile, cancel)
                    .await?;
                into_outcome(run, started).0
            }
            StageKind::Specialized => {
                self.dispatch_specialized(normalizer, result, matches, started, cancel)
                    .await?
            }
        };
        Ok(outcome)
    }

    /// Fire one specialized scanner per matched signature
    async fn dispatch_specialized(
        &self,
        normalizer: &Normalizer,
        result: &mut TargetResult,
        matches: &[SignatureMatch],
        started: chrono::DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome> {
        let mut findings = Vec::new();
        let mut outputs = Vec::new();
        let mut first_failure: Option<(StageStatus, Option<String>)> = None;
        let mut any_completed = false;

        for m in matches {
            let Some(scanner) = self.toolkit.specialized.get(&m.signature) else {
                let error = format!("no scanner registered for signature '{}'", m.signature);
                first_failure.get_or_insert((StageStatus::Error, Some(error.clone())));
                result.artifacts.specialized.push(SpecializedRun {
                    signature: m.signature.clone(),
                    url: m.url.clone(),
                    tool: SourceTool::Pipeline,
                    status: StageStatus::Error,
                    error: Some(error),
                });
                continue;
            };

            debug!(signature = %m.signature, url = %m.url, tool = %scanner.tool(), "Dispatching specialized scan");
            let run = scanner
                .scan(&self.toolkit.invoker, normalizer, &m.url, cancel)
                .await?;

            let status = StageStatus::from(run.status);
            if run.is_completed() {
                any_completed = true;
            } else {
                first_failure.get_or_insert((status, run.error.clone()));
            }
            result.artifacts.specialized.push(SpecializedRun {
                signature: m.signature.clone(),
                url: m.url.clone(),
                tool: scanner.tool(),
                status,
                error: run.error.clone(),
            });
            if !run.raw_output.is_empty() {
                outputs.push(run.raw_output);
            }
            findings.extend(run.findings);
        }

        let (status, error) = if any_completed {
            (StageStatus::Completed, None)
        } else {
            first_failure.unwrap_or((StageStatus::Error, None))
        };

        Ok(StageOutcome::executed(status, started)
            .with_findings(findings)
            .with_error(error)
            .with_output(self.toolkit.invoker.truncate(&outputs.join("\n"))))
    }
}

fn into_outcome<T>(run: AdapterRun<T>, started: chrono::DateTime<Utc>) -> (StageOutcome, T) {
    let outcome = StageOutcome::executed(run.status.into(), started)
        .with_findings(run.findings)
        .with_error(run.error)
        .with_output(run.raw_output);
    (outcome, run.artifact)
}

fn web_urls(result: &TargetResult) -> Vec<String> {
    result
        .artifacts
        .web_services
        .iter()
        .map(|s| s.url.clone())
        .collect()
}

/// An executed-but-empty final stage gets one informational record, so it
/// reads differently from a target whose stages were all skipped
fn mark_reconnaissance_completed(normalizer: &Normalizer, result: &mut TargetResult) {
    let Some(stage) = result.last_executed_stage() else {
        return;
    };
    if let Some(outcome) = result.stages.get_mut(&stage) {
        if outcome.status == StageStatus::Completed && outcome.findings.is_empty() {
            outcome
                .findings
                .push(normalizer.reconnaissance_completed(stage));
        }
    }
}
