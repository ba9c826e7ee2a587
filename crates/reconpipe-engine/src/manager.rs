//! Job manager - accepts scan requests, bounds concurrency, drives lifecycles

use crate::executor::{PipelineExecutor, StageObserver};
use crate::notify::{CriticalFindingSink, ProgressQueue, ProgressReporter, ProgressUpdate};
use crate::progress::ProgressTracker;
use crate::repository::{InMemoryJobRepository, JobRepository};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reconpipe_common::config::ScannerConfig;
use reconpipe_common::Config;
use reconpipe_core::{
    Error, Finding, JobStatus, ModuleSet, Result, ScanJob, ScanProfile, ScanTarget, StageKind,
    TargetResult,
};
use reconpipe_tools::{ProcessLauncher, Toolkit};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Owns every job for the life of the process.
///
/// At most `max_concurrent_scans` jobs run at once; the rest wait queued.
/// Each job's targets run concurrently up to `max_concurrent_targets`.
pub struct JobManager {
    runner: JobRunner,
    default_profile: ScanProfile,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl JobManager {
    pub fn new(
        config: &ScannerConfig,
        repo: Arc<dyn JobRepository>,
        executor: Arc<PipelineExecutor>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        info!(
            max_concurrent_scans = config.max_concurrent_scans,
            max_concurrent_targets = config.max_concurrent_targets,
            "Creating job manager"
        );
        Self {
            runner: JobRunner {
                repo,
                executor,
                reporter,
                slots: Arc::new(Semaphore::new(config.max_concurrent_scans.max(1))),
                max_concurrent_targets: config.max_concurrent_targets.max(1),
                active: Arc::new(Mutex::new(HashMap::new())),
            },
            default_profile: config.profile,
            tasks: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Wire a manager from configuration with an in-memory repository
    pub fn from_config(
        config: &Config,
        launcher: Arc<dyn ProcessLauncher>,
        reporter: Arc<dyn ProgressReporter>,
        sink: Arc<dyn CriticalFindingSink>,
    ) -> Self {
        let toolkit = Arc::new(Toolkit::from_config(launcher, config));
        let executor = Arc::new(PipelineExecutor::new(toolkit, sink));
        Self::new(
            &config.scanner,
            Arc::new(InMemoryJobRepository::new()),
            executor,
            reporter,
        )
    }

    /// Validate and enqueue a job with the configured scan profile; returns
    /// its id immediately.
    ///
    /// Targets are trimmed and deduplicated. An empty module set means all
    /// modules.
    pub async fn submit_job(
        &self,
        name: &str,
        targets: Vec<String>,
        modules: ModuleSet,
    ) -> Result<Uuid> {
        self.submit_job_with_profile(name, targets, modules, self.default_profile)
            .await
    }

    pub async fn submit_job_with_profile(
        &self,
        name: &str,
        targets: Vec<String>,
        modules: ModuleSet,
        profile: ScanProfile,
    ) -> Result<Uuid> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Internal("job manager is shutting down".into()));
        }

        let targets = validate_targets(targets)?;
        let modules = if modules.is_empty() {
            ModuleSet::all()
        } else {
            modules
        };
        let name = match name.trim() {
            "" => format!("Scan of {}", targets[0]),
            trimmed => trimmed.to_string(),
        };

        let job = ScanJob::new(name, targets, modules).with_profile(profile);
        let job_id = job.id;
        self.runner.repo.insert(job.clone()).await?;

        let cancel = self.shutdown.child_token();
        self.runner.active.lock().await.insert(job_id, cancel.clone());

        info!(
            job_id = %job_id,
            name = %job.name,
            targets = job.targets.len(),
            modules = job.modules.len(),
            profile = %job.profile,
            "Job queued"
        );

        let runner = self.runner.clone();
        let handle = tokio::spawn(runner.run(job, cancel));

        let mut tasks = self.tasks.lock().await;
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);

        Ok(job_id)
    }

    /// Request cancellation. Running tools are killed; results recorded so
    /// far are kept and the job ends `stopped`.
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<()> {
        let job = self.get_job(job_id).await?;
        if job.is_terminal() {
            return Err(Error::JobAlreadyFinished { job_id });
        }

        let active = self.runner.active.lock().await;
        let Some(cancel) = active.get(&job_id) else {
            return Err(Error::JobAlreadyFinished { job_id });
        };
        info!(job_id = %job_id, status = %job.status, "Cancelling job");
        cancel.cancel();
        Ok(())
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<ScanJob> {
        self.runner
            .repo
            .get(job_id)
            .await?
            .ok_or(Error::JobNotFound { job_id })
    }

    pub async fn list_jobs(&self) -> Result<Vec<ScanJob>> {
        self.runner.repo.list().await
    }

    /// Cancel every job and wait for all of them to settle
    pub async fn shutdown(&self) {
        info!("Shutting down job manager");
        self.shutdown.cancel();
        let handles = std::mem::take(&mut *self.tasks.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Job task failed during shutdown: {}", e);
            }
        }
    }
}

fn validate_targets(targets: Vec<String>) -> Result<Vec<String>> {
    let mut validated: Vec<String> = Vec::new();
    for raw in targets {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        let key = ScanTarget::parse(trimmed)?.display();
        if !validated.contains(&key) {
            validated.push(key);
        }
    }
    if validated.is_empty() {
        return Err(Error::JobDefinition("at least one target is required".into()));
    }
    Ok(validated)
}

/// Everything a job task needs, cloned into it
#[derive(Clone)]
struct JobRunner {
    repo: Arc<dyn JobRepository>,
    executor: Arc<PipelineExecutor>,
    reporter: Arc<dyn ProgressReporter>,
    slots: Arc<Semaphore>,
    max_concurrent_targets: usize,
    active: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
}

impl JobRunner {
    async fn run(self, job: ScanJob, cancel: CancellationToken) {
        let job_id = job.id;
        let (progress, delivery) = ProgressQueue::spawn(self.reporter.clone());
        let recorder = JobRecorder::new(job, self.repo.clone(), progress);

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = self.slots.clone().acquire_owned() => Some(permit),
        };

        let (status, error) = match permit {
            None => {
                info!(job_id = %job_id, "Job cancelled while queued");
                (JobStatus::Stopped, None)
            }
            Some(Err(_)) => (JobStatus::Failed, Some("worker pool closed".to_string())),
            Some(Ok(permit)) => {
                let outcome = self.execute(&recorder, &cancel).await;
                drop(permit);
                outcome
            }
        };

        recorder.finish(status, error).await;
        self.active.lock().await.remove(&job_id);

        // Let queued progress reach the reporter before the job task ends
        drop(recorder);
        if let Err(e) = delivery.await {
            warn!(job_id = %job_id, "Progress delivery task failed: {}", e);
        }
    }

    /// Run the pipeline on its own task so a panic fails only this job
    async fn execute(
        &self,
        recorder: &JobRecorder,
        cancel: &CancellationToken,
    ) -> (JobStatus, Option<String>) {
        if let Err(e) = recorder.start().await {
            return (JobStatus::Failed, Some(e.to_string()));
        }

        let pipeline = tokio::spawn(self.clone().pipeline(recorder.clone(), cancel.clone()));
        match pipeline.await {
            Ok(Ok(())) if cancel.is_cancelled() => (JobStatus::Stopped, None),
            Ok(Ok(())) => (JobStatus::Completed, None),
            Ok(Err(e)) => {
                error!(code = e.code(), "Pipeline failed: {}", e);
                (JobStatus::Failed, Some(e.to_string()))
            }
            Err(e) => {
                let message = panic_message(e);
                error!("{}", message);
                (JobStatus::Failed, Some(message))
            }
        }
    }

    async fn pipeline(self, recorder: JobRecorder, cancel: CancellationToken) -> Result<()> {
        let job = recorder.snapshot().await;
        let total = self.executor.plan().requested(&job.modules) * job.targets.len();
        let observer = JobObserver {
            recorder: recorder.clone(),
            tracker: ProgressTracker::new(total),
        };

        let executor = &self.executor;
        let observer = &observer;
        let recorder = &recorder;
        let cancel = &cancel;
        let job = &job;

        let results: Vec<Result<()>> = stream::iter(job.targets.clone())
            .map(|target| async move {
                if cancel.is_cancelled() {
                    debug!(job_id = %job.id, target = %target, "Skipping target after cancel");
                    return Ok(());
                }
                let scan_target = ScanTarget::parse(&target)?;
                let result = executor
                    .run_target(
                        job.id,
                        &scan_target,
                        &job.modules,
                        job.profile,
                        cancel,
                        observer,
                    )
                    .await;
                recorder.record_target(result).await
            })
            .buffer_unordered(self.max_concurrent_targets)
            .collect()
            .await;

        results.into_iter().collect()
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return "pipeline task was aborted".to_string();
    }
    let payload = err.into_panic();
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned());
    match detail {
        Some(detail) => format!("pipeline panicked: {}", detail),
        None => "pipeline panicked".to_string(),
    }
}

/// Serializes mutations of one job and persists each of them
#[derive(Clone)]
struct JobRecorder {
    job: Arc<Mutex<ScanJob>>,
    repo: Arc<dyn JobRepository>,
    progress: ProgressQueue,
}

impl JobRecorder {
    fn new(job: ScanJob, repo: Arc<dyn JobRepository>, progress: ProgressQueue) -> Self {
        Self {
            job: Arc::new(Mutex::new(job)),
            repo,
            progress,
        }
    }

    async fn snapshot(&self) -> ScanJob {
        self.job.lock().await.clone()
    }

    async fn start(&self) -> Result<()> {
        let job = self
            .update(|job| job.transition(JobStatus::Running), Some(Vec::new()))
            .await?;
        info!(job_id = %job.id, profile = %job.profile, "Job started");
        Ok(())
    }

    async fn stage_resolved(&self, partial: TargetResult, percent: u8, findings: Vec<Finding>) {
        let updated = self
            .update(
                |job| {
                    job.record_target(partial);
                    job.advance_progress(percent);
                    Ok(())
                },
                Some(findings),
            )
            .await;
        if let Err(e) = updated {
            warn!(code = e.code(), "Failed to persist stage progress: {}", e);
        }
    }

    async fn record_target(&self, result: TargetResult) -> Result<()> {
        self.update(
            |job| {
                job.record_target(result);
                Ok(())
            },
            None,
        )
        .await
        .map(|_| ())
    }

    async fn finish(&self, status: JobStatus, error: Option<String>) {
        let finished = self
            .update(
                |job| {
                    job.transition(status)?;
                    job.recompute_counts();
                    job.error = error;
                    Ok(())
                },
                Some(Vec::new()),
            )
            .await;
        match finished {
            Ok(job) => info!(
                job_id = %job.id,
                status = %job.status,
                findings = job.counts.total,
                critical = job.counts.critical,
                "Job finished"
            ),
            Err(e) => error!(code = e.code(), "Failed to record job outcome: {}", e),
        }
    }

    /// Apply, persist and optionally report one mutation. The update is
    /// queued under the job lock, so consumers see mutation order.
    async fn update<F>(&self, mutate: F, report: Option<Vec<Finding>>) -> Result<ScanJob>
    where
        F: FnOnce(&mut ScanJob) -> Result<()>,
    {
        let mut job = self.job.lock().await;
        mutate(&mut job)?;
        self.repo.save(job.clone()).await?;
        if let Some(findings) = report {
            self.progress.push(ProgressUpdate::from_job(&job, findings));
        }
        Ok(job.clone())
    }
}

/// Feeds per-stage results of every target into the job record
struct JobObserver {
    recorder: JobRecorder,
    tracker: ProgressTracker,
}

#[async_trait]
impl StageObserver for JobObserver {
    async fn stage_resolved(&self, stage: StageKind, partial: &TargetResult) {
        let percent = self.tracker.advance();
        let findings = partial
            .outcome(stage)
            .map(|o| o.findings.clone())
            .unwrap_or_default();
        self.recorder
            .stage_resolved(partial.clone(), percent, findings)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogProgressReporter;
    use crate::testing::{fixtures, CountingSink, Script, ScriptedLauncher};
    use reconpipe_core::{ScanModule, Severity, StageStatus};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    fn manager_with(
        launcher: ScriptedLauncher,
        scans: usize,
        targets: usize,
    ) -> (JobManager, Arc<CountingSink>, Arc<ScriptedLauncher>) {
        let config = Config::builder()
            .max_concurrent_scans(scans)
            .max_concurrent_targets(targets)
            .build();
        let sink = Arc::new(CountingSink::default());
        let launcher = Arc::new(launcher);
        let manager = JobManager::from_config(
            &config,
            launcher.clone(),
            Arc::new(LogProgressReporter),
            sink.clone(),
        );
        (manager, sink, launcher)
    }

    async fn wait_for<F>(manager: &JobManager, job_id: Uuid, pred: F) -> ScanJob
    where
        F: Fn(&ScanJob) -> bool,
    {
        for _ in 0..500 {
            let job = manager.get_job(job_id).await.unwrap();
            if pred(&job) {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached the expected state", job_id);
    }

    async fn wait_terminal(manager: &JobManager, job_id: Uuid) -> ScanJob {
        wait_for(manager, job_id, |j| j.is_terminal()).await
    }

    fn port_and_web_launcher() -> ScriptedLauncher {
        ScriptedLauncher::new()
            .on("nmap", Script::ok(fixtures::nmap_xml(&[80])))
            .on("httpx", Script::ok(""))
    }

    #[tokio::test]
    async fn test_port_scan_job_completes() {
        let (manager, _, _) = manager_with(port_and_web_launcher(), 5, 1);
        let modules = ModuleSet::parse(["ports", "web", "vulns"]).unwrap();
        let job_id = manager
            .submit_job("perimeter", vec![" example.com ".into()], modules)
            .await
            .unwrap();

        let job = wait_terminal(&manager, job_id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.started_at.is_some() && job.finished_at.is_some());
        assert_eq!(job.targets, vec!["example.com"]);

        let result = &job.results["example.com"];
        assert_eq!(result.status(StageKind::TechFingerprint), Some(StageStatus::Skipped));
        assert_eq!(result.status(StageKind::VulnScan), Some(StageStatus::Skipped));
        assert_eq!(job.counts.total, 2);
        assert_eq!(job.counts.info, 2);
        assert!(job.finding_ids_unique());
    }

    #[tokio::test]
    async fn test_submission_validation() {
        let (manager, _, _) = manager_with(ScriptedLauncher::new(), 5, 1);

        let err = manager
            .submit_job("empty", vec!["  ".into()], ModuleSet::all())
            .await
            .unwrap_err();
        assert!(err.is_job_definition());

        let err = manager
            .submit_job("bad", vec!["not a host!".into()], ModuleSet::all())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTarget(_)));
        assert!(manager.list_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_targets_and_default_modules() {
        let (manager, _, _) = manager_with(port_and_web_launcher(), 5, 2);
        let job_id = manager
            .submit_job(
                "",
                vec!["example.com".into(), "example.com ".into()],
                std::iter::empty::<ScanModule>().collect(),
            )
            .await
            .unwrap();

        let job = manager.get_job(job_id).await.unwrap();
        assert_eq!(job.targets.len(), 1);
        assert_eq!(job.modules, ModuleSet::all());
        assert_eq!(job.name, "Scan of example.com");
        assert_eq!(job.profile, ScanProfile::Full);
        wait_terminal(&manager, job_id).await;
    }

    #[tokio::test]
    async fn test_quick_profile_job() {
        let (manager, _, launcher) = manager_with(port_and_web_launcher(), 5, 1);
        let job_id = manager
            .submit_job_with_profile(
                "fast",
                vec!["example.com".into()],
                ModuleSet::parse(["ports"]).unwrap(),
                ScanProfile::Quick,
            )
            .await
            .unwrap();

        let job = wait_terminal(&manager, job_id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.profile, ScanProfile::Quick);
        let nmap = launcher.calls_for("nmap");
        assert!(nmap[0].contains(&"-F".to_string()));
    }

    #[tokio::test]
    async fn test_option_like_target_is_rejected() {
        let (manager, _, launcher) = manager_with(port_and_web_launcher(), 5, 1);
        for raw in ["--script=http-shellshock", "-iL", "a..b"] {
            let err = manager
                .submit_job("inject", vec![raw.into()], ModuleSet::all())
                .await
                .unwrap_err();
            assert!(err.is_job_definition(), "{} was accepted", raw);
        }
        assert!(manager.list_jobs().await.unwrap().is_empty());
        assert!(!launcher.called("nmap"));
    }

    #[tokio::test]
    async fn test_identical_submissions_are_independent() {
        let (manager, _, _) = manager_with(port_and_web_launcher(), 5, 1);
        let modules = ModuleSet::parse(["ports", "web"]).unwrap();

        let (a, b) = tokio::join!(
            manager.submit_job("same", vec!["example.com".into()], modules.clone()),
            manager.submit_job("same", vec!["example.com".into()], modules.clone()),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a, b);

        let job_a = wait_terminal(&manager, a).await;
        let job_b = wait_terminal(&manager, b).await;
        assert_eq!(job_a.status, JobStatus::Completed);
        assert_eq!(job_b.status, JobStatus::Completed);

        let ids_a: Vec<_> = job_a.findings().map(|f| f.id).collect();
        assert!(job_b.findings().all(|f| !ids_a.contains(&f.id)));
        assert_eq!(manager.list_jobs().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_keeps_finished_targets() {
        let launcher = ScriptedLauncher::new()
            .on_argv("nmap", |argv| {
                if argv.iter().any(|a| a == "slow.example.com") {
                    Script::Hang
                } else {
                    Script::ok(fixtures::nmap_xml(&[22]))
                }
            });
        let (manager, _, launcher) = manager_with(launcher, 5, 1);
        let modules = ModuleSet::parse(["ports"]).unwrap();
        let job_id = manager
            .submit_job(
                "two",
                vec!["fast.example.com".into(), "slow.example.com".into()],
                modules,
            )
            .await
            .unwrap();

        // Wait until the slow target is in flight
        for _ in 0..500 {
            if launcher.calls_for("nmap").len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        wait_for(&manager, job_id, |j| j.results.contains_key("fast.example.com")).await;
        manager.cancel_job(job_id).await.unwrap();

        let job = wait_terminal(&manager, job_id).await;
        assert_eq!(job.status, JobStatus::Stopped);
        assert!(job.progress < 100);

        let fast = &job.results["fast.example.com"];
        assert_eq!(fast.status(StageKind::PortDiscovery), Some(StageStatus::Completed));
        assert!(!fast.interrupted);
        assert_eq!(job.counts.total, 1);

        let slow = &job.results["slow.example.com"];
        assert!(slow.interrupted);
        assert_eq!(slow.status(StageKind::PortDiscovery), Some(StageStatus::Skipped));

        let err = manager.cancel_job(job_id).await.unwrap_err();
        assert!(matches!(err, Error::JobAlreadyFinished { .. }));
    }

    #[tokio::test]
    async fn test_cancel_queued_job() {
        let launcher = ScriptedLauncher::new().on("nmap", Script::Hang);
        let (manager, _, _) = manager_with(launcher, 1, 1);
        let modules = ModuleSet::parse(["ports"]).unwrap();

        let running = manager
            .submit_job("first", vec!["a.example.com".into()], modules.clone())
            .await
            .unwrap();
        wait_for(&manager, running, |j| j.status == JobStatus::Running).await;

        let queued = manager
            .submit_job("second", vec!["b.example.com".into()], modules)
            .await
            .unwrap();
        assert_eq!(manager.get_job(queued).await.unwrap().status, JobStatus::Queued);

        manager.cancel_job(queued).await.unwrap();
        let job = wait_terminal(&manager, queued).await;
        assert_eq!(job.status, JobStatus::Stopped);
        assert!(job.started_at.is_none());
        assert!(job.results.is_empty());

        manager.cancel_job(running).await.unwrap();
        assert_eq!(wait_terminal(&manager, running).await.status, JobStatus::Stopped);
    }

    #[tokio::test]
    async fn test_cancel_unknown_job() {
        let (manager, _, _) = manager_with(ScriptedLauncher::new(), 5, 1);
        let err = manager.cancel_job(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::JobNotFound { .. }));
        assert!(manager.get_job(Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn test_panic_fails_only_that_job() {
        let launcher = ScriptedLauncher::new()
            .on_argv("nmap", |argv| {
                if argv.iter().any(|a| a == "crash.example.com") {
                    Script::Panic
                } else {
                    Script::ok(fixtures::nmap_xml(&[80]))
                }
            })
            .on("httpx", Script::ok(""));
        let (manager, _, _) = manager_with(launcher, 5, 1);
        let modules = ModuleSet::parse(["ports", "web"]).unwrap();

        let crashed = manager
            .submit_job("crash", vec!["crash.example.com".into()], modules.clone())
            .await
            .unwrap();
        let healthy = manager
            .submit_job("ok", vec!["example.com".into()], modules)
            .await
            .unwrap();

        let job = wait_terminal(&manager, crashed).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.as_deref().unwrap_or_default().contains("panicked"));

        assert_eq!(wait_terminal(&manager, healthy).await.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_critical_findings_reach_sink_once() {
        let launcher = ScriptedLauncher::new()
            .on("nmap", Script::ok(fixtures::nmap_xml(&[80])))
            .on("httpx", Script::ok("http://blog.example.com:80 [200] [Blog]\n"))
            .on("whatweb", Script::ok("http://blog.example.com:80 [200 OK] nginx\n"))
            .on("nuclei", Script::ok(fixtures::nuclei_lines()));
        let (manager, sink, _) = manager_with(launcher, 5, 1);
        let modules = ModuleSet::parse(["ports", "web", "tech", "vulns"]).unwrap();
        let job_id = manager
            .submit_job("crit", vec!["blog.example.com".into()], modules)
            .await
            .unwrap();

        let job = wait_terminal(&manager, job_id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.counts.critical, 1);
        assert_eq!(job.counts.medium, 1);
        assert_eq!(sink.count(), 1);

        let critical: Vec<String> = job
            .findings()
            .filter(|f| f.severity == Severity::Critical)
            .map(|f| f.id.to_string())
            .collect();
        assert_eq!(sink.ids(), critical);
    }

    /// Records what it receives; Running updates can be made slow
    struct RecordingReporter {
        running_delay: Duration,
        updates: StdMutex<Vec<ProgressUpdate>>,
    }

    impl RecordingReporter {
        fn new(running_delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                running_delay,
                updates: StdMutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<(JobStatus, u8)> {
            self.updates
                .lock()
                .unwrap()
                .iter()
                .map(|u| (u.status, u.progress))
                .collect()
        }
    }

    #[async_trait]
    impl ProgressReporter for RecordingReporter {
        async fn report(&self, update: ProgressUpdate) -> Result<()> {
            if update.status == JobStatus::Running {
                tokio::time::sleep(self.running_delay).await;
            }
            self.updates.lock().unwrap().push(update);
            Ok(())
        }
    }

    fn manager_reporting_to(
        config: &Config,
        reporter: Arc<RecordingReporter>,
    ) -> (JobManager, Arc<InMemoryJobRepository>) {
        let toolkit = Arc::new(Toolkit::from_config(
            Arc::new(port_and_web_launcher()),
            config,
        ));
        let executor = Arc::new(PipelineExecutor::new(toolkit, Arc::new(CountingSink::default())));
        let repo = Arc::new(InMemoryJobRepository::new());
        let manager = JobManager::new(&config.scanner, repo.clone(), executor, reporter);
        (manager, repo)
    }

    async fn wait_for_report(reporter: &RecordingReporter, status: JobStatus) {
        for _ in 0..500 {
            if reporter.seen().iter().any(|(s, _)| *s == status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no {} update was reported", status);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let config = Config::builder().max_concurrent_targets(3).build();
        let reporter = RecordingReporter::new(Duration::ZERO);
        let (manager, repo) = manager_reporting_to(&config, reporter.clone());

        let targets = vec!["a.example.com".into(), "b.example.com".into(), "c.example.com".into()];
        let job_id = manager
            .submit_job("progress", targets, ModuleSet::parse(["ports", "web"]).unwrap())
            .await
            .unwrap();

        let mut seen = Vec::new();
        loop {
            let job = repo.get(job_id).await.unwrap().unwrap();
            seen.push((job.status, job.progress));
            if job.is_terminal() {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert!(seen.windows(2).all(|w| w[0].1 <= w[1].1));
        for (status, progress) in &seen {
            assert_eq!(*progress == 100, *status == JobStatus::Completed);
        }
        assert_eq!(seen.last(), Some(&(JobStatus::Completed, 100)));
    }

    #[tokio::test]
    async fn test_reporter_sees_updates_in_order() {
        let config = Config::builder().max_concurrent_targets(2).build();
        let reporter = RecordingReporter::new(Duration::from_millis(20));
        let (manager, _) = manager_reporting_to(&config, reporter.clone());

        let job_id = manager
            .submit_job(
                "ordered",
                vec!["a.example.com".into(), "b.example.com".into()],
                ModuleSet::parse(["ports", "web"]).unwrap(),
            )
            .await
            .unwrap();
        wait_terminal(&manager, job_id).await;
        wait_for_report(&reporter, JobStatus::Completed).await;

        let seen = reporter.seen();
        assert_eq!(seen.first(), Some(&(JobStatus::Running, 0)));
        assert_eq!(seen.last(), Some(&(JobStatus::Completed, 100)));
        assert!(
            seen.windows(2).all(|w| w[0].1 <= w[1].1),
            "progress went backwards: {:?}",
            seen
        );
        let completed_at = seen.iter().position(|(s, _)| *s == JobStatus::Completed);
        assert_eq!(completed_at, Some(seen.len() - 1));
        // Job start plus two resolved stages per target
        assert_eq!(seen.len(), 6);
    }

    #[tokio::test]
    async fn test_shutdown_stops_running_jobs() {
        let launcher = ScriptedLauncher::new().on("nmap", Script::Hang);
        let (manager, _, _) = manager_with(launcher, 5, 1);
        let job_id = manager
            .submit_job("hang", vec!["example.com".into()], ModuleSet::parse(["ports"]).unwrap())
            .await
            .unwrap();
        wait_for(&manager, job_id, |j| j.status == JobStatus::Running).await;

        manager.shutdown().await;
        assert_eq!(manager.get_job(job_id).await.unwrap().status, JobStatus::Stopped);
        assert!(manager
            .submit_job("late", vec!["example.com".into()], ModuleSet::all())
            .await
            .is_err());
    }
}
