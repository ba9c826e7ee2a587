//! reconpipe Scanner - one-shot reconnaissance runner
//!
//! Submits a single job, polls it until it settles and writes the job record
//! as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use reconpipe_common::logging::{init_logging_with_config, LogConfig};
use reconpipe_common::Config;
use reconpipe_core::{parse_target_list, Error, JobStatus, ModuleSet, ScanJob, ScanProfile};
use reconpipe_engine::{
    ChannelCriticalSink, CriticalFindingSink, JobManager, LogCriticalSink, LogProgressReporter,
    ProgressReporter,
};
use reconpipe_tools::TokioLauncher;
use reconpipe_transport::{HttpProgressReporter, WebhookNotifier};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// reconpipe reconnaissance scanner
#[derive(Parser, Debug)]
#[command(name = "reconpipe-scanner")]
#[command(version)]
#[command(about = "Staged reconnaissance pipeline over external scanning tools", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/reconpipe/scanner.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides config
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, json, compact); overrides config
    #[arg(long)]
    log_format: Option<String>,

    /// Target host, IP or URL (repeatable)
    #[arg(short, long = "target")]
    targets: Vec<String>,

    /// File with one target per line
    #[arg(long)]
    targets_file: Option<PathBuf>,

    /// Comma-separated modules (ping, ports, web, tech, vulns, cms); default all
    #[arg(short, long, value_delimiter = ',')]
    modules: Vec<String>,

    /// Scan depth (quick, full); overrides config
    #[arg(short, long)]
    profile: Option<ScanProfile>,

    /// Job name
    #[arg(long, default_value = "")]
    name: String,

    /// Write the job record here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Job polling interval
    #[arg(long, default_value_t = 500)]
    poll_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args.config)?;

    let mut log_config = LogConfig::from_settings(&config.logging)?;
    if let Some(level) = &args.log_level {
        log_config = log_config.level(level.clone());
    }
    if let Some(format) = &args.log_format {
        log_config = log_config.format(format.parse()?);
    }
    init_logging_with_config(log_config)?;

    info!("reconpipe scanner starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut targets = args.targets.clone();
    if let Some(path) = &args.targets_file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read targets file {}", path.display()))?;
        targets.extend(parse_target_list(&content));
    }
    if targets.is_empty() {
        anyhow::bail!("no targets given; use --target or --targets-file");
    }
    let modules = ModuleSet::parse(&args.modules)?;

    let reporter: Arc<dyn ProgressReporter> =
        match HttpProgressReporter::from_config(&config.reporting)? {
            Some(reporter) => {
                info!("Progress updates go to {:?}", config.reporting.progress_url);
                Arc::new(reporter)
            }
            None => Arc::new(LogProgressReporter),
        };

    let (sink, notifier): (Arc<dyn CriticalFindingSink>, _) =
        match WebhookNotifier::from_config(&config.reporting)? {
            Some(notifier) => {
                let (sink, rx) = ChannelCriticalSink::channel();
                (Arc::new(sink), Some(notifier.spawn(rx)))
            }
            None => (Arc::new(LogCriticalSink), None),
        };

    let manager = JobManager::from_config(&config, Arc::new(TokioLauncher), reporter, sink);
    let profile = args.profile.unwrap_or(config.scanner.profile);
    let job_id = manager
        .submit_job_with_profile(&args.name, targets, modules, profile)
        .await?;
    info!(job_id = %job_id, profile = %profile, "Scan submitted");

    let job = wait_for_job(&manager, job_id, Duration::from_millis(args.poll_interval_ms)).await?;

    manager.shutdown().await;
    drop(manager);
    if let Some(handle) = notifier {
        let delivered = handle.await?;
        info!(delivered, "Critical alerts delivered");
    }

    write_report(&job, args.output.as_deref())?;

    info!(
        job_id = %job.id,
        status = %job.status,
        findings = job.counts.total,
        critical = job.counts.critical,
        high = job.counts.high,
        "Scan finished"
    );

    match job.status {
        JobStatus::Failed => anyhow::bail!(
            "scan failed: {}",
            job.error.as_deref().unwrap_or("unknown error")
        ),
        JobStatus::Stopped => {
            warn!("Scan was stopped before it finished");
            Ok(())
        }
        _ => Ok(()),
    }
}

fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        Config::from_file(path)?
    } else {
        info!("Config file not found, using defaults");
        Config::default()
    };
    let config = config.merge_env();
    config.validate()?;
    Ok(config)
}

/// Poll until the job is terminal; Ctrl-C cancels it once
async fn wait_for_job(
    manager: &JobManager,
    job_id: Uuid,
    interval: Duration,
) -> Result<ScanJob> {
    let mut interrupted = false;
    let mut last_progress = None;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                signal?;
                interrupted = true;
                info!(job_id = %job_id, "Interrupted, cancelling scan...");
                match manager.cancel_job(job_id).await {
                    Ok(()) | Err(Error::JobAlreadyFinished { .. }) => {}
                    Err(e) => return Err(e.into()),
                }
            }
            _ = tokio::time::sleep(interval) => {
                let job = manager.get_job(job_id).await?;
                if job.is_terminal() {
                    return Ok(job);
                }
                if last_progress != Some(job.progress) {
                    last_progress = Some(job.progress);
                    info!(job_id = %job_id, status = %job.status, progress = job.progress, "Scan progress");
                }
            }
        }
    }
}

fn write_report(job: &ScanJob, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(job)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
