//! Progress reporting over HTTP
//!
//! Endpoint used:
//! - POST   /api/scans/:id/update   - job status, progress and running counts

use crate::error::{check_status, TransportError};
use crate::http_client;
use async_trait::async_trait;
use reconpipe_common::config::ReportingConfig;
use reconpipe_core::{Finding, JobStatus, VulnerabilityCounts};
use reconpipe_engine::{ProgressReporter, ProgressUpdate};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Request body for POST /api/scans/:id/update
#[derive(Debug, Serialize)]
struct UpdateBody<'a> {
    status: JobStatus,
    progress: u8,
    vulnerabilities: &'a VulnerabilityCounts,
    tools_used: &'a [String],
    findings: &'a [Finding],
}

/// Posts every progress snapshot to the scan service
pub struct HttpProgressReporter {
    base_url: String,
    http: Client,
}

impl HttpProgressReporter {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let base_url = base_url.into();
        if base_url.trim().is_empty() {
            return Err(TransportError::NotConfigured("progress URL is empty".into()));
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: http_client(timeout)?,
        })
    }

    /// `None` when no progress URL is configured
    pub fn from_config(config: &ReportingConfig) -> Result<Option<Self>, TransportError> {
        config
            .progress_url
            .as_deref()
            .map(|url| Self::new(url, Duration::from_secs(config.request_timeout_seconds)))
            .transpose()
    }

    fn update_url(&self, job_id: Uuid) -> String {
        format!("{}/api/scans/{}/update", self.base_url, job_id)
    }

    pub async fn send(&self, update: &ProgressUpdate) -> Result<(), TransportError> {
        let body = UpdateBody {
            status: update.status,
            progress: update.progress,
            vulnerabilities: &update.vulnerabilities,
            tools_used: &update.tools_used,
            findings: &update.findings,
        };

        let res = self
            .http
            .post(self.update_url(update.job_id))
            .json(&body)
            .send()
            .await?;
        check_status(res).await?;

        debug!(
            job_id = %update.job_id,
            status = %update.status,
            progress = update.progress,
            "Progress update delivered"
        );
        Ok(())
    }
}

#[async_trait]
impl ProgressReporter for HttpProgressReporter {
    async fn report(&self, update: ProgressUpdate) -> reconpipe_core::Result<()> {
        self.send(&update).await.map_err(Into::into)
    }
}
