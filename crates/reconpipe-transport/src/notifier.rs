//! Critical-finding webhook delivery

use crate::error::{check_status, TransportError};
use crate::http_client;
use reconpipe_common::config::ReportingConfig;
use reconpipe_core::{Finding, Severity};
use reconpipe_engine::CriticalAlert;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct AlertBody<'a> {
    event: &'static str,
    job_id: Uuid,
    target: &'a str,
    title: &'a str,
    severity: Severity,
    finding: &'a Finding,
}

/// Posts each critical finding to a webhook, one request per finding
pub struct WebhookNotifier {
    url: String,
    http: Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(TransportError::NotConfigured("webhook URL is empty".into()));
        }
        Ok(Self {
            url,
            http: http_client(timeout)?,
        })
    }

    /// `None` when no webhook is configured
    pub fn from_config(config: &ReportingConfig) -> Result<Option<Self>, TransportError> {
        config
            .critical_webhook_url
            .as_deref()
            .map(|url| Self::new(url, Duration::from_secs(config.request_timeout_seconds)))
            .transpose()
    }

    pub async fn deliver(&self, alert: &CriticalAlert) -> Result<(), TransportError> {
        let body = AlertBody {
            event: "critical_finding",
            job_id: alert.job_id,
            target: &alert.finding.target,
            title: &alert.finding.title,
            severity: alert.finding.severity,
            finding: &alert.finding,
        };
        let res = self.http.post(&self.url).json(&body).send().await?;
        check_status(res).await
    }

    /// Drain alerts until every sender is dropped; resolves to the number
    /// delivered. Failed deliveries are logged and dropped.
    pub fn spawn(self, mut rx: mpsc::UnboundedReceiver<CriticalAlert>) -> JoinHandle<usize> {
        tokio::spawn(async move {
            let mut delivered = 0usize;
            while let Some(alert) = rx.recv().await {
                match self.deliver(&alert).await {
                    Ok(()) => {
                        delivered += 1;
                        info!(
                            job_id = %alert.job_id,
                            target = %alert.finding.target,
                            "Critical finding alert sent"
                        );
                    }
                    Err(e) => warn!(
                        job_id = %alert.job_id,
                        finding_id = %alert.finding.id,
                        "Critical finding alert failed: {}",
                        e
                    ),
                }
            }
            delivered
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconpipe_core::SourceTool;
    use reconpipe_engine::{ChannelCriticalSink, CriticalFindingSink};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn critical(title: &str) -> Finding {
        Finding::builder(SourceTool::Nuclei, "example.com")
            .title(title)
            .severity(Severity::Critical)
            .build()
    }

    #[tokio::test]
    async fn test_drains_channel_until_closed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/critical"))
            .and(body_partial_json(json!({
                "event": "critical_finding",
                "target": "example.com",
                "severity": "critical"
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(2)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(
            format!("{}/hooks/critical", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap();
        let (sink, rx) = ChannelCriticalSink::channel();
        let handle = notifier.spawn(rx);

        let job_id = Uuid::new_v4();
        sink.on_critical_finding(job_id, &critical("Log4Shell"));
        sink.on_critical_finding(job_id, &critical("Spring4Shell"));
        drop(sink);

        assert_eq!(handle.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(server.uri(), Duration::from_secs(5)).unwrap();
        let (sink, rx) = ChannelCriticalSink::channel();
        let handle = notifier.spawn(rx);

        sink.on_critical_finding(Uuid::new_v4(), &critical("RCE"));
        drop(sink);
        assert_eq!(handle.await.unwrap(), 0);
    }

    #[test]
    fn test_from_config_without_url() {
        assert!(WebhookNotifier::from_config(&ReportingConfig::default())
            .unwrap()
            .is_none());
    }
}
