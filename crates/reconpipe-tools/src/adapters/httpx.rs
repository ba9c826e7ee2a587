//! Web-service discovery via httpx

use super::ToolCommand;
use crate::invocation::{AdapterRun, Invocation, Invoker};
use crate::normalize::Normalizer;
use regex::Regex;
use reconpipe_common::ToolConfig;
use reconpipe_core::{Result, ScanTarget, WebService};
use std::collections::BTreeSet;
use std::sync::OnceLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const DEFAULT_BINARY: &str = "httpx";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Ports always probed for web services, whatever discovery found
pub const DEFAULT_WEB_PORTS: [u16; 4] = [80, 443, 8080, 8443];

/// Probes candidate URLs and reports the live ones
#[derive(Debug, Clone)]
pub struct HttpxAdapter {
    command: ToolCommand,
}

impl HttpxAdapter {
    pub fn from_config(config: &ToolConfig) -> Self {
        Self {
            command: ToolCommand::from_config(config, DEFAULT_BINARY, DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.command.timeout
    }

    pub fn argv(&self, urls: &[String]) -> Vec<String> {
        self.command.argv(
            [
                "-u".to_string(),
                urls.join(","),
                "-silent".into(),
                "-status-code".into(),
                "-title".into(),
                "-no-color".into(),
                "-timeout".into(),
                "10".into(),
            ],
            std::iter::empty::<String>(),
        )
    }

    pub async fn run(
        &self,
        invoker: &Invoker,
        normalizer: &Normalizer,
        urls: &[String],
        cancel: &CancellationToken,
    ) -> Result<AdapterRun<Vec<WebService>>> {
        let output = match invoker
            .invoke(self.argv(urls), self.command.timeout, cancel)
            .await?
        {
            Invocation::Exited(output) => output,
            Invocation::Failed { status, error } => return Ok(AdapterRun::failed(status, error)),
        };

        if !output.success() {
            return Ok(invoker.exit_failure(&output));
        }

        let services = parse_httpx_output(&output.stdout);
        debug!(probed = urls.len(), live = services.len(), "Web discovery finished");

        let findings = services.iter().map(|s| normalizer.web_service(s)).collect();
        Ok(AdapterRun::completed(
            services,
            findings,
            invoker.truncate(output.stdout.trim()),
        ))
    }
}

/// Candidate URLs for a target: the submitted URL (if any) followed by both
/// schemes on every probe port
pub fn probe_urls(target: &ScanTarget, ports: &BTreeSet<u16>) -> Vec<String> {
    let mut urls = Vec::new();
    if let Some(url) = target.explicit_url() {
        urls.push(url.to_string());
    }
    for port in ports {
        for scheme in ["http", "https"] {
            let url = target.url_for(scheme, *port);
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }
    urls
}

/// Parse `<url> [status] [title]` lines; anything not starting with a URL is ignored
pub fn parse_httpx_output(stdout: &str) -> Vec<WebService> {
    static LINE: OnceLock<Regex> = OnceLock::new();
    let re = LINE.get_or_init(|| {
        Regex::new(r"^(https?://\S+)(?:\s+\[(\d{3})\])?(?:\s+\[([^\]]*)\])?")
            .expect("valid httpx line pattern")
    });

    let mut services: Vec<WebService> = Vec::new();
    for line in stdout.lines().map(str::trim) {
        let Some(caps) = re.captures(line) else {
            continue;
        };
        let url = caps[1].to_string();
        if services.iter().any(|s| s.url == url) {
            continue;
        }
        services.push(WebService {
            url,
            status_code: caps.get(2).and_then(|m| m.as_str().parse().ok()),
            title: caps
                .get(3)
                .map(|m| m.as_str().trim().to_string())
                .filter(|t| !t.is_empty()),
            details: line.to_string(),
        });
    }
    services
}
