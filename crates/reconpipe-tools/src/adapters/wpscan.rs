//! WordPress scanning via wpscan's JSON report

use super::{SpecializedScanner, ToolCommand};
use crate::invocation::{AdapterRun, Invocation, Invoker, ToolStatus};
use crate::normalize::Normalizer;
use async_trait::async_trait;
use reconpipe_common::config::WpscanConfig;
use reconpipe_core::{Error, Finding, Result, SourceTool};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_BINARY: &str = "wpscan";
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// wpscan exits 5 when it reports vulnerabilities
const EXIT_VULNERABLE: i32 = 5;

#[derive(Debug, Clone)]
pub struct WpscanScanner {
    command: ToolCommand,
    api_token: Option<String>,
}

impl WpscanScanner {
    pub fn from_config(config: &WpscanConfig) -> Self {
        Self {
            command: ToolCommand::from_config(&config.tool, DEFAULT_BINARY, DEFAULT_TIMEOUT_SECS),
            api_token: config.api_token.clone(),
        }
    }

    pub fn argv(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "--url".to_string(),
            url.to_string(),
            "-e".into(),
            "vp".into(),
            "--format".into(),
            "json".into(),
            "--no-banner".into(),
        ];
        if let Some(token) = &self.api_token {
            args.push("--api-token".into());
            args.push(token.clone());
        }
        self.command.argv(args, std::iter::empty::<String>())
    }
}

#[async_trait]
impl SpecializedScanner for WpscanScanner {
    fn signature(&self) -> &str {
        "wordpress"
    }

    fn timeout(&self) -> Duration {
        self.command.timeout
    }

    fn tool(&self) -> SourceTool {
        SourceTool::Wpscan
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

        if !matches!(output.exit_code, Some(0) | Some(EXIT_VULNERABLE)) {
            return Ok(invoker.exit_failure(&output));
        }

        match parse_wpscan_report(&output.stdout, url, normalizer) {
            Ok(findings) => Ok(AdapterRun::completed(
                (),
                findings,
                invoker.truncate(output.stdout.trim()),
            )),
            Err(e) => Ok(AdapterRun::failed(ToolStatus::Error, e.to_string())),
        }
    }
}

/// Vulnerabilities (core, main theme, plugins, themes) become medium findings;
/// interesting findings become informational ones.
pub fn parse_wpscan_report(stdout: &str, url: &str, normalizer: &Normalizer) -> Result<Vec<Finding>> {
    let report: Value = serde_json::from_str(stdout.trim()).map_err(|e| Error::Parse {
        tool: "wpscan".into(),
        message: e.to_string(),
    })?;

    let mut findings = Vec::new();

    if let Some(items) = report.get("interesting_findings").and_then(Value::as_array) {
        for item in items {
            let Some(title) = item.get("to_s").and_then(Value::as_str) else {
                continue;
            };
            let location = item.get("url").and_then(Value::as_str).unwrap_or(url);
            let kind = item.get("type").and_then(Value::as_str).unwrap_or("finding");
            findings.push(normalizer.advisory(
                SourceTool::Wpscan,
                title,
                location,
                &format!("WordPress {} reported by wpscan", kind.replace('_', " ")),
            ));
        }
    }

    let mut sections: Vec<&Value> = Vec::new();
    sections.extend(report.get("version"));
    sections.extend(report.get("main_theme"));
    for key in ["plugins", "themes"] {
        if let Some(map) = report.get(key).and_then(Value::as_object) {
            sections.extend(map.values());
        }
    }

    for section in sections {
        let Some(vulns) = section.get("vulnerabilities").and_then(Value::as_array) else {
            continue;
        };
        for vuln in vulns {
            let Some(title) = vuln.get("title").and_then(Value::as_str) else {
                continue;
            };
            findings.push(normalizer.cms_vulnerability(
                SourceTool::Wpscan,
                title,
                url,
                references(vuln),
            ));
        }
    }

    Ok(findings)
}

fn references(vuln: &Value) -> Vec<String> {
    let Some(refs) = vuln.get("references") else {
        return Vec::new();
    };
    let list = |key: &str| -> Vec<String> {
        refs.get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    };

    let mut out: Vec<String> = list("cve")
        .into_iter()
        .map(|id| {
            if id.to_ascii_uppercase().starts_with("CVE-") {
                id.to_ascii_uppercase()
            } else {
                format!("CVE-{}", id)
            }
        })
        .collect();
    out.extend(list("url"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconpipe_core::Severity;

    const REPORT: &str = r#"{
      "target_url": "https://blog.example.com/",
      "interesting_findings": [
        {"url": "https://blog.example.com/xmlrpc.php", "to_s": "XML-RPC seems to be enabled: https://blog.example.com/xmlrpc.php", "type": "xmlrpc"}
      ],
      "version": {
        "number": "5.8.1",
        "vulnerabilities": [
          {"title": "WordPress < 5.8.2 - Expired DST Root CA X3 Certificate", "references": {"url": ["https://wordpress.org/news/2021/11/"], "cve": []}}
        ]
      },
      "main_theme": {"slug": "twentytwentyone", "vulnerabilities": []},
      "plugins": {
        "contact-form-7": {
          "vulnerabilities": [
            {"title": "Contact Form 7 < 5.3.2 - Unrestricted File Upload", "references": {"cve": ["2020-35489"]}}
          ]
        }
      }
    }"#;

    #[test]
    fn test_report_findings() {
        let findings =
            parse_wpscan_report(REPORT, "https://blog.example.com/", &Normalizer::new("blog.example.com"))
                .unwrap();
        assert_eq!(findings.len(), 3);

        assert_eq!(findings[0].severity, Severity::Info);
        assert_eq!(
            findings[0].matched_at.as_deref(),
            Some("https://blog.example.com/xmlrpc.php")
        );

        let plugin = findings
            .iter()
            .find(|f| f.title.starts_with("Contact Form 7"))
            .unwrap();
        assert_eq!(plugin.severity, Severity::Medium);
        assert_eq!(plugin.references, vec!["CVE-2020-35489"]);
        assert!(findings.iter().all(|f| f.source_tool == SourceTool::Wpscan));
    }

    #[test]
    fn test_invalid_report_is_parse_error() {
        let err = parse_wpscan_report("Scan Aborted: not WordPress", "u", &Normalizer::new("t"))
            .unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_api_token_passed() {
        let config = WpscanConfig {
            api_token: Some("tok".into()),
            ..Default::default()
        };
        let argv = WpscanScanner::from_config(&config).argv("https://blog.example.com/");
        assert!(argv.windows(2).any(|w| w == ["--api-token", "tok"]));
        assert!(argv.windows(2).any(|w| w == ["--url", "https://blog.example.com/"]));
    }
}
