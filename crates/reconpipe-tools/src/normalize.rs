//! Finding normalization for heterogeneous tool output

use regex::Regex;
use reconpipe_core::{Finding, OpenPort, Severity, SourceTool, StageKind, WebService};
use std::sync::OnceLock;

/// A template-engine match in tool-neutral form
#[derive(Debug, Clone, Default)]
pub struct TemplateMatch {
    pub template_id: String,
    pub name: Option<String>,
    /// Raw severity label as the tool reported it
    pub severity: Option<String>,
    pub description: Option<String>,
    pub matched_at: Option<String>,
    pub cvss_score: Option<f32>,
    pub cve_ids: Vec<String>,
    pub references: Vec<String>,
    pub evidence: Vec<String>,
}

/// Builds canonical findings for one target
#[derive(Debug, Clone)]
pub struct Normalizer {
    target: String,
}

impl Normalizer {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Severity through the fixed vocabulary
    pub fn severity(label: Option<&str>) -> Severity {
        Severity::from_label(label)
    }

    pub fn open_port(&self, port: &OpenPort) -> Finding {
        let service = port.service.as_deref().unwrap_or("unknown");
        let mut evidence = service.to_string();
        if let Some(product) = &port.product {
            evidence = format!("{} {}", evidence, product);
        }
        if let Some(version) = &port.version {
            evidence = format!("{} {}", evidence, version);
        }

        Finding::builder(SourceTool::Nmap, &self.target)
            .title(format!("Open port {}/{} ({})", port.port, port.protocol, service))
            .severity(Severity::Info)
            .description(format!(
                "Port {}/{} is open and runs {}",
                port.port, port.protocol, service
            ))
            .evidence(evidence)
            .port(port.port)
            .build()
    }

    pub fn web_service(&self, service: &WebService) -> Finding {
        let mut description = format!("Web service reachable at {}", service.url);
        if let Some(code) = service.status_code {
            description.push_str(&format!(" (HTTP {})", code));
        }

        let mut builder = Finding::builder(SourceTool::Httpx, &self.target)
            .title(match &service.title {
                Some(title) => format!("Web service: {}", title),
                None => format!("Web service: {}", service.url),
            })
            .severity(Severity::Info)
            .description(description)
            .evidence(service.details.clone())
            .matched_at(service.url.clone());
        if let Some(port) = port_of(&service.url) {
            builder = builder.port(port);
        }
        builder.build()
    }

    pub fn template_match(&self, record: TemplateMatch) -> Finding {
        let severity = Self::severity(record.severity.as_deref());
        let title = record
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| record.template_id.clone());

        let mut references: Vec<String> = record
            .cve_ids
            .into_iter()
            .map(|id| id.to_ascii_uppercase())
            .collect();
        references.extend(record.references);

        let mut builder = Finding::builder(SourceTool::Nuclei, &self.target)
            .title(title)
            .severity(severity)
            .cvss(record.cvss_score)
            .description(record.description.unwrap_or_default())
            .evidence(record.evidence.join("\n"))
            .template_id(record.template_id)
            .references(references);
        if let Some(location) = record.matched_at {
            if let Some(port) = port_of(&location) {
                builder = builder.port(port);
            }
            builder = builder.matched_at(location);
        }
        builder.build()
    }

    /// A vulnerability reported by a CMS scanner
    pub fn cms_vulnerability(
        &self,
        tool: SourceTool,
        title: &str,
        url: &str,
        references: Vec<String>,
    ) -> Finding {
        let mut references = references;
        for cve in Self::extract_cve_ids(title) {
            if !references.contains(&cve) {
                references.push(cve);
            }
        }

        Finding::builder(tool, &self.target)
            .title(title)
            .severity(Severity::Medium)
            .description(format!("{} reported a known vulnerability on {}", tool, url))
            .matched_at(url)
            .references(references)
            .build()
    }

    /// Informational text emitted by free-text tools
    pub fn advisory(&self, tool: SourceTool, title: &str, url: &str, detail: &str) -> Finding {
        Finding::builder(tool, &self.target)
            .title(title)
            .severity(Severity::Info)
            .description(detail)
            .matched_at(url)
            .references(Self::extract_cve_ids(detail))
            .build()
    }

    /// Marks a target whose last executed stage ran cleanly and found nothing
    pub fn reconnaissance_completed(&self, stage: StageKind) -> Finding {
        Finding::builder(SourceTool::Pipeline, &self.target)
            .title("Reconnaissance completed")
            .severity(Severity::Info)
            .description(format!(
                "All requested stages ran; the final stage ({}) reported no findings",
                stage
            ))
            .build()
    }

    /// Extract CVE IDs from text
    pub fn extract_cve_ids(text: &str) -> Vec<String> {
        static CVE: OnceLock<Regex> = OnceLock::new();
        let re = CVE.get_or_init(|| Regex::new(r"(?i)CVE-\d{4}-\d{4,}").expect("valid CVE pattern"));
        re.find_iter(text)
            .map(|m| m.as_str().to_ascii_uppercase())
            .collect()
    }
}

/// Explicit or scheme-implied port of a URL
fn port_of(url: &str) -> Option<u16> {
    let (scheme, rest) = url.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit('@').next()?;
    let port = match host_port.rfind(']') {
        Some(end) => host_port[end + 1..].strip_prefix(':'),
        None => host_port.split_once(':').map(|(_, p)| p),
    };

    match port {
        Some(p) => p.parse().ok(),
        None => match scheme.to_ascii_lowercase().as_str() {
            "http" => Some(80),
            "https" => Some(443),
            _ => None,
        },
    }
}
