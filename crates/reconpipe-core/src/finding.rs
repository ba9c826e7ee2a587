//! Finding definitions - normalized vulnerabilities and observations

use crate::severity::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A normalized vulnerability or observation record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Unique finding ID
    pub id: Uuid,

    /// Finding details
    pub title: String,
    pub severity: Severity,
    /// CVSS score, 0.0 when the tool did not report one
    #[serde(default)]
    pub cvss_score: f32,
    pub description: String,
    pub evidence: Option<String>,

    /// Target information
    pub target: String,
    pub port: Option<u16>,

    /// Tool that produced the record
    pub source_tool: SourceTool,
    /// Tool-native identifier (e.g. a template id)
    pub template_id: Option<String>,
    /// Exact location the tool matched on
    pub matched_at: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,

    pub detected_at: DateTime<Utc>,
}

impl Finding {
    /// Create a new finding builder
    pub fn builder(source_tool: SourceTool, target: impl Into<String>) -> FindingBuilder {
        FindingBuilder::new(source_tool, target)
    }

    pub fn is_critical(&self) -> bool {
        self.severity.is_critical()
    }
}

/// Builder for constructing findings
pub struct FindingBuilder {
    finding: Finding,
}

impl FindingBuilder {
    pub fn new(source_tool: SourceTool, target: impl Into<String>) -> Self {
        Self {
            finding: Finding {
                id: Uuid::new_v4(),
                title: String::new(),
                severity: Severity::Info,
                cvss_score: 0.0,
                description: String::new(),
                evidence: None,
                target: target.into(),
                port: None,
                source_tool,
                template_id: None,
                matched_at: None,
                references: Vec::new(),
                detected_at: Utc::now(),
            },
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.finding.title = title.into();
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.finding.severity = severity;
        self
    }

    /// Set the CVSS score; `None` keeps the 0.0 default
    pub fn cvss(mut self, score: Option<f32>) -> Self {
        self.finding.cvss_score = score.unwrap_or(0.0);
        self
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.finding.description = desc.into();
        self
    }

    pub fn evidence(mut self, evidence: impl Into<String>) -> Self {
        let evidence = evidence.into();
        if !evidence.is_empty() {
            self.finding.evidence = Some(evidence);
        }
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.finding.port = Some(port);
        self
    }

    pub fn template_id(mut self, id: impl Into<String>) -> Self {
        self.finding.template_id = Some(id.into());
        self
    }

    pub fn matched_at(mut self, location: impl Into<String>) -> Self {
        self.finding.matched_at = Some(location.into());
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.finding.references.push(reference.into());
        self
    }

    pub fn references(mut self, references: impl IntoIterator<Item = String>) -> Self {
        self.finding.references.extend(references);
        self
    }

    pub fn build(self) -> Finding {
        self.finding
    }
}

/// External tool (or the pipeline itself) a finding originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTool {
    Ping,
    Nmap,
    Httpx,
    Whatweb,
    Nuclei,
    Wpscan,
    Bitrix,
    /// Synthetic records emitted by the pipeline
    Pipeline,
}

impl SourceTool {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTool::Ping => "ping",
            SourceTool::Nmap => "nmap",
            SourceTool::Httpx => "httpx",
            SourceTool::Whatweb => "whatweb",
            SourceTool::Nuclei => "nuclei",
            SourceTool::Wpscan => "wpscan",
            SourceTool::Bitrix => "bitrix",
            SourceTool::Pipeline => "pipeline",
        }
    }
}

impl std::fmt::Display for SourceTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finding_builder() {
        let finding = Finding::builder(SourceTool::Nuclei, "example.com")
            .title("Apache Log4j Remote Code Execution")
            .severity(Severity::Critical)
            .cvss(Some(10.0))
            .template_id("CVE-2021-44228")
            .matched_at("https://example.com/api")
            .reference("CVE-2021-44228")
            .build();

        assert_eq!(finding.severity, Severity::Critical);
        assert_eq!(finding.cvss_score, 10.0);
        assert_eq!(finding.references, vec!["CVE-2021-44228"]);
        assert!(finding.is_critical());
    }

    #[test]
    fn test_missing_cvss_defaults_to_zero() {
        let finding = Finding::builder(SourceTool::Nmap, "10.0.0.1")
            .title("Open port 22/tcp")
            .cvss(None)
            .evidence("")
            .build();

        assert_eq!(finding.cvss_score, 0.0);
        assert!(finding.evidence.is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Finding::builder(SourceTool::Nmap, "t").build();
        let b = Finding::builder(SourceTool::Nmap, "t").build();
        assert_ne!(a.id, b.id);
    }
}
