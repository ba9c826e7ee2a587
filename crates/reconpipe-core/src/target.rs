//! Scan target definitions

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// A target to scan
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum ScanTarget {
    /// Single IP address
    Ip(IpAddr),

    /// Hostname (e.g., "server.example.com")
    Hostname(String),

    /// URL of a web application; the host part is used for network stages
    Url(String),
}

impl ScanTarget {
    /// Parse a target from a string, auto-detecting the type
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        if s.is_empty() {
            return Err(Error::InvalidTarget("empty target".into()));
        }
        if s.chars().any(char::is_whitespace) {
            return Err(Error::InvalidTarget(format!("'{}' contains whitespace", s)));
        }

        // Check for URL
        if s.starts_with("http://") || s.starts_with("https://") {
            let target = ScanTarget::Url(s.to_string());
            let host = target.host();
            if host.is_empty() {
                return Err(Error::InvalidTarget(format!("'{}' has no host", s)));
            }
            if host.parse::<IpAddr>().is_err() {
                validate_hostname(&host)?;
            }
            return Ok(target);
        }

        // Ranges and CIDR blocks cannot be fed to the per-host web stages
        if s.contains('/') {
            return Err(Error::InvalidTarget(format!(
                "'{}' looks like a CIDR block; expand it into individual hosts",
                s
            )));
        }

        // Try to parse as IP address
        if let Ok(ip) = s.parse::<IpAddr>() {
            return Ok(ScanTarget::Ip(ip));
        }

        validate_hostname(s)?;
        Ok(ScanTarget::Hostname(s.to_string()))
    }

    /// Bare host for network tools (no scheme, path or port)
    pub fn host(&self) -> String {
        match self {
            ScanTarget::Ip(ip) => ip.to_string(),
            ScanTarget::Hostname(host) => host.clone(),
            ScanTarget::Url(url) => {
                let rest = url
                    .trim_start_matches("https://")
                    .trim_start_matches("http://");
                let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
                let authority = authority.rsplit('@').next().unwrap_or_default();

                if let Some(v6) = authority.strip_prefix('[') {
                    return v6.split(']').next().unwrap_or_default().to_string();
                }
                authority.split(':').next().unwrap_or_default().to_string()
            }
        }
    }

    /// Host formatted for use inside a URL (IPv6 literals are bracketed)
    pub fn url_host(&self) -> String {
        let host = self.host();
        match host.parse::<IpAddr>() {
            Ok(IpAddr::V6(_)) => format!("[{}]", host),
            _ => host,
        }
    }

    /// Build a probe URL for the given scheme and port
    pub fn url_for(&self, scheme: &str, port: u16) -> String {
        format!("{}://{}:{}", scheme, self.url_host(), port)
    }

    /// The URL the target was submitted as, if any
    pub fn explicit_url(&self) -> Option<&str> {
        match self {
            ScanTarget::Url(url) => Some(url.as_str()),
            _ => None,
        }
    }

    /// Get a display string for the target
    pub fn display(&self) -> String {
        match self {
            ScanTarget::Ip(ip) => ip.to_string(),
            ScanTarget::Hostname(host) => host.clone(),
            ScanTarget::Url(url) => url.clone(),
        }
    }
}

impl std::fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// DNS name syntax: dot-separated labels of ASCII letters, digits and '-',
/// 1 to 63 bytes each, never starting or ending with '-'; 253 bytes overall.
/// Keeps option-like strings out of tool command lines.
fn validate_hostname(host: &str) -> Result<()> {
    let name = host.strip_suffix('.').unwrap_or(host);
    let invalid = |why: &str| Err(Error::InvalidTarget(format!("'{}' {}", host, why)));

    if name.is_empty() || name.len() > 253 {
        return invalid("is not a valid hostname length");
    }
    for label in name.split('.') {
        if label.is_empty() || label.len() > 63 {
            return invalid("has an empty or oversized label");
        }
        if label.starts_with('-') || label.ends_with('-') {
            return invalid("has a label starting or ending with '-'");
        }
        if !label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            return invalid("contains characters not allowed in a hostname");
        }
    }
    Ok(())
}

/// Parse a target list with one target per line.
///
/// Blank lines and lines starting with `#` are ignored.
pub fn parse_target_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
