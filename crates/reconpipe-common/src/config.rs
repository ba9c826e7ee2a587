//! Configuration management for reconpipe components

use reconpipe_core::{Error, Result, ScanProfile};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Scheduling and output settings
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Per-tool binaries, timeouts and arguments
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Progress and critical-finding delivery
    #[serde(default)]
    pub reporting: ReportingConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.scanner.max_concurrent_scans == 0 {
            return Err(Error::InvalidConfig {
                key: "scanner.max_concurrent_scans".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.scanner.max_concurrent_targets == 0 {
            return Err(Error::InvalidConfig {
                key: "scanner.max_concurrent_targets".into(),
                message: "must be at least 1".into(),
            });
        }
        for (name, tool) in self.tools.iter() {
            if tool.timeout_seconds == Some(0) {
                return Err(Error::InvalidConfig {
                    key: format!("tools.{}.timeout_seconds", name),
                    message: "must be greater than zero".into(),
                });
            }
        }
        Ok(())
    }

    /// Merge with environment variables (RECONPIPE_ prefix)
    pub fn merge_env(self) -> Self {
        self.merge_env_from(|key| std::env::var(key).ok())
    }

    /// Merge overrides from an arbitrary variable source
    pub fn merge_env_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        // Scanner settings
        if let Some(n) = lookup("RECONPIPE_MAX_CONCURRENT_SCANS").and_then(|v| v.parse().ok()) {
            self.scanner.max_concurrent_scans = n;
        }
        if let Some(n) = lookup("RECONPIPE_MAX_CONCURRENT_TARGETS").and_then(|v| v.parse().ok()) {
            self.scanner.max_concurrent_targets = n;
        }
        if let Some(profile) = lookup("RECONPIPE_SCAN_PROFILE").and_then(|v| v.parse().ok()) {
            self.scanner.profile = profile;
        }

        // Tools
        if let Some(val) = lookup("RECONPIPE_NUCLEI_TEMPLATES") {
            self.tools.nuclei.templates_dir = Some(val);
        }
        if let Some(val) = lookup("RECONPIPE_WPSCAN_API_TOKEN") {
            self.tools.wpscan.api_token = Some(val);
        }

        // Reporting
        if let Some(val) = lookup("RECONPIPE_PROGRESS_URL") {
            self.reporting.progress_url = Some(val);
        }
        if let Some(val) = lookup("RECONPIPE_CRITICAL_WEBHOOK_URL") {
            self.reporting.critical_webhook_url = Some(val);
        }

        // Logging
        if let Some(val) = lookup("RECONPIPE_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = lookup("RECONPIPE_LOG_FORMAT") {
            self.logging.format = val;
        }

        self
    }
}

/// Scanner-wide scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Jobs allowed to run at the same time
    #[serde(default = "default_max_scans")]
    pub max_concurrent_scans: usize,

    /// Targets of one job processed at the same time (1 = sequential)
    #[serde(default = "default_max_targets")]
    pub max_concurrent_targets: usize,

    /// Byte budget for raw output and stderr kept on stage outcomes
    #[serde(default = "default_truncate")]
    pub output_truncate_bytes: usize,

    /// Scan depth for jobs submitted without an explicit profile
    #[serde(default)]
    pub profile: ScanProfile,
}

fn default_max_scans() -> usize {
    5
}

fn default_max_targets() -> usize {
    1
}

fn default_truncate() -> usize {
    500
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_scans: default_max_scans(),
            max_concurrent_targets: default_max_targets(),
            output_truncate_bytes: default_truncate(),
            profile: ScanProfile::default(),
        }
    }
}

/// Overrides for one external tool. Unset fields fall back to the adapter's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Binary name or absolute path
    pub binary: Option<String>,

    /// Hard ceiling for one invocation
    pub timeout_seconds: Option<u64>,

    /// Appended after the built-in arguments, before the target
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl ToolConfig {
    pub fn binary_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.binary.as_deref().unwrap_or(default)
    }

    pub fn timeout_or(&self, default_seconds: u64) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or(default_seconds))
    }
}

/// Template scanner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NucleiConfig {
    #[serde(flatten)]
    pub tool: ToolConfig,

    /// Custom template directory passed with `-t`
    pub templates_dir: Option<String>,

    /// Severities requested from the engine
    #[serde(default = "default_nuclei_severity")]
    pub severity: Vec<String>,

    /// Requests per second
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
}

fn default_nuclei_severity() -> Vec<String> {
    vec!["critical".into(), "high".into(), "medium".into()]
}

fn default_rate_limit() -> u32 {
    10
}

impl Default for NucleiConfig {
    fn default() -> Self {
        Self {
            tool: ToolConfig::default(),
            templates_dir: None,
            severity: default_nuclei_severity(),
            rate_limit: default_rate_limit(),
        }
    }
}

/// WordPress scanner settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WpscanConfig {
    #[serde(flatten)]
    pub tool: ToolConfig,

    /// Vulnerability database token
    pub api_token: Option<String>,
}

/// All tool sections
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub ping: ToolConfig,
    #[serde(default)]
    pub nmap: ToolConfig,
    #[serde(default)]
    pub httpx: ToolConfig,
    #[serde(default)]
    pub whatweb: ToolConfig,
    #[serde(default)]
    pub nuclei: NucleiConfig,
    #[serde(default)]
    pub wpscan: WpscanConfig,
    #[serde(default)]
    pub bitrix: ToolConfig,
}

impl ToolsConfig {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ToolConfig)> {
        [
            ("ping", &self.ping),
            ("nmap", &self.nmap),
            ("httpx", &self.httpx),
            ("whatweb", &self.whatweb),
            ("nuclei", &self.nuclei.tool),
            ("wpscan", &self.wpscan.tool),
            ("bitrix", &self.bitrix),
        ]
        .into_iter()
    }
}

/// Progress and notification delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// Base URL of the service receiving `/api/scans/{id}/update`
    pub progress_url: Option<String>,

    /// Endpoint receiving one POST per critical finding
    pub critical_webhook_url: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            progress_url: None,
            critical_webhook_url: None,
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    String::from("info")
}

fn default_log_format() -> String {
    String::from("pretty")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Builder for constructing Config
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn max_concurrent_scans(mut self, n: usize) -> Self {
        self.config.scanner.max_concurrent_scans = n;
        self
    }

    pub fn max_concurrent_targets(mut self, n: usize) -> Self {
        self.config.scanner.max_concurrent_targets = n;
        self
    }

    pub fn output_truncate_bytes(mut self, n: usize) -> Self {
        self.config.scanner.output_truncate_bytes = n;
        self
    }

    pub fn progress_url(mut self, url: impl Into<String>) -> Self {
        self.config.reporting.progress_url = Some(url.into());
        self
    }

    pub fn critical_webhook_url(mut self, url: impl Into<String>) -> Self {
        self.config.reporting.critical_webhook_url = Some(url.into());
        self
    }

    pub fn nuclei_templates(mut self, dir: impl Into<String>) -> Self {
        self.config.tools.nuclei.templates_dir = Some(dir.into());
        self
    }

    pub fn wpscan_api_token(mut self, token: impl Into<String>) -> Self {
        self.config.tools.wpscan.api_token = Some(token.into());
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn profile(mut self, profile: ScanProfile) -> Self {
        self.config.scanner.profile = profile;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            [scanner]
            max_concurrent_scans = 2
            max_concurrent_targets = 4
            profile = "quick"

            [tools.nmap]
            binary = "/usr/local/bin/nmap"
            timeout_seconds = 60
            extra_args = ["--reason"]

            [tools.nuclei]
            templates_dir = "/opt/nuclei-templates"
            severity = ["critical"]

            [tools.wpscan]
            api_token = "wp-token"

            [reporting]
            progress_url = "http://backend:8000"

            [logging]
            level = "debug"
            format = "json"
        "#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.scanner.max_concurrent_scans, 2);
        assert_eq!(config.scanner.max_concurrent_targets, 4);
        assert_eq!(config.scanner.output_truncate_bytes, 500);
        assert_eq!(config.scanner.profile, ScanProfile::Quick);
        assert_eq!(config.tools.nmap.binary_or("nmap"), "/usr/local/bin/nmap");
        assert_eq!(config.tools.nmap.timeout_or(180), Duration::from_secs(60));
        assert_eq!(config.tools.nmap.extra_args, vec!["--reason"]);
        assert_eq!(config.tools.httpx.binary_or("httpx"), "httpx");
        assert_eq!(
            config.tools.nuclei.templates_dir.as_deref(),
            Some("/opt/nuclei-templates")
        );
        assert_eq!(config.tools.nuclei.severity, vec!["critical"]);
        assert_eq!(config.tools.nuclei.rate_limit, 10);
        assert_eq!(config.tools.wpscan.api_token.as_deref(), Some("wp-token"));
        assert_eq!(
            config.reporting.progress_url.as_deref(),
            Some("http://backend:8000")
        );
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.scanner.max_concurrent_scans, 5);
        assert_eq!(config.scanner.max_concurrent_targets, 1);
        assert_eq!(config.tools.ping.timeout_or(10), Duration::from_secs(10));
        assert_eq!(
            config.tools.nuclei.severity,
            vec!["critical", "high", "medium"]
        );
        assert!(config.reporting.critical_webhook_url.is_none());
    }

    #[test]
    fn test_rejects_zero_bounds() {
        let err = Config::from_toml("[scanner]\nmax_concurrent_scans = 0\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));

        let err = Config::from_toml("[tools.nmap]\ntimeout_seconds = 0\n").unwrap_err();
        match err {
            Error::InvalidConfig { key, .. } => assert_eq!(key, "tools.nmap.timeout_seconds"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("RECONPIPE_MAX_CONCURRENT_SCANS", "8"),
            ("RECONPIPE_MAX_CONCURRENT_TARGETS", "not-a-number"),
            ("RECONPIPE_WPSCAN_API_TOKEN", "from-env"),
            ("RECONPIPE_LOG_FORMAT", "compact"),
            ("RECONPIPE_SCAN_PROFILE", "quick"),
        ]
        .into_iter()
        .collect();

        let config = Config::default().merge_env_from(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.scanner.max_concurrent_scans, 8);
        assert_eq!(config.scanner.max_concurrent_targets, 1);
        assert_eq!(config.tools.wpscan.api_token.as_deref(), Some("from-env"));
        assert_eq!(config.logging.format, "compact");
        assert_eq!(config.scanner.profile, ScanProfile::Quick);
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder()
            .max_concurrent_scans(3)
            .progress_url("http://localhost:8000")
            .critical_webhook_url("http://localhost:9000/alerts")
            .log_level("warn")
            .build();

        assert_eq!(config.scanner.max_concurrent_scans, 3);
        assert_eq!(
            config.reporting.critical_webhook_url.as_deref(),
            Some("http://localhost:9000/alerts")
        );
        assert_eq!(config.logging.level, "warn");
        assert!(config.validate().is_ok());
    }
}
