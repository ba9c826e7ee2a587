//! Requestable scan modules and the fixed stage sequence

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// A module a caller can request for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanModule {
    /// ICMP liveness probe
    Ping,
    /// Port and service discovery
    Ports,
    /// Web-service discovery
    Web,
    /// Technology fingerprinting
    Tech,
    /// Vulnerability template scanning
    Vulns,
    /// CMS-specific scanners dispatched from fingerprints
    Cms,
}

impl ScanModule {
    pub const ALL: [ScanModule; 6] = [
        ScanModule::Ping,
        ScanModule::Ports,
        ScanModule::Web,
        ScanModule::Tech,
        ScanModule::Vulns,
        ScanModule::Cms,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanModule::Ping => "ping",
            ScanModule::Ports => "ports",
            ScanModule::Web => "web",
            ScanModule::Tech => "tech",
            ScanModule::Vulns => "vulns",
            ScanModule::Cms => "cms",
        }
    }
}

impl FromStr for ScanModule {
    type Err = Error;

    /// Accepts module names and the names of the tools behind them
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ping" | "liveness" => Ok(ScanModule::Ping),
            "ports" | "nmap" => Ok(ScanModule::Ports),
            "web" | "httpx" => Ok(ScanModule::Web),
            "tech" | "whatweb" => Ok(ScanModule::Tech),
            "vulns" | "nuclei" => Ok(ScanModule::Vulns),
            "cms" | "specialized" => Ok(ScanModule::Cms),
            other => Err(Error::UnknownModule(other.to_string())),
        }
    }
}

impl std::fmt::Display for ScanModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The set of modules requested for a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleSet(BTreeSet<ScanModule>);

impl ModuleSet {
    /// Every module
    pub fn all() -> Self {
        Self(ScanModule::ALL.into_iter().collect())
    }

    /// Parse module names; an empty input selects every module
    pub fn parse<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let modules = names
            .into_iter()
            .filter(|name| !name.as_ref().trim().is_empty())
            .map(|name| name.as_ref().parse())
            .collect::<Result<BTreeSet<ScanModule>>>()?;

        if modules.is_empty() {
            Ok(Self::all())
        } else {
            Ok(Self(modules))
        }
    }

    pub fn contains(&self, module: ScanModule) -> bool {
        self.0.contains(&module)
    }

    pub fn iter(&self) -> impl Iterator<Item = ScanModule> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<ScanModule> for ModuleSet {
    fn from_iter<T: IntoIterator<Item = ScanModule>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Depth of the port and template scans.
///
/// `quick` trades coverage for speed: nmap probes only its fast port list
/// without version detection and nuclei runs CVE templates only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanProfile {
    Quick,
    #[default]
    Full,
}

impl ScanProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanProfile::Quick => "quick",
            ScanProfile::Full => "full",
        }
    }
}

impl FromStr for ScanProfile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quick" | "fast" => Ok(ScanProfile::Quick),
            "full" => Ok(ScanProfile::Full),
            other => Err(Error::Configuration(format!("unknown scan profile '{}'", other))),
        }
    }
}

impl std::fmt::Display for ScanProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One discrete phase of the per-target pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Liveness,
    PortDiscovery,
    WebDiscovery,
    TechFingerprint,
    VulnScan,
    Specialized,
}

impl StageKind {
    /// Stages in rank order
    pub const ALL: [StageKind; 6] = [
        StageKind::Liveness,
        StageKind::PortDiscovery,
        StageKind::WebDiscovery,
        StageKind::TechFingerprint,
        StageKind::VulnScan,
        StageKind::Specialized,
    ];

    /// Position in the sequence, starting at 1
    pub fn rank(&self) -> u8 {
        match self {
            StageKind::Liveness => 1,
            StageKind::PortDiscovery => 2,
            StageKind::WebDiscovery => 3,
            StageKind::TechFingerprint => 4,
            StageKind::VulnScan => 5,
            StageKind::Specialized => 6,
        }
    }

    /// Module that must be requested for this stage to run
    pub fn module(&self) -> ScanModule {
        match self {
            StageKind::Liveness => ScanModule::Ping,
            StageKind::PortDiscovery => ScanModule::Ports,
            StageKind::WebDiscovery => ScanModule::Web,
            StageKind::TechFingerprint => ScanModule::Tech,
            StageKind::VulnScan => ScanModule::Vulns,
            StageKind::Specialized => ScanModule::Cms,
        }
    }

    /// Stage whose artifacts gate this one. Liveness gates nothing and
    /// needs nothing.
    pub fn predecessor(&self) -> Option<StageKind> {
        match self {
            StageKind::Liveness | StageKind::PortDiscovery => None,
            StageKind::WebDiscovery => Some(StageKind::PortDiscovery),
            StageKind::TechFingerprint => Some(StageKind::WebDiscovery),
            StageKind::VulnScan => Some(StageKind::TechFingerprint),
            StageKind::Specialized => Some(StageKind::TechFingerprint),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Liveness => "liveness",
            StageKind::PortDiscovery => "port_discovery",
            StageKind::WebDiscovery => "web_discovery",
            StageKind::TechFingerprint => "tech_fingerprint",
            StageKind::VulnScan => "vuln_scan",
            StageKind::Specialized => "specialized",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_aliases() {
        assert_eq!("nmap".parse::<ScanModule>().unwrap(), ScanModule::Ports);
        assert_eq!("HTTPX".parse::<ScanModule>().unwrap(), ScanModule::Web);
        assert_eq!("whatweb".parse::<ScanModule>().unwrap(), ScanModule::Tech);
        assert_eq!(" nuclei ".parse::<ScanModule>().unwrap(), ScanModule::Vulns);
        assert!("sqlmap".parse::<ScanModule>().is_err());
    }

    #[test]
    fn test_module_set_parse() {
        let set = ModuleSet::parse(["ports", "web", "vulns"]).unwrap();
        assert_eq!(set.len(), 3);
        assert!(set.contains(ScanModule::Web));
        assert!(!set.contains(ScanModule::Tech));

        let all = ModuleSet::parse(Vec::<String>::new()).unwrap();
        assert_eq!(all, ModuleSet::all());

        assert!(matches!(
            ModuleSet::parse(["ports", "bogus"]),
            Err(Error::UnknownModule(_))
        ));
    }

    #[test]
    fn test_scan_profile_parse() {
        assert_eq!("Quick".parse::<ScanProfile>().unwrap(), ScanProfile::Quick);
        assert_eq!("full".parse::<ScanProfile>().unwrap(), ScanProfile::Full);
        assert_eq!(ScanProfile::default(), ScanProfile::Full);
        assert!("ultimate".parse::<ScanProfile>().is_err());
    }

    #[test]
    fn test_stage_order() {
        let ranks: Vec<u8> = StageKind::ALL.iter().map(|s| s.rank()).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5, 6]);
        for stage in StageKind::ALL {
            if let Some(pred) = stage.predecessor() {
                assert!(pred.rank() < stage.rank());
            }
        }
    }
}
