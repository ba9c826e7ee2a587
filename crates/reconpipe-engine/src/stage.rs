//! Stage definitions and the fixed per-target plan

use reconpipe_core::{ModuleSet, ScanModule, StageKind};
use reconpipe_tools::Toolkit;
use std::time::Duration;

/// One stage of the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDefinition {
    pub kind: StageKind,
    pub rank: u8,
    /// Stage whose artifact must be usable before this one runs
    pub predecessor: Option<StageKind>,
    /// Module that must be requested
    pub module: ScanModule,
    /// Ceiling for the stage's tool invocations
    pub timeout: Duration,
}

impl StageDefinition {
    pub fn new(kind: StageKind, timeout: Duration) -> Self {
        Self {
            kind,
            rank: kind.rank(),
            predecessor: kind.predecessor(),
            module: kind.module(),
            timeout,
        }
    }

    pub fn applies_to(&self, modules: &ModuleSet) -> bool {
        modules.contains(self.module)
    }
}

/// All six stages in rank order
#[derive(Debug, Clone)]
pub struct StagePlan {
    stages: Vec<StageDefinition>,
}

impl StagePlan {
    pub fn from_toolkit(toolkit: &Toolkit) -> Self {
        let stages = StageKind::ALL
            .into_iter()
            .map(|kind| {
                let timeout = match kind {
                    StageKind::Liveness => toolkit.liveness.timeout(),
                    StageKind::PortDiscovery => toolkit.nmap.timeout(),
                    StageKind::WebDiscovery => toolkit.httpx.timeout(),
                    StageKind::TechFingerprint => toolkit.whatweb.timeout(),
                    StageKind::VulnScan => toolkit.nuclei.timeout(),
                    StageKind::Specialized => toolkit.specialized.max_timeout(),
                };
                StageDefinition::new(kind, timeout)
            })
            .collect();
        Self { stages }
    }

    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    pub fn get(&self, kind: StageKind) -> Option<&StageDefinition> {
        self.stages.iter().find(|s| s.kind == kind)
    }

    /// Stages a job with these modules executes per target
    pub fn requested(&self, modules: &ModuleSet) -> usize {
        self.stages.iter().filter(|s| s.applies_to(modules)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconpipe_common::Config;
    use reconpipe_tools::TokioLauncher;
    use std::sync::Arc;

    #[test]
    fn test_plan_follows_stage_order() {
        let toolkit = Toolkit::from_config(Arc::new(TokioLauncher), &Config::default());
        let plan = StagePlan::from_toolkit(&toolkit);

        let ranks: Vec<u8> = plan.stages().iter().map(|s| s.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(
            plan.get(StageKind::PortDiscovery).map(|s| s.timeout),
            Some(Duration::from_secs(180))
        );
        assert_eq!(
            plan.get(StageKind::Specialized).map(|s| s.timeout),
            Some(Duration::from_secs(300))
        );
    }

    #[test]
    fn test_requested_counts_modules() {
        let toolkit = Toolkit::from_config(Arc::new(TokioLauncher), &Config::default());
        let plan = StagePlan::from_toolkit(&toolkit);

        let modules = ModuleSet::parse(["ports", "web", "vulns"]).unwrap();
        assert_eq!(plan.requested(&modules), 3);
        assert_eq!(plan.requested(&ModuleSet::all()), 6);
    }
}
