//! Tool adapters - one external command each, parsed into findings and artifacts

pub mod bitrix;
pub mod httpx;
pub mod liveness;
pub mod nmap;
pub mod nuclei;
pub mod whatweb;
pub mod wpscan;

use crate::invocation::{AdapterRun, Invoker};
use crate::launcher::ProcessLauncher;
use crate::normalize::Normalizer;
use crate::signatures::SignatureTable;
use async_trait::async_trait;
use reconpipe_common::{Config, ToolConfig};
use reconpipe_core::{Result, SourceTool};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub use bitrix::BitrixScanner;
pub use httpx::{HttpxAdapter, DEFAULT_WEB_PORTS};
pub use liveness::LivenessAdapter;
pub use nmap::NmapAdapter;
pub use nuclei::NucleiAdapter;
pub use whatweb::WhatwebAdapter;
pub use wpscan::WpscanScanner;

/// Resolved binary, timeout and extra arguments for one tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub binary: String,
    pub timeout: Duration,
    pub extra_args: Vec<String>,
}

impl ToolCommand {
    pub fn from_config(config: &ToolConfig, default_binary: &str, default_timeout_secs: u64) -> Self {
        Self {
            binary: config.binary_or(default_binary).to_string(),
            timeout: config.timeout_or(default_timeout_secs),
            extra_args: config.extra_args.clone(),
        }
    }

    /// `binary <args...> <extra_args...> <trailing...>`
    pub fn argv<I, J>(&self, args: I, trailing: J) -> Vec<String>
    where
        I: IntoIterator,
        I::Item: Into<String>,
        J: IntoIterator,
        J::Item: Into<String>,
    {
        let mut argv = vec![self.binary.clone()];
        argv.extend(args.into_iter().map(Into::into));
        argv.extend(self.extra_args.iter().cloned());
        argv.extend(trailing.into_iter().map(Into::into));
        argv
    }
}

/// A CMS-specific scanner dispatched from the signature table
#[async_trait]
pub trait SpecializedScanner: Send + Sync {
    /// Signature name this scanner answers to
    fn signature(&self) -> &str;

    fn tool(&self) -> SourceTool;

    fn timeout(&self) -> Duration;

    async fn scan(
        &self,
        invoker: &Invoker,
        normalizer: &Normalizer,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<AdapterRun<()>>;
}

/// Specialized scanners indexed by signature name
#[derive(Default, Clone)]
pub struct SpecializedRegistry {
    scanners: HashMap<String, Arc<dyn SpecializedScanner>>,
}

impl SpecializedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, scanner: Arc<dyn SpecializedScanner>) {
        self.scanners.insert(scanner.signature().to_string(), scanner);
    }

    pub fn get(&self, signature: &str) -> Option<Arc<dyn SpecializedScanner>> {
        self.scanners.get(signature).cloned()
    }

    pub fn len(&self) -> usize {
        self.scanners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scanners.is_empty()
    }

    /// Longest timeout of any registered scanner
    pub fn max_timeout(&self) -> Duration {
        self.scanners
            .values()
            .map(|s| s.timeout())
            .max()
            .unwrap_or_default()
    }
}

/// Every adapter the pipeline drives, configured once
#[derive(Clone)]
pub struct Toolkit {
    pub invoker: Invoker,
    pub liveness: LivenessAdapter,
    pub nmap: NmapAdapter,
    pub httpx: HttpxAdapter,
    pub whatweb: WhatwebAdapter,
    pub nuclei: NucleiAdapter,
    pub signatures: SignatureTable,
    pub specialized: SpecializedRegistry,
}

impl Toolkit {
    pub fn from_config(launcher: Arc<dyn ProcessLauncher>, config: &Config) -> Self {
        let tools = &config.tools;

        let mut specialized = SpecializedRegistry::new();
        specialized.register(Arc::new(WpscanScanner::from_config(&tools.wpscan)));
        specialized.register(Arc::new(BitrixScanner::from_config(&tools.bitrix)));

        Self {
            invoker: Invoker::new(launcher, config.scanner.output_truncate_bytes),
            liveness: LivenessAdapter::from_config(&tools.ping),
            nmap: NmapAdapter::from_config(&tools.nmap),
            httpx: HttpxAdapter::from_config(&tools.httpx),
            whatweb: WhatwebAdapter::from_config(&tools.whatweb),
            nuclei: NucleiAdapter::from_config(&tools.nuclei),
            signatures: SignatureTable::default(),
            specialized,
        }
    }

    pub fn with_signatures(mut self, signatures: SignatureTable) -> Self {
        self.signatures = signatures;
        self
    }

    pub fn register_specialized(&mut self, scanner: Arc<dyn SpecializedScanner>) {
        self.specialized.register(scanner);
    }
}
