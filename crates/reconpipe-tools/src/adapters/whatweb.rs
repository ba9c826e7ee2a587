//! Technology fingerprinting via whatweb

use super::ToolCommand;
use crate::invocation::{AdapterRun, Invocation, Invoker};
use reconpipe_common::ToolConfig;
use reconpipe_core::Result;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_BINARY: &str = "whatweb";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Fingerprints live URLs. Produces free text only; the text routes the
/// specialized stage and is never turned into findings.
#[derive(Debug, Clone)]
pub struct WhatwebAdapter {
    command: ToolCommand,
}

impl WhatwebAdapter {
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
            ["--color=never", "--no-errors", "--log-brief=-", "--quiet"],
            urls.iter().cloned(),
        )
    }

    pub async fn run(
        &self,
        invoker: &Invoker,
        urls: &[String],
        cancel: &CancellationToken,
    ) -> Result<AdapterRun<BTreeMap<String, String>>> {
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

        Ok(AdapterRun::completed(
            parse_whatweb_output(&output.stdout, urls),
            Vec::new(),
            invoker.truncate(output.stdout.trim()),
        ))
    }
}

/// Map brief-log lines to the URL they start with. Output with no URL-led
/// line at all is attributed to the first probed URL.
pub fn parse_whatweb_output(stdout: &str, urls: &[String]) -> BTreeMap<String, String> {
    let mut fingerprints = BTreeMap::new();

    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some(url) = line.split_whitespace().next() else {
            continue;
        };
        if url.starts_with("http://") || url.starts_with("https://") {
            fingerprints
                .entry(url.to_string())
                .and_modify(|text: &mut String| {
                    text.push('\n');
                    text.push_str(line);
                })
                .or_insert_with(|| line.to_string());
        }
    }

    if fingerprints.is_empty() && !stdout.trim().is_empty() {
        if let Some(first) = urls.first() {
            fingerprints.insert(first.clone(), stdout.trim().to_string());
        }
    }
    fingerprints
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_keyed_by_url() {
        let stdout = "\
http://blog.example.com:80 [301 Moved Permanently] Country[UNITED STATES], RedirectLocation[https://blog.example.com/]
https://blog.example.com/ [200 OK] HTTPServer[nginx], MetaGenerator[WordPress 6.4.2], WordPress[6.4.2]
";
        let urls = vec!["http://blog.example.com:80".to_string()];
        let map = parse_whatweb_output(stdout, &urls);
        assert_eq!(map.len(), 2);
        assert!(map["https://blog.example.com/"].contains("WordPress[6.4.2]"));
    }

    #[test]
    fn test_unprefixed_output_falls_back_to_first_url() {
        let urls = vec!["http://a:80".to_string(), "https://a:443".to_string()];
        let map = parse_whatweb_output("Apache[2.4.57], Bitrix", &urls);
        assert_eq!(map.len(), 1);
        assert_eq!(map["http://a:80"], "Apache[2.4.57], Bitrix");
        assert!(parse_whatweb_output("", &urls).is_empty());
    }

    #[test]
    fn test_argv_lists_urls_last() {
        let adapter = WhatwebAdapter::from_config(&ToolConfig::default());
        let argv = adapter.argv(&["http://a:80".into(), "https://a:443".into()]);
        assert_eq!(argv[0], "whatweb");
        assert_eq!(argv[argv.len() - 2..], ["http://a:80", "https://a:443"]);
    }
}
