//! Scripted process launcher and fixtures for engine tests

use crate::notify::CriticalFindingSink;
use async_trait::async_trait;
use reconpipe_core::{Error, Finding, Result};
use reconpipe_tools::{ProcessLauncher, ProcessOutput};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// What a scripted binary does when launched
#[derive(Debug, Clone)]
pub enum Script {
    Exit {
        code: i32,
        stdout: String,
        stderr: String,
    },
    Timeout,
    /// Block until cancelled
    Hang,
    Panic,
}

impl Script {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self::exit(0, stdout)
    }

    pub fn exit(code: i32, stdout: impl Into<String>) -> Self {
        Script::Exit {
            code,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }
}

type ScriptFn = Box<dyn Fn(&[String]) -> Script + Send + Sync>;

/// Launcher keyed by binary name. Unscripted binaries fail to start.
#[derive(Default)]
pub struct ScriptedLauncher {
    scripts: HashMap<String, ScriptFn>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, binary: &str, script: Script) -> Self {
        self.on_argv(binary, move |_| script.clone())
    }

    /// Pick the script from the full command line
    pub fn on_argv<F>(mut self, binary: &str, f: F) -> Self
    where
        F: Fn(&[String]) -> Script + Send + Sync + 'static,
    {
        self.scripts.insert(binary.to_string(), Box::new(f));
        self
    }

    pub fn calls_for(&self, binary: &str) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|argv| argv.first().map(String::as_str) == Some(binary))
            .cloned()
            .collect()
    }

    pub fn called(&self, binary: &str) -> bool {
        !self.calls_for(binary).is_empty()
    }
}

#[async_trait]
impl ProcessLauncher for ScriptedLauncher {
    async fn launch(
        &self,
        argv: &[String],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput> {
        self.calls.lock().unwrap().push(argv.to_vec());
        let binary = argv.first().cloned().unwrap_or_default();

        let Some(script) = self.scripts.get(&binary).map(|f| f(argv)) else {
            return Err(Error::ToolInvocation {
                tool: binary,
                message: "No such file or directory (os error 2)".into(),
            });
        };

        match script {
            Script::Exit {
                code,
                stdout,
                stderr,
            } => {
                tokio::task::yield_now().await;
                Ok(ProcessOutput {
                    exit_code: Some(code),
                    stdout,
                    stderr,
                })
            }
            Script::Timeout => Err(Error::ToolTimeout {
                tool: binary,
                timeout_seconds: timeout.as_secs(),
            }),
            Script::Hang => {
                cancel.cancelled().await;
                Err(Error::Cancelled)
            }
            Script::Panic => panic!("{} crashed the worker", binary),
        }
    }
}

/// Counts critical findings handed to it
#[derive(Default)]
pub struct CountingSink {
    seen: Mutex<Vec<(Uuid, String)>>,
}

impl CountingSink {
    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn ids(&self) -> Vec<String> {
        self.seen.lock().unwrap().iter().map(|(_, id)| id.clone()).collect()
    }
}

impl CriticalFindingSink for CountingSink {
    fn on_critical_finding(&self, job_id: Uuid, finding: &Finding) {
        self.seen.lock().unwrap().push((job_id, finding.id.to_string()));
    }
}

pub mod fixtures {
    /// Minimal nmap XML with the given TCP ports open
    pub fn nmap_xml(ports: &[u16]) -> String {
        let mut xml = String::from(
            "<?xml version=\"1.0\"?>\n<nmaprun scanner=\"nmap\">\n<host>\n<ports>\n",
        );
        for port in ports {
            xml.push_str(&format!(
                "<port protocol=\"tcp\" portid=\"{}\"><state state=\"open\" reason=\"syn-ack\"/><service name=\"http\"/></port>\n",
                port
            ));
        }
        xml.push_str("</ports>\n</host>\n</nmaprun>\n");
        xml
    }

    /// One critical and one medium template match
    pub fn nuclei_lines() -> String {
        [
            r#"{"template-id":"CVE-2023-1234","info":{"name":"Plugin RCE","severity":"critical","classification":{"cvss-score":9.8,"cve-id":["CVE-2023-1234"]}},"matched-at":"http://blog.example.com:80/wp-admin"}"#,
            r#"{"template-id":"git-config","info":{"name":"Git Config Exposure","severity":"medium"},"matched-at":"http://blog.example.com:80/.git/config"}"#,
        ]
        .join("\n")
    }

    pub const WPSCAN_REPORT: &str = r#"{
  "interesting_findings": [
    {"url": "http://blog.example.com:80/xmlrpc.php", "to_s": "XML-RPC seems to be enabled", "type": "xmlrpc"}
  ],
  "plugins": {
    "contact-form-7": {
      "vulnerabilities": [
        {"title": "Contact Form 7 < 5.3.2 - Unrestricted File Upload", "references": {"cve": ["2020-35489"]}}
      ]
    }
  }
}"#;
}
