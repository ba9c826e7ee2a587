//! Port and service discovery via nmap XML output

use super::ToolCommand;
use crate::invocation::{AdapterRun, Invocation, Invoker};
use crate::normalize::Normalizer;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reconpipe_common::ToolConfig;
use reconpipe_core::{OpenPort, Result, ScanProfile, ScanTarget};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const DEFAULT_BINARY: &str = "nmap";
const DEFAULT_TIMEOUT_SECS: u64 = 180;

/// Port scan with XML on stdout. The full profile runs a service scan of the
/// top 1000 ports; quick sweeps nmap's fast list without version probes.
#[derive(Debug, Clone)]
pub struct NmapAdapter {
    command: ToolCommand,
}

impl NmapAdapter {
    pub fn from_config(config: &ToolConfig) -> Self {
        Self {
            command: ToolCommand::from_config(config, DEFAULT_BINARY, DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.command.timeout
    }

    pub fn argv(&self, target: &ScanTarget, profile: ScanProfile) -> Vec<String> {
        let host = target.host();
        let mut args = match profile {
            ScanProfile::Full => vec!["-sV", "-Pn", "-T4", "--top-ports", "1000"],
            ScanProfile::Quick => vec!["-Pn", "-T4", "-F"],
        };
        args.extend(["--open", "--min-rate=1000", "--max-retries=1"]);
        if host.contains(':') {
            args.push("-6");
        }
        args.extend(["-oX", "-"]);
        self.command.argv(args, [host])
    }

    pub async fn run(
        &self,
        invoker: &Invoker,
        normalizer: &Normalizer,
        target: &ScanTarget,
        profile: ScanProfile,
        cancel: &CancellationToken,
    ) -> Result<AdapterRun<Vec<OpenPort>>> {
        let output = match invoker
            .invoke(self.argv(target, profile), self.command.timeout, cancel)
            .await?
        {
            Invocation::Exited(output) => output,
            Invocation::Failed { status, error } => return Ok(AdapterRun::failed(status, error)),
        };

        if !output.success() {
            return Ok(invoker.exit_failure(&output));
        }

        let ports = parse_nmap_xml(&output.stdout);
        debug!(target = %target, open_ports = ports.len(), "Port discovery finished");

        let findings = ports.iter().map(|p| normalizer.open_port(p)).collect();
        Ok(AdapterRun::completed(
            ports,
            findings,
            invoker.truncate(output.stdout.trim()),
        ))
    }
}

#[derive(Default)]
struct PortEntry {
    port: Option<u16>,
    protocol: String,
    state: String,
    service: Option<String>,
    product: Option<String>,
    version: Option<String>,
}

/// Extract open ports from nmap XML. Ports in any state other than `open`
/// are dropped. A malformed document yields the ports read before the fault.
pub fn parse_nmap_xml(xml: &str) -> Vec<OpenPort> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut ports = Vec::new();
    let mut current: Option<PortEntry> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => handle_element(&e, &mut current),
            Ok(Event::Empty(e)) => {
                // A self-closing <port/> carries no state and is never open
                if e.name().as_ref() != b"port" {
                    handle_element(&e, &mut current);
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"port" {
                    if let Some(entry) = current.take() {
                        if let (Some(port), "open") = (entry.port, entry.state.as_str()) {
                            ports.push(OpenPort {
                                port,
                                protocol: entry.protocol,
                                service: entry.service,
                                product: entry.product,
                                version: entry.version,
                            });
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!("Error parsing nmap XML at position {}: {}", reader.buffer_position(), e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    ports
}

fn handle_element(e: &BytesStart<'_>, current: &mut Option<PortEntry>) {
    match e.name().as_ref() {
        b"port" => {
            let mut entry = PortEntry {
                protocol: "tcp".into(),
                ..Default::default()
            };
            for attr in e.attributes().filter_map(|a| a.ok()) {
                if let Ok(value) = attr.unescape_value() {
                    match attr.key.as_ref() {
                        b"portid" => entry.port = value.parse().ok(),
                        b"protocol" => entry.protocol = value.to_string(),
                        _ => {}
                    }
                }
            }
            *current = Some(entry);
        }
        b"state" => {
            if let Some(entry) = current.as_mut() {
                for attr in e.attributes().filter_map(|a| a.ok()) {
                    if attr.key.as_ref() == b"state" {
                        if let Ok(value) = attr.unescape_value() {
                            entry.state = value.to_string();
                        }
                    }
                }
            }
        }
        b"service" => {
            if let Some(entry) = current.as_mut() {
                for attr in e.attributes().filter_map(|a| a.ok()) {
                    if let Ok(value) = attr.unescape_value() {
                        let value = Some(value.to_string()).filter(|v| !v.is_empty());
                        match attr.key.as_ref() {
                            b"name" => entry.service = value,
                            b"product" => entry.product = value,
                            b"version" => entry.version = value,
                            _ => {}
                        }
                    }
                }
            }
        }
        _ => {}
    }
}
