//! reconpipe Transport - HTTP delivery of progress and critical findings
//!
//! This crate provides:
//! - `HttpProgressReporter`, posting job snapshots to `{base}/api/scans/{id}/update`
//! - `WebhookNotifier`, draining the critical-finding channel into a webhook

pub mod error;
pub mod notifier;
pub mod reporter;

pub use error::TransportError;
pub use notifier::WebhookNotifier;
pub use reporter::HttpProgressReporter;

use reqwest::Client;
use std::time::Duration;

/// Shared HTTP client settings for outbound calls
pub(crate) fn http_client(timeout: Duration) -> Result<Client, TransportError> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(format!("reconpipe/{}", env!("CARGO_PKG_VERSION")))
        .build()?)
}
