//! Transport errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl From<TransportError> for reconpipe_core::Error {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::NotConfigured(message) => reconpipe_core::Error::Configuration(message),
            other => reconpipe_core::Error::Internal(other.to_string()),
        }
    }
}

/// Turn a non-2xx response into `TransportError::Api`
pub(crate) async fn check_status(res: reqwest::Response) -> Result<(), TransportError> {
    if res.status().is_success() {
        return Ok(());
    }
    let status = res.status().as_u16();
    let message = res.text().await.unwrap_or_default();
    Err(TransportError::Api { status, message })
}
