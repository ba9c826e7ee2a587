//! Error types for reconpipe

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using reconpipe Error
pub type Result<T> = std::result::Result<T, Error>;

/// reconpipe error types
#[derive(Error, Debug)]
pub enum Error {
    // === Tool Errors (absorbed by the stage) ===
    #[error("Tool {tool} could not be started: {message}")]
    ToolInvocation { tool: String, message: String },

    #[error("Tool {tool} timed out after {timeout_seconds}s")]
    ToolTimeout { tool: String, timeout_seconds: u64 },

    #[error("Parse error in {tool} output: {message}")]
    Parse { tool: String, message: String },

    #[error("Execution cancelled")]
    Cancelled,

    // === Job Errors ===
    #[error("Invalid job definition: {0}")]
    JobDefinition(String),

    #[error("Job not found: {job_id}")]
    JobNotFound { job_id: Uuid },

    #[error("Job {job_id} already finished")]
    JobAlreadyFinished { job_id: Uuid },

    #[error("Invalid status transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: Uuid,
        from: String,
        to: String,
    },

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Unknown module: {0}")]
    UnknownModule(String),

    // === Storage Errors ===
    #[error("Repository error: {0}")]
    Repository(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidConfig { key: String, message: String },

    // === IO / Serialization ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Errors that stay inside a single stage and never fail the job
    pub fn is_stage_local(&self) -> bool {
        matches!(
            self,
            Error::ToolInvocation { .. } | Error::ToolTimeout { .. } | Error::Parse { .. }
        )
    }

    /// Errors that reject a submission before any job is created
    pub fn is_job_definition(&self) -> bool {
        matches!(
            self,
            Error::JobDefinition(_) | Error::InvalidTarget(_) | Error::UnknownModule(_)
        )
    }

    /// Get an error code for logging
    pub fn code(&self) -> &'static str {
        match self {
            Error::ToolInvocation { .. } => "TOOL_INVOCATION",
            Error::ToolTimeout { .. } => "TOOL_TIMEOUT",
            Error::Parse { .. } => "PARSE_ERROR",
            Error::Cancelled => "CANCELLED",
            Error::JobDefinition(_) => "JOB_DEFINITION",
            Error::JobNotFound { .. } => "JOB_NOT_FOUND",
            Error::JobAlreadyFinished { .. } => "JOB_FINISHED",
            Error::InvalidTransition { .. } => "INVALID_TRANSITION",
            Error::InvalidTarget(_) => "INVALID_TARGET",
            Error::UnknownModule(_) => "UNKNOWN_MODULE",
            Error::Repository(_) => "REPOSITORY_ERROR",
            Error::Configuration(_) => "CONFIG_ERROR",
            Error::InvalidConfig { .. } => "INVALID_CONFIG",
            Error::Io(_) => "IO_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let timeout = Error::ToolTimeout {
            tool: "nmap".into(),
            timeout_seconds: 180,
        };
        assert!(timeout.is_stage_local());
        assert!(!timeout.is_job_definition());
        assert_eq!(timeout.code(), "TOOL_TIMEOUT");

        let unknown = Error::UnknownModule("sqlmap".into());
        assert!(unknown.is_job_definition());
        assert!(!unknown.is_stage_local());
    }
}
