//! reconpipe Common - Shared utilities: configuration and logging
//!
//! This crate provides common functionality used across all reconpipe crates.

pub mod config;
pub mod logging;

pub use config::{Config, ConfigBuilder, ToolConfig};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogFormat};
