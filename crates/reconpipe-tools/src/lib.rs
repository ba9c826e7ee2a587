//! reconpipe Tools - External tool execution and output normalization
//!
//! Every stage of the pipeline drives one external program. This crate owns:
//! - Process launching with timeouts and cancellation (`launcher`)
//! - Folding launches into adapter outcomes (`invocation`)
//! - Per-tool command lines and output parsers (`adapters`)
//! - The canonical finding mapping (`normalize`)
//! - The CMS signature table driving specialized scans (`signatures`)

pub mod adapters;
pub mod invocation;
pub mod launcher;
pub mod normalize;
pub mod signatures;

pub use adapters::{SpecializedRegistry, SpecializedScanner, ToolCommand, Toolkit, DEFAULT_WEB_PORTS};
pub use invocation::{truncate_utf8, AdapterRun, Invocation, Invoker, ToolStatus};
pub use launcher::{ProcessLauncher, ProcessOutput, TokioLauncher};
pub use normalize::{Normalizer, TemplateMatch};
pub use signatures::{CmsSignature, SignatureMatch, SignatureTable};
