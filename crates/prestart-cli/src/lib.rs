//! # prestart-cli
//!
//! Command-line surface for the prestart resolver.
//!
//! ## Commands
//!
//! - `prestart show` — Print the resolved settings
//! - `prestart get <KEY>` — Print a single resolved setting
//!
//! Logging is configured from the resolved settings before any command runs.

pub mod commands;
pub mod logging;

pub use commands::Cli;
pub use logging::{FormatStage, LogBackend, LogPipeline, LoggingConfigurator, SinkSpec};
