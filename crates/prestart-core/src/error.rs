use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for configuration resolution and startup.
#[derive(Error, Debug)]
pub enum PrestartError {
    // ── Config file errors ─────────────────────────────────────
    #[error("config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("failed to parse {}: {reason}", path.display())]
    ConfigParse { path: PathBuf, reason: String },

    // ── Derivation errors ──────────────────────────────────────
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    // ── Store errors ───────────────────────────────────────────
    #[error("settings layer '{0}' is read-only")]
    ReadOnlyLayer(&'static str),

    // ── Logging errors ─────────────────────────────────────────
    #[error("logging error: {0}")]
    Logging(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PrestartError>;
