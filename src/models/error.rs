//! Error types for tierpoint.
//!
//! Taxonomy:
//! - Storage failures: open/read/write/transfer errors carrying the OS error
//! - Discovery outcomes: entries skipped during version resolution
//! - Internal: invariant violations and closed channels

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for tierpoint.
#[derive(Debug, Error)]
pub enum TierError {
    // ═══════════════════════════════════════════════════════════════════
    // STORAGE: the underlying file system refused an operation
    // ═══════════════════════════════════════════════════════════════════

    #[error("IO error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Transfer of {} stopped after {moved} of {expected} bytes", .path.display())]
    Truncated {
        path: PathBuf,
        expected: u64,
        moved: u64,
    },

    // ═══════════════════════════════════════════════════════════════════
    // DISCOVERY: entries excluded while resolving versions
    // ═══════════════════════════════════════════════════════════════════

    #[error("Malformed checkpoint name: {0}")]
    Malformed(String),

    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    // ═══════════════════════════════════════════════════════════════════
    // SURROUNDINGS: configuration and report input
    // ═══════════════════════════════════════════════════════════════════

    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Parse error: {0}")]
    ParseError(String),

    // ═══════════════════════════════════════════════════════════════════
    // INTERNAL: should not happen
    // ═══════════════════════════════════════════════════════════════════

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

impl TierError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether this error means the target simply was not there.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Result type alias for tierpoint.
pub type Result<T> = std::result::Result<T, TierError>;
