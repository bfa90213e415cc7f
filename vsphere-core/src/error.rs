//! Error types for the vSphere collector.
//!
//! All errors use `thiserror`. Gateway implementations report failures as
//! `anyhow::Error` and the services wrap them with the name of the remote call.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for collector operations.
pub type Result<T> = std::result::Result<T, VsphereError>;

/// Main error type for the collector.
#[derive(Error, Debug)]
pub enum VsphereError {
    // Remote call errors
    #[error("Gateway call {operation} failed: {source}")]
    Gateway {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("Unexpected entity for {mor}: expected {expected}, got {actual}")]
    UnexpectedEntity { mor: String, expected: String, actual: String },

    #[error("Performance counter catalog unavailable: {reason}")]
    CounterCatalog { reason: String },

    // Filter errors
    #[error("Invalid filter expression {expression:?}: {reason}")]
    FilterCompile { expression: String, reason: String },

    #[error("Filter evaluation failed for {expression:?}: {reason}")]
    FilterEval { expression: String, reason: String },

    // Configuration errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("I/O error at {path:?}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Collection cycle cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VsphereError {
    /// Wrap a gateway failure with the remote operation that produced it.
    pub fn gateway(operation: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::Gateway { operation, source: source.into() }
    }

    /// Name of the gateway operation, when this error came from one.
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            Self::Gateway { operation, .. } => Some(operation),
            _ => None,
        }
    }
}
