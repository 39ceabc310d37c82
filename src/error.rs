//! Unified error handling for the logline crate
//!
//! Each concern owns a small error enum (fanout transport, wire protocol,
//! configuration). The unified [`Error`] wraps them so callers that cross
//! module boundaries can use a single type.
//!
//! # Architecture
//!
//! - [`LoglineErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! Failures are isolated to the connection and operation that triggered them:
//! nothing in this module is allowed to tear down the process.

use std::io;
use thiserror::Error;

pub use crate::config::ConfigError;
pub use crate::fanout::FanoutError;
pub use crate::protocol::ProtocolError;

/// Common trait for all logline error types
pub trait LoglineErrorTrait: std::error::Error {
    /// Check if this error is transient (the same operation may succeed later)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Broadcast transport unreachable or misbehaving
    Transport,
    /// Malformed client input
    Protocol,
    /// Code execution side channel
    Execution,
    /// Configuration and validation errors
    Config,
    /// Socket and filesystem I/O
    Io,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Short label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Protocol => "protocol",
            Self::Execution => "execution",
            Self::Config => "config",
            Self::Io => "io",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the logline crate
#[derive(Error, Debug)]
pub enum Error {
    /// Fanout bridge errors
    #[error("Fanout error: {0}")]
    Fanout(#[from] FanoutError),

    /// Wire protocol errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Execution gateway errors that escaped the response envelope
    #[error("Execution error: {0}")]
    Execution(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl LoglineErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Fanout(e) => e.is_recoverable(),
            Self::Protocol(e) => e.is_recoverable(),
            Self::Config(_) => false,
            Self::Execution(_) => true,
            Self::Io(_) => true, // socket errors are usually transient
            Self::Json(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fanout(_) => ErrorCategory::Transport,
            Self::Protocol(_) | Self::Json(_) => ErrorCategory::Protocol,
            Self::Config(_) => ErrorCategory::Config,
            Self::Execution(_) => ErrorCategory::Execution,
            Self::Io(_) => ErrorCategory::Io,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
