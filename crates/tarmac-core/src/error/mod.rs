//! Error types and result aliases for gateway operations.
//!
//! Provides a unified error type covering the request pipeline end to end,
//! from path parsing through archive scanning and module transforms.

use thiserror::Error;

/// Unified error type for all gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    // Request errors
    #[error("Invalid URL: {path}")]
    InvalidPath { path: String },

    #[error("Invalid package name \"{name}\" ({reason})")]
    InvalidPackageName { name: String, reason: String },

    // Registry errors
    #[error("Cannot find package {name}@{version}")]
    PackageNotFound { name: String, version: String },

    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Archive errors
    #[error("Failed to read archive for {package}: {message}")]
    ArchiveRead {
        package: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    // Transform errors
    #[error("Cannot generate module for {file}: {message}")]
    Transform {
        file: String,
        message: String,
        diagnostics: String,
    },

    // IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// Create a network error from any error type
    pub fn network<E>(message: String, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Network {
            message,
            source: Some(Box::new(source)),
        }
    }

    /// Create an IO error from std::io::Error
    pub fn io(message: String, source: std::io::Error) -> Self {
        Self::Io { message, source }
    }

    /// Whether the failure is a transient upstream condition.
    ///
    /// Transient failures must never be cached as permanent negatives.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Network { .. } | GatewayError::Io { .. })
    }
}
