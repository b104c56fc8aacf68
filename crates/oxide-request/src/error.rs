//! Error types for request construction and dispatch.

use thiserror::Error;

/// Errors raised while building a request context.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    /// The `_method` field (or override header) named a method that cannot be
    /// used as an override target.
    #[error("invalid method override: {0}")]
    InvalidMethodOverride(String),

    /// The transport supplied a method token that is not an HTTP method.
    #[error("unknown HTTP method: {0}")]
    UnknownMethod(String),
}

/// Errors raised by the dispatch loop.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No rule matched the remaining URL.
    #[error("no rule matched: {method} {path}")]
    NotFound { method: String, path: String },

    /// A handler delegated from a pattern that consumes nothing.
    #[error("delegation loop on pattern: {pattern:?}")]
    DelegationLoop { pattern: String },

    /// A rule names a controller that is not registered.
    #[error("unknown controller: {0}")]
    UnknownController(String),

    /// The dispatch configuration could not be decoded.
    #[error("invalid dispatch config: {0}")]
    InvalidConfig(#[from] serde_json::Error),
}

/// Result type alias for request construction.
pub type Result<T> = std::result::Result<T, RequestError>;
