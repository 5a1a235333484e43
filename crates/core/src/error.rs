//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic failures only (validation, lifecycle rules, parse errors).
/// Storage and process failures belong to the infra crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. empty command).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A stored output blob is not valid base64.
    #[error("invalid output encoding: {0}")]
    InvalidOutput(String),

    /// A job was asked to make a transition its lifecycle does not allow.
    #[error("illegal transition: {0}")]
    IllegalTransition(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn invalid_output(msg: impl Into<String>) -> Self {
        Self::InvalidOutput(msg.into())
    }

    pub fn illegal_transition(msg: impl Into<String>) -> Self {
        Self::IllegalTransition(msg.into())
    }
}
