#![warn(mismatched_lifetime_syntaxes)]
#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Error types for the chords allocation engine
//!
//! This crate provides fine-grained error types organized by domain.
//! All error types implement Clone so a failure captured during a fairness
//! pass can be handed back to the waiting caller.

use std::borrow::Cow;

use thiserror::Error;

pub mod allocation;
pub mod config;
pub mod registry;

// Re-export all error types at the root
pub use allocation::AllocationError;
pub use config::ConfigError;
pub use registry::RegistryError;

/// Generic error type for cross-crate boundaries
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Error {
    #[error("allocation error: {0}")]
    Allocation(#[from] AllocationError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Failure raised by user work running inside a satisfied scope.
    #[error("task failed: {message}")]
    Task { message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an internal error with a message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a task error from anything displayable
    pub fn task(msg: impl std::fmt::Display) -> Self {
        Self::Task {
            message: msg.to_string(),
        }
    }

    /// Whether this error reports a missing resource class
    #[must_use]
    pub fn is_unknown_class(&self) -> bool {
        matches!(self, Self::Registry(RegistryError::UnknownClass { .. }))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.into())
    }
}

/// Result type alias for chords operations
pub type Result<T> = std::result::Result<T, Error>;

/// Minimal interface for rendering user-facing error information without
/// requiring heavyweight envelopes.
pub trait UserFacingError {
    /// Short message suitable for CLI output.
    fn user_message(&self) -> Cow<'_, str>;

    /// Optional remediation hint.
    fn user_hint(&self) -> Option<&'static str> {
        None
    }

    /// Whether retrying the same operation is likely to succeed.
    fn is_retryable(&self) -> bool {
        false
    }

    /// Stable error code for analytics / structured reporting.
    fn user_code(&self) -> Option<&'static str> {
        None
    }
}

impl UserFacingError for Error {
    fn user_message(&self) -> Cow<'_, str> {
        match self {
            Error::Allocation(err) => err.user_message(),
            Error::Registry(err) => err.user_message(),
            Error::Config(err) => err.user_message(),
            _ => Cow::Owned(self.to_string()),
        }
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Error::Allocation(err) => err.user_hint(),
            Error::Registry(err) => err.user_hint(),
            Error::Config(err) => err.user_hint(),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Error::Allocation(err) => err.is_retryable(),
            Error::Registry(err) => err.is_retryable(),
            Error::Config(err) => err.is_retryable(),
            _ => false,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        match self {
            Error::Allocation(err) => err.user_code(),
            Error::Registry(err) => err.user_code(),
            Error::Config(err) => err.user_code(),
            Error::Task { .. } => Some("error.task"),
            Error::Internal(_) => Some("error.internal"),
        }
    }
}
