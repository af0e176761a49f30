//! CLI error handling

use std::fmt;

use chords_errors::UserFacingError;

/// CLI-specific error type
#[derive(Debug)]
pub enum CliError {
    /// Engine or configuration error
    Engine(chords_errors::Error),
    /// Invalid command arguments
    InvalidArguments(String),
    /// The workload thread did not finish
    Join(tokio::task::JoinError),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Engine(e) => {
                let message = e.user_message();
                write!(f, "{message}")?;
                if let Some(code) = e.user_code() {
                    write!(f, "\n  Code: {code}")?;
                }
                if let Some(hint) = e.user_hint() {
                    write!(f, "\n  Hint: {hint}")?;
                }
                if e.is_retryable() {
                    write!(f, "\n  Retry: safe to retry this operation.")?;
                }
                Ok(())
            }
            CliError::InvalidArguments(msg) => write!(f, "Invalid arguments: {msg}"),
            CliError::Join(e) => write!(f, "Workload aborted: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Engine(e) => Some(e),
            CliError::Join(e) => Some(e),
            CliError::InvalidArguments(_) => None,
        }
    }
}

impl From<chords_errors::Error> for CliError {
    fn from(e: chords_errors::Error) -> Self {
        CliError::Engine(e)
    }
}

impl From<chords_errors::ConfigError> for CliError {
    fn from(e: chords_errors::ConfigError) -> Self {
        CliError::Engine(e.into())
    }
}

impl From<tokio::task::JoinError> for CliError {
    fn from(e: tokio::task::JoinError) -> Self {
        CliError::Join(e)
    }
}
