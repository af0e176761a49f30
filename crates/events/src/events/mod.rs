use serde::{Deserialize, Serialize};

use chords_errors::UserFacingError;

/// Structured failure information shared across domains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short user-facing message.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether retrying the operation might succeed.
    pub retryable: bool,
}

impl FailureContext {
    /// Build failure context from a `UserFacingError` implementation.
    #[must_use]
    pub fn from_error<E: UserFacingError + ?Sized>(error: &E) -> Self {
        Self {
            code: error.user_code().map(Into::into),
            message: error.user_message().into_owned(),
            hint: error.user_hint().map(Into::into),
            retryable: error.is_retryable(),
        }
    }
}

pub mod allocation;
pub mod fairness;
pub mod registry;

pub use allocation::*;
pub use fairness::*;
pub use registry::*;

/// Top-level event enum that aggregates all domain-specific events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// Chord lifecycle: request, allocate, queue, release
    Allocation(AllocationEvent),

    /// Retry passes over blocked chords
    Fairness(FairnessEvent),

    /// Pool registration and inventory changes
    Registry(RegistryEvent),
}

impl AppEvent {
    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;

        match self {
            Self::Allocation(AllocationEvent::Failed { .. }) => Level::ERROR,

            Self::Fairness(FairnessEvent::PassCompleted { failed, .. }) if *failed > 0 => {
                Level::WARN
            }

            Self::Allocation(AllocationEvent::Queued { .. })
            | Self::Fairness(FairnessEvent::PassStarted { .. } | FairnessEvent::PassCompleted { .. })
            | Self::Registry(
                RegistryEvent::ResourceAdded { .. } | RegistryEvent::ResourceRemoved { .. },
            ) => Level::DEBUG,

            Self::Fairness(FairnessEvent::PassSkipped { .. }) => Level::TRACE,

            _ => Level::INFO,
        }
    }

    /// Get the log target for this event (for structured logging)
    #[must_use]
    pub fn log_target(&self) -> &'static str {
        match self {
            Self::Allocation(_) => "chords::events::allocation",
            Self::Fairness(_) => "chords::events::fairness",
            Self::Registry(_) => "chords::events::registry",
        }
    }
}
