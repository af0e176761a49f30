//! Allocation error types: resource state machine and chord violations

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum AllocationError {
    /// The resource state machine refused an acquisition.
    #[error("resource {resource} unavailable: {reason}")]
    Unavailable { resource: String, reason: String },

    /// A release did not match the current state of the resource.
    #[error("{mode} hold on resource {resource} cannot be released")]
    NotHeld { resource: String, mode: String },

    #[error("resource set is not satisfied")]
    NotSatisfied,

    /// Requests cannot change while the chord holds its resources.
    #[error("resource set is already satisfied")]
    AlreadySatisfied,

    #[error("no allocated {class} resource matches {filter}")]
    NotFound { class: String, filter: String },

    #[error("{count} allocated {class} resources match {filter}, expected exactly one")]
    Ambiguous {
        class: String,
        filter: String,
        count: usize,
    },

    /// No acquirable resource in the pool matches the request.
    #[error("request {request} cannot be satisfied by any {class} resource")]
    Unsatisfiable { class: String, request: String },

    #[error("gave up waiting for resources after {waited_ms}ms")]
    WaitTimedOut { waited_ms: u64 },

    #[error("allocation cancelled")]
    Cancelled,
}

impl UserFacingError for AllocationError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::NotSatisfied => Some("Acquire the chord before querying its resources."),
            Self::AlreadySatisfied => Some("Release the chord before adding requests."),
            Self::Ambiguous { .. } => {
                Some("Add an attribute filter that selects a single allocated resource.")
            }
            Self::WaitTimedOut { .. } => {
                Some("Increase wait.timeout_ms or release long-running holders.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::Unsatisfiable { .. } | Self::WaitTimedOut { .. }
        )
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::Unavailable { .. } => "allocation.unavailable",
            Self::NotHeld { .. } => "allocation.not_held",
            Self::NotSatisfied => "allocation.not_satisfied",
            Self::AlreadySatisfied => "allocation.already_satisfied",
            Self::NotFound { .. } => "allocation.not_found",
            Self::Ambiguous { .. } => "allocation.ambiguous",
            Self::Unsatisfiable { .. } => "allocation.unsatisfiable",
            Self::WaitTimedOut { .. } => "allocation.wait_timed_out",
            Self::Cancelled => "allocation.cancelled",
        };
        Some(code)
    }
}
