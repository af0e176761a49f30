use serde::{Deserialize, Serialize};

use super::FailureContext;

/// Chord lifecycle events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AllocationEvent {
    /// A chord asked for its resource set
    Requested { chord: u64, requests: Vec<String> },

    /// Every request was satisfied at once
    Allocated { chord: u64, resources: Vec<String> },

    /// Immediate allocation failed; the chord is waiting on the fairness policy
    Queued { chord: u64, pending: usize },

    /// The chord gave back its resources
    Released { chord: u64, count: usize },

    /// Blocking acquisition ended with an error
    Failed { chord: u64, failure: FailureContext },
}
