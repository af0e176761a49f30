use serde::{Deserialize, Serialize};

/// Why a retry pass did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The previous pass finished less than the minimum interval ago
    TooSoon,
    /// Another caller is running a pass
    AlreadyRunning,
}

/// Retry pass events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FairnessEvent {
    PassStarted {
        policy: String,
        pending: usize,
    },

    PassCompleted {
        policy: String,
        allocated: usize,
        failed: usize,
        /// Chords not offered a chance because an older one was still blocked
        held_back: usize,
    },

    PassSkipped {
        reason: SkipReason,
    },
}
