//! Structured logging integration for events
//!
//! Converts domain events into tracing records with structured fields.

use crate::{AllocationEvent, AppEvent, FairnessEvent, RegistryEvent};
use tracing::Level;

macro_rules! log_at {
    ($level:expr, $target:literal, $($rest:tt)+) => {
        match $level {
            Level::ERROR => tracing::error!(target: $target, $($rest)+),
            Level::WARN => tracing::warn!(target: $target, $($rest)+),
            Level::INFO => tracing::info!(target: $target, $($rest)+),
            Level::DEBUG => tracing::debug!(target: $target, $($rest)+),
            _ => tracing::trace!(target: $target, $($rest)+),
        }
    };
}

/// Log an `AppEvent` using the tracing infrastructure with structured fields
pub fn log_event(event: &AppEvent) {
    let level = event.log_level();
    match event {
        AppEvent::Allocation(allocation) => match allocation {
            AllocationEvent::Requested { chord, requests } => {
                log_at!(level, "chords::events::allocation", chord, requests = ?requests, "resources requested");
            }
            AllocationEvent::Allocated { chord, resources } => {
                log_at!(level, "chords::events::allocation", chord, resources = ?resources, "resources allocated");
            }
            AllocationEvent::Queued { chord, pending } => {
                log_at!(level, "chords::events::allocation", chord, pending, "chord queued");
            }
            AllocationEvent::Released { chord, count } => {
                log_at!(level, "chords::events::allocation", chord, count, "resources released");
            }
            AllocationEvent::Failed { chord, failure } => {
                log_at!(
                    level,
                    "chords::events::allocation",
                    chord,
                    code = ?failure.code,
                    retryable = failure.retryable,
                    "allocation failed: {}",
                    failure.message
                );
            }
        },
        AppEvent::Fairness(fairness) => match fairness {
            FairnessEvent::PassStarted { policy, pending } => {
                log_at!(level, "chords::events::fairness", policy = %policy, pending, "retry pass started");
            }
            FairnessEvent::PassCompleted {
                policy,
                allocated,
                failed,
                held_back,
            } => {
                log_at!(
                    level,
                    "chords::events::fairness",
                    policy = %policy,
                    allocated,
                    failed,
                    held_back,
                    "retry pass completed"
                );
            }
            FairnessEvent::PassSkipped { reason } => {
                log_at!(level, "chords::events::fairness", reason = ?reason, "retry pass skipped");
            }
        },
        AppEvent::Registry(registry) => match registry {
            RegistryEvent::PoolRegistered { class, kind } => {
                log_at!(level, "chords::events::registry", class = %class, kind = %kind, "pool registered");
            }
            RegistryEvent::PoolUnregistered { class } => {
                log_at!(level, "chords::events::registry", class = %class, "pool unregistered");
            }
            RegistryEvent::ResourceAdded { class, resource } => {
                log_at!(level, "chords::events::registry", class = %class, resource = %resource, "resource added");
            }
            RegistryEvent::ResourceRemoved { class, resource } => {
                log_at!(level, "chords::events::registry", class = %class, resource = %resource, "resource removed");
            }
        },
    }
}
