//! Event tallying for the run summary

use chords_events::{AllocationEvent, AppEvent, FairnessEvent, RegistryEvent};
use serde::Serialize;

/// Counts of the domain events seen during a run
#[derive(Debug, Default, Clone, Serialize)]
pub struct EventTally {
    pub requested: u64,
    pub allocated: u64,
    pub queued: u64,
    pub released: u64,
    pub failed: u64,
    pub passes: u64,
    pub passes_skipped: u64,
    pub resources_added: u64,
}

impl EventTally {
    pub fn handle_event(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Allocation(event) => match event {
                AllocationEvent::Requested { .. } => self.requested += 1,
                AllocationEvent::Allocated { .. } => self.allocated += 1,
                AllocationEvent::Queued { .. } => self.queued += 1,
                AllocationEvent::Released { .. } => self.released += 1,
                AllocationEvent::Failed { .. } => self.failed += 1,
            },
            AppEvent::Fairness(event) => match event {
                FairnessEvent::PassCompleted { .. } => self.passes += 1,
                FairnessEvent::PassSkipped { .. } => self.passes_skipped += 1,
                FairnessEvent::PassStarted { .. } => {}
            },
            AppEvent::Registry(RegistryEvent::ResourceAdded { .. }) => self.resources_added += 1,
            AppEvent::Registry(_) => {}
        }
    }
}
