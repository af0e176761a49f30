#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Event system for chords
//!
//! Allocation, fairness and registry activity is described by domain events.
//! Every emitted event is also written through `tracing` at a level chosen
//! by the event itself, so a process without an event consumer still gets
//! structured logs.

pub mod events;
pub mod logging;

pub use events::{
    AllocationEvent, AppEvent, FailureContext, FairnessEvent, RegistryEvent, SkipReason,
};
pub use logging::log_event;

use tokio::sync::mpsc::UnboundedSender;

/// Type alias for event sender
pub type EventSender = UnboundedSender<AppEvent>;

/// Type alias for event receiver
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<AppEvent>;

/// Create a new event channel
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// The unified trait for emitting events
///
/// Implemented by anything that may or may not carry an `EventSender`.
pub trait EventEmitter {
    /// Get the event sender for this emitter
    fn event_sender(&self) -> Option<&EventSender>;

    /// Log the event and forward it to the sender, if any
    fn emit(&self, event: AppEvent) {
        log_event(&event);
        if let Some(sender) = self.event_sender() {
            // Ignore send errors - if receiver is dropped, we just continue
            let _ = sender.send(event);
        }
    }

    fn emit_allocation(&self, event: AllocationEvent) {
        self.emit(AppEvent::Allocation(event));
    }

    fn emit_fairness(&self, event: FairnessEvent) {
        self.emit(AppEvent::Fairness(event));
    }

    fn emit_registry(&self, event: RegistryEvent) {
        self.emit(AppEvent::Registry(event));
    }
}

/// Implementation of `EventEmitter` for the raw `EventSender`
impl EventEmitter for EventSender {
    fn event_sender(&self) -> Option<&EventSender> {
        Some(self)
    }
}

/// Implementation for an optional sender, the common shape inside components
impl EventEmitter for Option<EventSender> {
    fn event_sender(&self) -> Option<&EventSender> {
        self.as_ref()
    }
}
