use crate::chord::Chord;
use crate::clock::Clock;
use crate::fairness::{BestEffortFairness, FairnessPolicy, StrictFifoFairness};
use crate::wait::{Backoff, SignalWait, WaitStrategy};
use chords_config::{Config, FairnessKind};
use chords_errors::Result;
use chords_events::{EventEmitter, EventSender};
use chords_resources::Registry;
use chords_types::Request;
use std::sync::{Arc, OnceLock};

static GLOBAL: OnceLock<Allocator> = OnceLock::new();

/// Context shared by every chord: the registry to allocate from, the
/// fairness policy arbitrating waiters, and how to wait.
///
/// Cheap to clone; clones share all components.
#[derive(Debug, Clone)]
pub struct Allocator {
    registry: Arc<Registry>,
    fairness: Arc<dyn FairnessPolicy>,
    waiter: Arc<dyn WaitStrategy>,
    backoff: Backoff,
    events: Option<EventSender>,
}

impl EventEmitter for Allocator {
    fn event_sender(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }
}

impl Allocator {
    /// Best-effort fairness and signal-based waiting with default backoff
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        let backoff = Backoff::default();
        let waiter = Arc::new(SignalWait::new(Arc::clone(registry.signal()), backoff));
        Self {
            registry,
            fairness: Arc::new(BestEffortFairness::new()),
            waiter,
            backoff,
            events: None,
        }
    }

    /// Pick fairness policy, pacing and wait policy from configuration
    #[must_use]
    pub fn from_config(config: &Config, registry: Arc<Registry>) -> Self {
        Self::from_config_with_clock(config, registry, None)
    }

    /// Like [`Allocator::from_config`], pacing passes with `clock`
    #[must_use]
    pub fn from_config_with_clock(
        config: &Config,
        registry: Arc<Registry>,
        clock: Option<Arc<dyn Clock>>,
    ) -> Self {
        let interval = config.fairness.min_pass_interval();
        let fairness: Arc<dyn FairnessPolicy> = match (config.fairness.policy, clock) {
            (FairnessKind::BestEffort, None) => {
                Arc::new(BestEffortFairness::new().with_min_interval(interval))
            }
            (FairnessKind::BestEffort, Some(clock)) => Arc::new(
                BestEffortFairness::new()
                    .with_min_interval(interval)
                    .with_clock(clock),
            ),
            (FairnessKind::StrictFifo, None) => {
                Arc::new(StrictFifoFairness::new().with_min_interval(interval))
            }
            (FairnessKind::StrictFifo, Some(clock)) => Arc::new(
                StrictFifoFairness::new()
                    .with_min_interval(interval)
                    .with_clock(clock),
            ),
        };
        tracing::debug!(
            policy = fairness.name(),
            min_pass_interval_ms = config.fairness.min_pass_interval_ms,
            timeout_ms = ?config.wait.timeout_ms,
            "allocator configured"
        );
        Self::new(registry)
            .with_fairness(fairness)
            .with_backoff(Backoff::from_config(&config.wait))
    }

    /// Process-wide allocator over [`Registry::global`]
    pub fn global() -> Allocator {
        GLOBAL
            .get_or_init(|| Allocator::new(Registry::global()))
            .clone()
    }

    #[must_use]
    pub fn with_fairness(mut self, fairness: Arc<dyn FairnessPolicy>) -> Self {
        self.fairness = fairness;
        self
    }

    /// Replace the wait strategy used by blocking acquisition
    #[must_use]
    pub fn with_wait_strategy(mut self, waiter: Arc<dyn WaitStrategy>) -> Self {
        self.waiter = waiter;
        self
    }

    /// Set backoff bounds and reset blocking acquisition to a
    /// [`SignalWait`] using them
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self.waiter = Arc::new(SignalWait::new(Arc::clone(self.registry.signal()), backoff));
        self
    }

    #[must_use]
    pub fn with_events(mut self, sender: EventSender) -> Self {
        self.events = Some(sender);
        self
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    #[must_use]
    pub fn fairness(&self) -> &Arc<dyn FairnessPolicy> {
        &self.fairness
    }

    #[must_use]
    pub fn waiter(&self) -> &Arc<dyn WaitStrategy> {
        &self.waiter
    }

    #[must_use]
    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// New empty chord
    #[must_use]
    pub fn chord(&self) -> Chord {
        Chord::new(self.clone(), Vec::new())
    }

    /// New chord holding `requests`
    #[must_use]
    pub fn chord_of(&self, requests: impl IntoIterator<Item = Request>) -> Chord {
        Chord::new(self.clone(), requests.into_iter().collect())
    }

    /// Acquire `requests`, run `work`, release
    ///
    /// # Errors
    ///
    /// Returns acquisition errors or the error returned by `work`.
    pub fn with_resources<T, E, F>(
        &self,
        requests: impl IntoIterator<Item = Request>,
        work: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce(&Chord) -> std::result::Result<T, E>,
        E: From<chords_errors::Error>,
    {
        self.chord_of(requests).scoped(work)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chords_config::PoolConfig;
    use chords_resources::Resource;

    #[test]
    fn test_from_config_picks_policy() {
        let mut config = Config::default();
        config.fairness.policy = FairnessKind::StrictFifo;
        config.wait.timeout_ms = Some(250);
        let allocator = Allocator::from_config(&config, Arc::new(Registry::new()));
        assert_eq!(allocator.fairness().name(), "strict_fifo");
        assert_eq!(
            allocator.backoff().timeout,
            Some(std::time::Duration::from_millis(250))
        );
    }

    #[test]
    fn test_clones_share_registry() {
        let allocator = Allocator::new(Arc::new(Registry::new()));
        let clone = allocator.clone();
        clone.registry().register_default("slot").unwrap();
        assert!(allocator.registry().contains(&"slot".into()));
    }

    #[test]
    fn test_chord_of_keeps_request_order() {
        let allocator = Allocator::new(Arc::new(Registry::new()));
        let requests = vec![
            Request::exclusive("slot"),
            Request::shared("int").with("max_value", 3),
        ];
        let chord = allocator.chord_of(requests.clone());
        assert_eq!(chord.requests(), requests);
        assert!(!chord.is_satisfied());
        assert!(allocator.chord().requests().is_empty());
    }

    #[test]
    fn test_with_resources_round_trip() -> Result<()> {
        let registry = Registry::from_pool_configs(&[PoolConfig {
            class: "slot".into(),
            kind: chords_config::PoolKind::List,
            size: 1,
            key_attribute: None,
        }])?;
        let allocator = Allocator::new(Arc::new(registry));
        let value = allocator.with_resources([Request::exclusive("slot")], |chord| {
            assert!(chord.is_satisfied());
            Ok::<_, chords_errors::Error>(7)
        })?;
        assert_eq!(value, 7);
        let slot = allocator.registry().get_resource(&Request::exclusive("slot"))?;
        assert!(slot.state().is_idle());
        Ok(())
    }
}
