//! Integration tests for events

#[cfg(test)]
mod tests {
    use chords_errors::AllocationError;
    use chords_events::*;

    #[tokio::test]
    async fn test_event_sender_emit() {
        let (tx, mut rx) = channel();

        tx.emit_allocation(AllocationEvent::Queued { chord: 1, pending: 3 });
        tx.emit_fairness(FairnessEvent::PassSkipped {
            reason: SkipReason::TooSoon,
        });

        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first,
            AppEvent::Allocation(AllocationEvent::Queued { chord: 1, pending: 3 })
        ));

        let second = rx.recv().await.unwrap();
        assert!(matches!(second, AppEvent::Fairness(FairnessEvent::PassSkipped { .. })));
    }

    #[tokio::test]
    async fn test_dropped_receiver() {
        let (tx, rx) = channel();
        drop(rx);

        // Should not panic when receiver is dropped
        tx.emit_registry(RegistryEvent::PoolUnregistered {
            class: "slot".into(),
        });
    }

    #[test]
    fn test_missing_sender_is_silent() {
        let sender: Option<EventSender> = None;
        sender.emit_allocation(AllocationEvent::Released { chord: 9, count: 0 });
    }

    #[test]
    fn test_log_levels() {
        let failure = FailureContext::from_error(&AllocationError::WaitTimedOut { waited_ms: 5 });
        assert_eq!(failure.code.as_deref(), Some("allocation.wait_timed_out"));
        assert!(failure.retryable);

        let failed = AppEvent::Allocation(AllocationEvent::Failed { chord: 1, failure });
        assert_eq!(failed.log_level(), tracing::Level::ERROR);
        assert_eq!(failed.log_target(), "chords::events::allocation");

        let noisy_pass = AppEvent::Fairness(FairnessEvent::PassCompleted {
            policy: "best_effort".into(),
            allocated: 1,
            failed: 2,
            held_back: 0,
        });
        assert_eq!(noisy_pass.log_level(), tracing::Level::WARN);
    }

    #[test]
    fn test_event_serialization() {
        let event = AppEvent::Registry(RegistryEvent::PoolRegistered {
            class: "slot".into(),
            kind: "list".into(),
        });
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"domain":"registry","event":{"type":"PoolRegistered","class":"slot","kind":"list"}}"#
        );
    }
}
