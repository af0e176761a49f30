//! Integration tests for chords: allocation, waiting, fairness and scopes

use chords_allocator::{
    Allocator, Backoff, BestEffortFairness, Chord, FairnessPolicy, ManualClock, StrictFifoFairness,
    WaitStrategy,
};
use chords_errors::{AllocationError, Error, Result};
use chords_events::{AllocationEvent, AppEvent};
use chords_resources::{BasicResource, Pool, ProxyResource, Registry, Resource, WeightedRandomPool};
use chords_types::{Attributes, Request};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn int_allocator(n: i64) -> Allocator {
    let registry = Arc::new(Registry::new());
    registry.register_default("int").unwrap();
    for value in 1..=n {
        registry
            .add_resource(Arc::new(BasicResource::numbered("int", value)))
            .unwrap();
    }
    Allocator::new(registry).with_backoff(Backoff {
        initial: Duration::from_millis(1),
        max: Duration::from_millis(10),
        timeout: Some(Duration::from_secs(10)),
    })
}

fn values(chord: &Chord) -> BTreeSet<i64> {
    chord
        .find("int", &Attributes::new())
        .unwrap()
        .iter()
        .map(|r| r.property("value").and_then(|v| v.as_int()).unwrap())
        .collect()
}

#[test]
fn test_identical_requests_get_distinct_resources() {
    let allocator = int_allocator(99);
    let request = Request::shared("int").with("max_value", 2);
    let chord = allocator.chord_of([request.clone(), request]);
    assert!(chord.try_allocate().unwrap());
    assert_eq!(values(&chord), BTreeSet::from([1, 2]));
    chord.release().unwrap();
    assert!(!chord.is_satisfied());
}

#[test]
fn test_range_requests_cover_the_range() {
    let allocator = int_allocator(99);
    let request = Request::shared("int").with("min_value", 5).with("max_value", 10);
    let chord = allocator.chord_of(std::iter::repeat_n(request, 6));
    chord.acquire_blocking().unwrap();
    assert_eq!(values(&chord), (5..=10).collect());

    let seventh = allocator.chord_of([Request::exclusive("int")
        .with("min_value", 5)
        .with("max_value", 10)]);
    assert!(!seventh.try_allocate().unwrap());
}

#[test]
fn test_all_or_nothing() {
    let allocator = int_allocator(2);
    let holder = allocator.chord_of([Request::exclusive("int").with("value", 2)]);
    holder.acquire_blocking().unwrap();

    let chord = allocator.chord_of([
        Request::exclusive("int").with("value", 1),
        Request::exclusive("int").with("value", 2),
    ]);
    assert!(!chord.try_allocate().unwrap());
    let one = allocator
        .registry()
        .get_resource(&Request::exclusive("int").with("value", 1))
        .unwrap();
    assert!(one.state().is_idle());

    holder.release().unwrap();
    assert!(chord.try_allocate().unwrap());
    assert_eq!(chord.allocation().unwrap().len(), 2);
}

#[test]
fn test_state_reflects_modes_and_release_restores() {
    let allocator = int_allocator(1);
    let shared = allocator.chord_of([Request::shared("int")]);
    let also_shared = allocator.chord_of([Request::shared("int")]);
    shared.acquire_blocking().unwrap();
    also_shared.acquire_blocking().unwrap();
    let resource = shared.get("int", &Attributes::new()).unwrap();
    assert_eq!(resource.state().shared_count(), 2);
    assert!(also_shared.holds(resource.as_ref()));

    let exclusive = allocator.chord_of([Request::exclusive("int")]);
    assert!(!exclusive.try_allocate().unwrap());
    shared.release().unwrap();
    also_shared.release().unwrap();
    assert!(resource.state().is_idle());
    assert!(exclusive.try_allocate().unwrap());
    assert!(resource.state().is_exclusive());
}

#[test]
fn test_exclusive_waits_for_holder() {
    let allocator = int_allocator(1);
    let holder = allocator.chord_of([Request::exclusive("int")]);
    holder.acquire_blocking().unwrap();

    let waiter = allocator.chord_of([Request::exclusive("int")]);
    let handle = {
        let waiter = waiter.clone();
        thread::spawn(move || waiter.acquire_blocking())
    };
    thread::sleep(Duration::from_millis(30));
    assert!(!waiter.is_satisfied());
    assert_eq!(allocator.fairness().pending(), 1);

    holder.release().unwrap();
    handle.join().unwrap().unwrap();
    assert!(waiter.is_satisfied());
    assert_eq!(allocator.fairness().pending(), 0);
}

/// Wait primitive that frees the blocking holder the first time it has to wait
#[derive(Debug)]
struct ReleaseOnWait {
    holder: Chord,
    calls: AtomicUsize,
}

impl WaitStrategy for ReleaseOnWait {
    fn wait_until(&self, predicate: &mut dyn FnMut() -> Result<bool>) -> Result<()> {
        loop {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if predicate()? {
                return Ok(());
            }
            self.holder.release()?;
        }
    }
}

#[test]
fn test_injected_wait_strategy() {
    let allocator = int_allocator(1);
    let holder = allocator.chord_of([Request::exclusive("int")]);
    holder.acquire_blocking().unwrap();
    let strategy = Arc::new(ReleaseOnWait {
        holder: holder.clone(),
        calls: AtomicUsize::new(0),
    });
    let allocator = allocator.with_wait_strategy(strategy.clone());

    let chord = allocator.chord_of([Request::exclusive("int")]);
    chord.acquire_blocking().unwrap();
    assert!(chord.is_satisfied());
    assert!(!holder.is_satisfied());
    assert_eq!(strategy.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_get_ambiguous_then_disambiguated() {
    let allocator = int_allocator(99);
    let request = Request::shared("int").with("max_value", 2);
    let chord = allocator.chord_of([request.clone(), request]);
    chord.acquire_blocking().unwrap();

    let err = chord.get("int", &Attributes::new()).unwrap_err();
    assert!(matches!(
        err,
        Error::Allocation(AllocationError::Ambiguous { count: 2, .. })
    ));
    let one = chord
        .get("int", &Attributes::new().with("max_value", 1))
        .unwrap();
    assert_eq!(one.property("value").and_then(|v| v.as_int()), Some(1));
    let err = chord
        .get("int", &Attributes::new().with("min_value", 50))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Allocation(AllocationError::NotFound { .. })
    ));
}

#[test]
fn test_unsatisfied_chord_rejects_queries() {
    let allocator = int_allocator(1);
    let chord = allocator.chord_of([Request::shared("int")]);
    assert!(matches!(
        chord.find("int", &Attributes::new()).unwrap_err(),
        Error::Allocation(AllocationError::NotSatisfied)
    ));
    chord.release().unwrap();

    chord.acquire_blocking().unwrap();
    assert!(matches!(
        chord.add_request(Request::shared("int")).unwrap_err(),
        Error::Allocation(AllocationError::AlreadySatisfied)
    ));
    chord.release().unwrap();
    chord.add_request(Request::shared("int")).unwrap();
    assert_eq!(chord.requests().len(), 2);
}

#[test]
fn test_error_inside_scope_releases() {
    let allocator = int_allocator(99);
    let request = Request::shared("int").with("max_value", 2);
    let chord = allocator.chord_of([request.clone(), request]);
    let result: std::result::Result<(), Error> = chord.scoped(|chord| {
        assert!(chord.is_satisfied());
        Err(Error::task("work failed"))
    });
    assert_eq!(result.unwrap_err(), Error::task("work failed"));
    assert!(!chord.is_satisfied());
    for value in [1, 2] {
        let resource = allocator
            .registry()
            .get_resource(&Request::shared("int").with("value", value))
            .unwrap();
        assert!(resource.state().is_idle());
    }
}

#[test]
fn test_panic_inside_guard_releases() {
    let allocator = int_allocator(1);
    let chord = allocator.chord_of([Request::exclusive("int")]);
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _guard = chord.enter().unwrap();
        panic!("work panicked");
    }));
    assert!(outcome.is_err());
    assert!(!chord.is_satisfied());
    assert!(allocator.chord_of([Request::exclusive("int")]).try_allocate().unwrap());
}

#[test]
fn test_timeout_leaves_queue_clean() {
    let allocator = int_allocator(1).with_backoff(Backoff {
        initial: Duration::from_millis(1),
        max: Duration::from_millis(5),
        timeout: Some(Duration::from_millis(30)),
    });
    let holder = allocator.chord_of([Request::exclusive("int")]);
    holder.acquire_blocking().unwrap();

    let chord = allocator.chord_of([Request::exclusive("int")]);
    let err = chord.acquire_blocking().unwrap_err();
    assert!(matches!(
        err,
        Error::Allocation(AllocationError::WaitTimedOut { .. })
    ));
    assert_eq!(allocator.fairness().pending(), 0);
    assert!(!chord.is_satisfied());
}

#[test]
fn test_unknown_class_surfaces() {
    let allocator = int_allocator(1);
    let chord = allocator.chord_of([Request::shared("missing")]);
    assert!(chord.acquire_blocking().unwrap_err().is_unknown_class());
}

#[test]
fn test_strict_fifo_serves_in_arrival_order() {
    let clock = Arc::new(ManualClock::new());
    let fairness: Arc<dyn FairnessPolicy> =
        Arc::new(StrictFifoFairness::new().with_clock(clock.clone()));
    let allocator = int_allocator(1).with_fairness(Arc::clone(&fairness));
    let holder = allocator.chord_of([Request::exclusive("int")]);
    holder.acquire_blocking().unwrap();

    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for n in 0..3 {
        let chord = allocator.chord_of([Request::exclusive("int")]);
        let order = Arc::clone(&order);
        handles.push(thread::spawn(move || {
            chord.acquire_blocking().unwrap();
            order.lock().push(n);
            chord.release().unwrap();
        }));
        while fairness.pending() < n + 1 {
            thread::sleep(Duration::from_millis(1));
        }
    }
    holder.release().unwrap();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(*order.lock(), vec![0, 1, 2]);
}

#[test]
fn test_best_effort_pass_skips_when_too_soon() {
    let clock = Arc::new(ManualClock::new());
    let fairness = Arc::new(
        BestEffortFairness::new()
            .with_clock(clock.clone())
            .with_min_interval(Duration::from_secs(60)),
    );
    let allocator = int_allocator(1).with_fairness(fairness.clone());
    let holder = allocator.chord_of([Request::exclusive("int")]);
    holder.acquire_blocking().unwrap();

    // start the pacing window at virtual time zero
    let probe = allocator.chord_of([Request::exclusive("int")]);
    fairness.add(&probe);
    assert_eq!(fairness.run_pass().skipped, None);
    fairness.remove(probe.id());

    let waiter = allocator.chord_of([Request::exclusive("int")]);
    let handle = {
        let waiter = waiter.clone();
        thread::spawn(move || waiter.acquire_blocking())
    };
    while fairness.pending() == 0 {
        thread::sleep(Duration::from_millis(1));
    }
    holder.release().unwrap();
    thread::sleep(Duration::from_millis(30));
    assert!(!waiter.is_satisfied());

    clock.advance(Duration::from_secs(60));
    handle.join().unwrap().unwrap();
    assert!(waiter.is_satisfied());
}

#[test]
fn test_weighted_pool_biases_allocation() {
    let registry = Arc::new(Registry::new());
    #[allow(clippy::cast_precision_loss)]
    let pool = WeightedRandomPool::with_scorer("int", |r: &dyn Resource, _: &Request| {
        r.property("value").and_then(|v| v.as_int()).unwrap_or(0) as f64
    })
    .with_seed(99);
    for value in 1..=4 {
        pool.add(Arc::new(BasicResource::numbered("int", value))).unwrap();
    }
    registry.register("int", Arc::new(pool)).unwrap();
    let allocator = Allocator::new(registry);

    let trials = 1000;
    let mut top = 0;
    for _ in 0..trials {
        let chord = allocator.chord_of([Request::exclusive("int")]);
        chord.acquire_blocking().unwrap();
        if values_of(&chord) == 4 {
            top += 1;
        }
        chord.release().unwrap();
    }
    // weight 4 of 10 against a uniform quarter
    assert!(top > trials * 3 / 10, "top value first {top} times");
    assert!(top < trials);
}

fn values_of(chord: &Chord) -> i64 {
    chord
        .get("int", &Attributes::new())
        .unwrap()
        .property("value")
        .and_then(|v| v.as_int())
        .unwrap()
}

#[test]
fn test_proxy_resources_are_held() {
    #[derive(Debug)]
    struct Connection(&'static str);

    let registry = Arc::new(Registry::new());
    registry.register_default("db").unwrap();
    let primary = Arc::new(ProxyResource::with_class(Arc::new(Connection("primary")), "db"));
    registry.add_resource(primary.clone()).unwrap();
    let allocator = Allocator::new(registry);

    let chord = allocator.chord_of([Request::exclusive("db")]);
    chord.acquire_blocking().unwrap();
    assert!(chord.holds(primary.as_ref()));
    assert_eq!(primary.0, "primary");
    assert!(chord.to_string().contains(" satisfied "));
}

#[test]
fn test_events_follow_lifecycle() {
    let (sender, mut receiver) = chords_events::channel();
    let allocator = int_allocator(1).with_events(sender);
    let chord = allocator.chord_of([Request::shared("int")]);
    chord.acquire_blocking().unwrap();
    chord.release().unwrap();

    let mut kinds = Vec::new();
    while let Ok(AppEvent::Allocation(event)) = receiver.try_recv() {
        kinds.push(match event {
            AllocationEvent::Requested { .. } => "requested",
            AllocationEvent::Allocated { .. } => "allocated",
            AllocationEvent::Released { .. } => "released",
            _ => "other",
        });
    }
    assert_eq!(kinds, vec!["requested", "allocated", "released"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_acquire_waits_for_release() {
    let allocator = int_allocator(1);
    let holder = allocator.chord_of([Request::exclusive("int")]);
    holder.acquire_blocking().unwrap();

    let waiter = allocator.chord_of([Request::exclusive("int")]);
    let task = {
        let waiter = waiter.clone();
        tokio::spawn(async move { waiter.acquire_async().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_satisfied());
    holder.release().unwrap();
    task.await.unwrap().unwrap();
    assert!(waiter.is_satisfied());
}

#[tokio::test]
async fn test_cancelled_async_acquire_dequeues() {
    let allocator = int_allocator(1);
    let holder = allocator.chord_of([Request::exclusive("int")]);
    holder.acquire_blocking().unwrap();

    let waiter = allocator.chord_of([Request::exclusive("int")]);
    let outcome = tokio::time::timeout(Duration::from_millis(20), waiter.acquire_async()).await;
    assert!(outcome.is_err());
    assert_eq!(allocator.fairness().pending(), 0);

    holder.release().unwrap();
    assert!(!waiter.is_satisfied());
    let guard = waiter.enter_async().await.unwrap();
    assert!(guard.is_satisfied());
    drop(guard);
    assert!(!waiter.is_satisfied());
}

#[tokio::test]
async fn test_cancel_after_grant_releases_resources() {
    let (sender, mut receiver) = chords_events::channel();
    let allocator = int_allocator(1).with_events(sender);
    let holder = allocator.chord_of([Request::exclusive("int")]);
    holder.acquire_blocking().unwrap();

    let waiter = allocator.chord_of([Request::exclusive("int")]);
    let mut acquire = Box::pin(waiter.acquire_async());
    tokio::select! {
        biased;
        _ = &mut acquire => panic!("acquired while the holder still held the resource"),
        () = tokio::time::sleep(Duration::from_millis(5)) => {}
    }
    assert_eq!(allocator.fairness().pending(), 1);

    holder.release().unwrap();
    let outcome = allocator.fairness().run_pass();
    assert_eq!(outcome.allocated, 1);
    assert!(waiter.is_satisfied());

    drop(acquire);
    assert!(!waiter.is_satisfied());
    assert_eq!(allocator.fairness().pending(), 0);
    let slot = allocator
        .registry()
        .get_resource(&Request::exclusive("int"))
        .unwrap();
    assert!(slot.state().is_idle());

    let mut cancelled = false;
    while let Ok(event) = receiver.try_recv() {
        if let AppEvent::Allocation(AllocationEvent::Failed { chord, failure }) = event {
            cancelled |= chord == waiter.id().get()
                && failure.code.as_deref() == Some("allocation.cancelled");
        }
    }
    assert!(cancelled);
}
