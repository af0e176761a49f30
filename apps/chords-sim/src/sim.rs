//! Concurrent workload against a configured allocator

use crate::events::EventTally;
use chords_allocator::Allocator;
use chords_config::{PoolConfig, PoolKind};
use chords_errors::{AllocationError, Error};
use chords_types::{AccessMode, Attributes, Request};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::thread;
use std::time::{Duration, Instant};

/// Shape of one simulation run
#[derive(Debug, Clone)]
pub struct Workload {
    pub workers: usize,
    pub rounds: usize,
    pub hold: Duration,
    pub exclusive_ratio: f64,
    pub seed: Option<u64>,
}

/// Aggregated outcome of a run
#[derive(Debug, Default, Clone, Serialize)]
pub struct Summary {
    pub workers: usize,
    pub rounds: usize,
    pub acquisitions: u64,
    pub timeouts: u64,
    pub failures: u64,
    pub mean_wait_ms: f64,
    pub max_wait_ms: f64,
    pub elapsed_ms: f64,
    pub events: EventTally,
}

#[derive(Debug, Default)]
struct WorkerStats {
    acquisitions: u64,
    timeouts: u64,
    failures: u64,
    total_wait: Duration,
    max_wait: Duration,
}

/// Pool used when the configuration declares none
pub fn default_pools() -> Vec<PoolConfig> {
    vec![PoolConfig {
        class: "slot".into(),
        kind: PoolKind::List,
        size: 4,
        key_attribute: None,
    }]
}

/// Run `workload` on OS threads and wait for every worker
///
/// # Errors
///
/// Returns an internal error naming the first worker that panicked.
pub fn run_workload(
    allocator: &Allocator,
    pools: &[PoolConfig],
    workload: &Workload,
) -> Result<Summary, Error> {
    let started = Instant::now();
    let stats = thread::scope(|scope| {
        let handles: Vec<_> = (0..workload.workers)
            .map(|worker| {
                let rng = match workload.seed {
                    Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(worker as u64)),
                    None => StdRng::from_os_rng(),
                };
                scope.spawn(move || run_worker(allocator, pools, workload, worker, rng))
            })
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(worker, handle)| {
                handle.join().map_err(|_| {
                    tracing::error!(worker, "worker thread panicked");
                    Error::internal(format!("worker {worker} panicked"))
                })
            })
            .collect::<Vec<_>>()
    })
    .into_iter()
    .collect::<Result<Vec<WorkerStats>, Error>>()?;

    let mut summary = Summary {
        workers: workload.workers,
        rounds: workload.rounds,
        elapsed_ms: millis(started.elapsed()),
        ..Summary::default()
    };
    let mut total_wait = Duration::ZERO;
    let mut max_wait = Duration::ZERO;
    for worker in stats {
        summary.acquisitions += worker.acquisitions;
        summary.timeouts += worker.timeouts;
        summary.failures += worker.failures;
        total_wait += worker.total_wait;
        max_wait = max_wait.max(worker.max_wait);
    }
    if summary.acquisitions > 0 {
        #[allow(clippy::cast_precision_loss)]
        let mean = millis(total_wait) / summary.acquisitions as f64;
        summary.mean_wait_ms = mean;
    }
    summary.max_wait_ms = millis(max_wait);
    Ok(summary)
}

fn run_worker(
    allocator: &Allocator,
    pools: &[PoolConfig],
    workload: &Workload,
    worker: usize,
    mut rng: StdRng,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    for round in 0..workload.rounds {
        let requests = choose_requests(pools, workload.exclusive_ratio, &mut rng);
        let chord = allocator.chord_of(requests);
        let asked = Instant::now();
        let outcome = chord.scoped(|_| {
            let waited = asked.elapsed();
            thread::sleep(workload.hold);
            Ok::<_, Error>(waited)
        });
        match outcome {
            Ok(waited) => {
                stats.acquisitions += 1;
                stats.total_wait += waited;
                stats.max_wait = stats.max_wait.max(waited);
            }
            Err(Error::Allocation(AllocationError::WaitTimedOut { waited_ms })) => {
                tracing::debug!(worker, round, waited_ms, "acquisition timed out");
                stats.timeouts += 1;
            }
            Err(err) => {
                tracing::warn!(worker, round, error = %err, "acquisition failed");
                stats.failures += 1;
            }
        }
    }
    stats
}

/// One or two requests, each against a different randomly chosen pool
fn choose_requests(pools: &[PoolConfig], exclusive_ratio: f64, rng: &mut StdRng) -> Vec<Request> {
    let count = rng.random_range(1..=2).min(pools.len());
    index::sample(rng, pools.len(), count)
        .into_iter()
        .map(|i| {
            let pool = &pools[i];
            let mode = if rng.random_bool(exclusive_ratio) {
                AccessMode::Exclusive
            } else {
                AccessMode::Shared
            };
            let mut request = Request::new(pool.class.clone(), mode, Attributes::new());
            if pool.size > 0 && rng.random_bool(0.5) {
                let bound = i64::from(rng.random_range(1..=pool.size));
                request = match &pool.key_attribute {
                    Some(key) => request.with(key.clone(), bound),
                    None => request.with("max_value", bound),
                };
            }
            request
        })
        .collect()
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
