use super::{Candidates, ListPool, Pool};
use crate::resource::Resource;
use chords_errors::Result;
use chords_types::{Request, ResourceClass};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::Arc;

/// Ranks a candidate for a request; lower scores are offered first
pub trait Scorer: Send + Sync {
    fn score(&self, resource: &dyn Resource, request: &Request) -> f64;

    fn kind(&self) -> &'static str {
        "scored"
    }
}

impl<F> Scorer for F
where
    F: Fn(&dyn Resource, &Request) -> f64 + Send + Sync,
{
    fn score(&self, resource: &dyn Resource, request: &Request) -> f64 {
        self(resource, request)
    }
}

/// Uniform random draw per candidate per call
#[derive(Debug)]
pub struct RandomScore {
    rng: Mutex<StdRng>,
}

impl RandomScore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomScore {
    fn default() -> Self {
        Self::new()
    }
}

impl Scorer for RandomScore {
    fn score(&self, _resource: &dyn Resource, _request: &Request) -> f64 {
        self.rng.lock().random::<f64>()
    }

    fn kind(&self) -> &'static str {
        "random"
    }
}

/// List pool whose candidates are sorted by a [`Scorer`]
pub struct ScoredPool<S> {
    list: ListPool,
    scorer: S,
}

/// Pool offering candidates in a fresh random order on every call
pub type RandomPool = ScoredPool<RandomScore>;

impl<S: Scorer> ScoredPool<S> {
    pub fn new(class: impl Into<ResourceClass>, scorer: S) -> Self {
        Self {
            list: ListPool::new(class),
            scorer,
        }
    }

    pub fn scorer(&self) -> &S {
        &self.scorer
    }
}

impl ScoredPool<RandomScore> {
    pub fn random(class: impl Into<ResourceClass>) -> Self {
        Self::new(class, RandomScore::new())
    }

    pub fn random_seeded(class: impl Into<ResourceClass>, seed: u64) -> Self {
        Self::new(class, RandomScore::with_seed(seed))
    }
}

impl<S> fmt::Debug for ScoredPool<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScoredPool")
            .field("list", &self.list)
            .finish_non_exhaustive()
    }
}

impl<S: Scorer + 'static> Pool for ScoredPool<S> {
    fn kind(&self) -> &'static str {
        self.scorer.kind()
    }

    fn class(&self) -> &ResourceClass {
        self.list.class()
    }

    fn find(self: Arc<Self>, request: &Request) -> Candidates {
        let mut scored: Vec<_> = self
            .list
            .eligible(request)
            .into_iter()
            .map(|r| (self.scorer.score(r.as_ref(), request), r))
            .collect();
        // stable, so equal scores keep storage order
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        Box::new(scored.into_iter().map(|(_, r)| r))
    }

    fn add(&self, resource: Arc<dyn Resource>) -> Result<()> {
        self.list.add(resource)
    }

    fn remove(&self, resource: &dyn Resource) -> Result<Arc<dyn Resource>> {
        self.list.remove(resource)
    }

    fn resources(&self) -> Vec<Arc<dyn Resource>> {
        self.list.resources()
    }

    fn len(&self) -> usize {
        self.list.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::BasicResource;

    fn value(resource: &dyn Resource) -> i64 {
        resource.property("value").and_then(|v| v.as_int()).unwrap_or(0)
    }

    fn filled<S: Scorer + 'static>(pool: ScoredPool<S>, n: i64) -> Arc<ScoredPool<S>> {
        for i in 1..=n {
            pool.add(Arc::new(BasicResource::numbered("int", i))).unwrap();
        }
        Arc::new(pool)
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn test_scorer_orders_candidates() {
        let pool = filled(
            ScoredPool::new("int", |r: &dyn Resource, _: &Request| -(value(r) as f64)),
            5,
        );
        let values: Vec<_> = pool
            .find(&Request::shared("int"))
            .map(|r| value(r.as_ref()))
            .collect();
        assert_eq!(values, vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_random_pool_yields_every_candidate() {
        let pool = filled(RandomPool::random_seeded("int", 7), 20);
        assert_eq!(pool.kind(), "random");
        let mut values: Vec<_> = Arc::clone(&pool)
            .find(&Request::shared("int").with("max_value", 10))
            .map(|r| value(r.as_ref()))
            .collect();
        values.sort_unstable();
        assert_eq!(values, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_random_pool_order_varies() {
        let pool = filled(RandomPool::random_seeded("int", 42), 20);
        let request = Request::shared("int");
        let first: Vec<_> = Arc::clone(&pool).find(&request).map(|r| value(r.as_ref())).collect();
        let varied = (0..10).any(|_| {
            let next: Vec<_> = Arc::clone(&pool).find(&request).map(|r| value(r.as_ref())).collect();
            next != first
        });
        assert!(varied);
    }
}
