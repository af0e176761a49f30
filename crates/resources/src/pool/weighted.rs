use super::{Candidates, ListPool, Pool, Scorer};
use crate::resource::Resource;
use chords_errors::Result;
use chords_types::{Request, ResourceClass};
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::Arc;

/// Request attribute naming a registered weight function
pub const SCORER_ATTRIBUTE: &str = "scorer";

/// Pool ordering candidates by weighted random sampling.
///
/// Each candidate's weight comes from a [`Scorer`]; higher weights are more
/// likely, not certain, to come first. Requests choose a registered weight
/// function by name through the `scorer` attribute, otherwise the pool
/// default applies. Weights that are not finite and positive sort last.
pub struct WeightedRandomPool {
    list: ListPool,
    default_scorer: Arc<dyn Scorer>,
    scorers: DashMap<String, Arc<dyn Scorer>>,
    rng: Mutex<StdRng>,
}

impl WeightedRandomPool {
    /// Pool with uniform weights
    pub fn new(class: impl Into<ResourceClass>) -> Self {
        Self::with_scorer(class, |_: &dyn Resource, _: &Request| 1.0)
    }

    pub fn with_scorer(class: impl Into<ResourceClass>, scorer: impl Scorer + 'static) -> Self {
        Self {
            list: ListPool::new(class),
            default_scorer: Arc::new(scorer),
            scorers: DashMap::new(),
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Reseed the sampler for reproducible orderings
    #[must_use]
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    /// Make `scorer` selectable by requests carrying `scorer = name`
    pub fn register_scorer(&self, name: impl Into<String>, scorer: impl Scorer + 'static) {
        self.scorers.insert(name.into(), Arc::new(scorer));
    }

    fn scorer_for(&self, request: &Request) -> Arc<dyn Scorer> {
        let Some(name) = request.attributes().get_str(SCORER_ATTRIBUTE) else {
            return Arc::clone(&self.default_scorer);
        };
        if let Some(scorer) = self.scorers.get(name) {
            Arc::clone(scorer.value())
        } else {
            tracing::warn!(
                target: "chords::pool",
                class = %self.list.class(),
                scorer = name,
                "unknown scorer requested, using pool default"
            );
            Arc::clone(&self.default_scorer)
        }
    }
}

fn sample_key(rng: &mut StdRng, weight: f64) -> f64 {
    if !weight.is_finite() || weight <= 0.0 {
        return -1.0;
    }
    let u: f64 = rng.random();
    u.powf(weight.recip())
}

impl fmt::Debug for WeightedRandomPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeightedRandomPool")
            .field("list", &self.list)
            .field("scorers", &self.scorers.len())
            .finish_non_exhaustive()
    }
}

impl Pool for WeightedRandomPool {
    fn kind(&self) -> &'static str {
        "weighted"
    }

    fn class(&self) -> &ResourceClass {
        self.list.class()
    }

    fn find(self: Arc<Self>, request: &Request) -> Candidates {
        let scorer = self.scorer_for(request);
        let candidates = self.list.eligible(request);
        let weights: Vec<f64> = candidates
            .iter()
            .map(|r| scorer.score(r.as_ref(), request))
            .collect();
        let mut keyed: Vec<_> = {
            let mut rng = self.rng.lock();
            weights
                .into_iter()
                .map(|w| sample_key(&mut rng, w))
                .zip(candidates)
                .collect()
        };
        keyed.sort_by(|a, b| b.0.total_cmp(&a.0));
        Box::new(keyed.into_iter().map(|(_, r)| r))
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
