//! Pools: per-class resource collections with pluggable selection order
//!
//! Every pool answers [`Pool::find`] with a lazy sequence of resources that
//! can currently accept the request and match it. Variants differ in the
//! order they yield candidates and in how they store or create resources.

mod ephemeral;
mod keyed;
mod scored;
mod weighted;

pub use ephemeral::{EphemeralPool, ResourceFactory};
pub use keyed::{KeyFn, KeyedPool};
pub use scored::{RandomPool, RandomScore, ScoredPool, Scorer};
pub use weighted::WeightedRandomPool;

use crate::resource::Resource;
use chords_errors::{Error, RegistryError, Result};
use chords_types::{Request, ResourceClass};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Lazy candidate sequence produced by [`Pool::find`]
pub type Candidates = Box<dyn Iterator<Item = Arc<dyn Resource>> + Send>;

/// Collection of resources of one class
pub trait Pool: Send + Sync + fmt::Debug {
    /// Short name of the selection policy, used in events and errors
    fn kind(&self) -> &'static str;

    fn class(&self) -> &ResourceClass;

    /// Resources that can accept `request` and match it, in policy order
    fn find(self: Arc<Self>, request: &Request) -> Candidates;

    /// First candidate of [`Pool::find`]
    fn get(self: Arc<Self>, request: &Request) -> Option<Arc<dyn Resource>> {
        self.find(request).next()
    }

    /// # Errors
    ///
    /// Returns a registry error when the resource does not belong here or
    /// the pool cannot store resources.
    fn add(&self, resource: Arc<dyn Resource>) -> Result<()>;

    /// Remove the resource with the same identity as `resource`
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotInPool` when no such resource is stored.
    fn remove(&self, resource: &dyn Resource) -> Result<Arc<dyn Resource>>;

    /// Snapshot of every stored resource, acquirable or not
    fn resources(&self) -> Vec<Arc<dyn Resource>>;

    fn len(&self) -> usize {
        self.resources().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn eligible(resource: &dyn Resource, request: &Request) -> bool {
    resource.can_acquire(request) && resource.matches(request)
}

pub(crate) fn check_class(pool: &ResourceClass, resource: &dyn Resource) -> Result<()> {
    if resource.class() == pool {
        Ok(())
    } else {
        Err(RegistryError::WrongClass {
            expected: pool.to_string(),
            found: resource.class().to_string(),
            resource: resource.label(),
        }
        .into())
    }
}

pub(crate) fn not_in_pool(class: &ResourceClass, resource: &dyn Resource) -> Error {
    RegistryError::NotInPool {
        class: class.to_string(),
        resource: resource.label(),
    }
    .into()
}

/// Pool backed by a list; yields candidates in insertion order
#[derive(Debug)]
pub struct ListPool {
    class: ResourceClass,
    resources: RwLock<Vec<Arc<dyn Resource>>>,
}

impl ListPool {
    pub fn new(class: impl Into<ResourceClass>) -> Self {
        Self {
            class: class.into(),
            resources: RwLock::new(Vec::new()),
        }
    }

    /// Build a pool from existing resources
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::WrongClass` if any resource has another class.
    pub fn with_resources<I>(class: impl Into<ResourceClass>, resources: I) -> Result<Self>
    where
        I: IntoIterator<Item = Arc<dyn Resource>>,
    {
        let pool = Self::new(class);
        for resource in resources {
            pool.add(resource)?;
        }
        Ok(pool)
    }

    /// Eligible resources in storage order, collected eagerly
    pub(crate) fn eligible(&self, request: &Request) -> Vec<Arc<dyn Resource>> {
        self.resources
            .read()
            .iter()
            .filter(|r| eligible(r.as_ref(), request))
            .cloned()
            .collect()
    }
}

impl Pool for ListPool {
    fn kind(&self) -> &'static str {
        "list"
    }

    fn class(&self) -> &ResourceClass {
        &self.class
    }

    fn find(self: Arc<Self>, request: &Request) -> Candidates {
        let snapshot = self.resources.read().clone();
        let request = request.clone();
        Box::new(
            snapshot
                .into_iter()
                .filter(move |r| eligible(r.as_ref(), &request)),
        )
    }

    fn add(&self, resource: Arc<dyn Resource>) -> Result<()> {
        check_class(&self.class, resource.as_ref())?;
        self.resources.write().push(resource);
        Ok(())
    }

    fn remove(&self, resource: &dyn Resource) -> Result<Arc<dyn Resource>> {
        let identity = resource.identity();
        let mut resources = self.resources.write();
        let position = resources
            .iter()
            .position(|r| r.identity() == identity)
            .ok_or_else(|| not_in_pool(&self.class, resource))?;
        Ok(resources.remove(position))
    }

    fn resources(&self) -> Vec<Arc<dyn Resource>> {
        self.resources.read().clone()
    }

    fn len(&self) -> usize {
        self.resources.read().len()
    }
}
