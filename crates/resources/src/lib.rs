#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Resource inventory for chords
//!
//! This crate provides the allocatable side of the engine: the per-resource
//! shared/exclusive state machine, resource implementations, the pool family
//! with its selection policies, and the registry mapping resource classes to
//! pools.

pub mod matcher;
pub mod pool;
pub mod proxy;
pub mod registry;
pub mod resource;
pub mod signal;
pub mod state;

pub use matcher::Matcher;
pub use pool::{
    Candidates, EphemeralPool, KeyFn, KeyedPool, ListPool, Pool, RandomPool, RandomScore,
    ResourceFactory, ScoredPool, Scorer, WeightedRandomPool,
};
pub use proxy::ProxyResource;
pub use registry::Registry;
pub use resource::{BasicResource, Resource};
pub use signal::ChangeSignal;
pub use state::{ResourceId, ResourceState};
