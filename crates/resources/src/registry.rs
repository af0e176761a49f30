//! Class to pool mapping shared by every allocation

use crate::pool::{Candidates, KeyedPool, ListPool, Pool, RandomPool, WeightedRandomPool};
use crate::resource::{BasicResource, Resource};
use crate::signal::ChangeSignal;
use chords_config::{PoolConfig, PoolKind};
use chords_errors::{AllocationError, ConfigError, RegistryError, Result};
use chords_events::{EventEmitter, EventSender, RegistryEvent};
use chords_types::{Request, ResourceClass};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();

/// Mapping from resource class to the pool serving it.
///
/// Holds at most one pool per class. Besides lookup, the registry owns the
/// allocation lock that serializes every read-then-acquire attempt, and the
/// change signal that wakes blocked allocations.
#[derive(Debug, Default)]
pub struct Registry {
    pools: RwLock<HashMap<ResourceClass, Arc<dyn Pool>>>,
    allocation_lock: Mutex<()>,
    signal: Arc<ChangeSignal>,
    events: Option<EventSender>,
}

impl EventEmitter for Registry {
    fn event_sender(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_events(mut self, sender: EventSender) -> Self {
        self.events = Some(sender);
        self
    }

    /// Process-wide registry, created empty on first use
    pub fn global() -> Arc<Registry> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Registry::new())))
    }

    /// Build a registry populated from `[[pools]]` declarations.
    ///
    /// Each pool gets `size` numbered resources valued `1..=size`. Weighted
    /// pools weigh resources by value; keyed pools also carry the value
    /// under their key attribute.
    ///
    /// # Errors
    ///
    /// Returns a registry error on duplicate classes.
    pub fn from_pool_configs(configs: &[PoolConfig]) -> Result<Self> {
        let registry = Self::new();
        registry.populate(configs)?;
        Ok(registry)
    }

    /// Register and fill the pools declared in `configs`
    ///
    /// # Errors
    ///
    /// Returns a registry error on duplicate classes, or
    /// `ConfigError::Invalid` for a keyed pool without a key attribute.
    pub fn populate(&self, configs: &[PoolConfig]) -> Result<()> {
        for config in configs {
            let class = config.class.clone();
            let pool: Arc<dyn Pool> = match (config.kind, &config.key_attribute) {
                (PoolKind::Keyed, Some(key)) => {
                    Arc::new(KeyedPool::new(class.clone(), key.clone()))
                }
                (PoolKind::Keyed, None) => {
                    return Err(ConfigError::Invalid {
                        message: format!("keyed pool {class} needs a key_attribute"),
                    }
                    .into());
                }
                (PoolKind::Random, _) => Arc::new(RandomPool::random(class.clone())),
                (PoolKind::Weighted, _) => Arc::new(WeightedRandomPool::with_scorer(
                    class.clone(),
                    weight_by_value,
                )),
                (PoolKind::List, _) => Arc::new(ListPool::new(class.clone())),
            };
            for value in 1..=i64::from(config.size) {
                let mut resource = BasicResource::numbered(class.clone(), value);
                if let Some(key) = config.key_attribute.as_deref().filter(|k| *k != "value") {
                    resource = resource.with_property(key, value);
                }
                pool.add(Arc::new(resource))?;
            }
            self.register(class, pool)?;
        }
        Ok(())
    }

    /// Register `pool` as the pool for `class`
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::AlreadyRegistered` if the class has a pool,
    /// or `RegistryError::WrongClass` if the pool serves another class.
    pub fn register(&self, class: impl Into<ResourceClass>, pool: Arc<dyn Pool>) -> Result<()> {
        let class = class.into();
        if *pool.class() != class {
            return Err(RegistryError::WrongClass {
                expected: class.to_string(),
                found: pool.class().to_string(),
                resource: format!("{} pool", pool.kind()),
            }
            .into());
        }
        let kind = pool.kind();
        {
            let mut pools = self.pools.write();
            if pools.contains_key(&class) {
                return Err(RegistryError::AlreadyRegistered {
                    class: class.to_string(),
                }
                .into());
            }
            pools.insert(class.clone(), pool);
        }
        self.emit_registry(RegistryEvent::PoolRegistered {
            class: class.to_string(),
            kind: kind.to_string(),
        });
        self.notify_changed();
        Ok(())
    }

    /// Register an empty list pool for `class`
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::AlreadyRegistered` if the class has a pool.
    pub fn register_default(&self, class: impl Into<ResourceClass>) -> Result<()> {
        let class = class.into();
        self.register(class.clone(), Arc::new(ListPool::new(class)))
    }

    /// # Errors
    ///
    /// Returns `RegistryError::UnknownClass` if no pool is registered.
    pub fn unregister(&self, class: &ResourceClass) -> Result<Arc<dyn Pool>> {
        let pool = self
            .pools
            .write()
            .remove(class)
            .ok_or_else(|| unknown_class(class))?;
        self.emit_registry(RegistryEvent::PoolUnregistered {
            class: class.to_string(),
        });
        Ok(pool)
    }

    /// Drop every registered pool
    pub fn clear(&self) {
        let removed: Vec<ResourceClass> = self.pools.write().drain().map(|(c, _)| c).collect();
        for class in removed {
            self.emit_registry(RegistryEvent::PoolUnregistered {
                class: class.to_string(),
            });
        }
    }

    /// # Errors
    ///
    /// Returns `RegistryError::UnknownClass` if no pool is registered.
    pub fn get_pool(&self, class: &ResourceClass) -> Result<Arc<dyn Pool>> {
        self.pools
            .read()
            .get(class)
            .cloned()
            .ok_or_else(|| unknown_class(class))
    }

    #[must_use]
    pub fn contains(&self, class: &ResourceClass) -> bool {
        self.pools.read().contains_key(class)
    }

    /// Registered classes, sorted
    #[must_use]
    pub fn classes(&self) -> Vec<ResourceClass> {
        let mut classes: Vec<_> = self.pools.read().keys().cloned().collect();
        classes.sort();
        classes
    }

    /// Candidates for `request` from the pool of its class
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::UnknownClass` if no pool is registered.
    pub fn find_resources(&self, request: &Request) -> Result<Candidates> {
        Ok(self.get_pool(request.class())?.find(request))
    }

    /// First candidate for `request`
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::UnknownClass` if no pool is registered, or
    /// `AllocationError::Unsatisfiable` if nothing matches.
    pub fn get_resource(&self, request: &Request) -> Result<Arc<dyn Resource>> {
        self.find_resources(request)?.next().ok_or_else(|| {
            AllocationError::Unsatisfiable {
                class: request.class().to_string(),
                request: request.to_string(),
            }
            .into()
        })
    }

    /// Add `resource` to the pool of its class and wake waiters
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::UnknownClass` or the pool's own refusal.
    pub fn add_resource(&self, resource: Arc<dyn Resource>) -> Result<()> {
        let pool = self.get_pool(resource.class())?;
        let label = resource.label();
        {
            let _guard = self.allocation_lock.lock();
            pool.add(resource)?;
        }
        self.emit_registry(RegistryEvent::ResourceAdded {
            class: pool.class().to_string(),
            resource: label,
        });
        self.notify_changed();
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `RegistryError::UnknownClass` or `RegistryError::NotInPool`.
    pub fn remove_resource(&self, resource: &dyn Resource) -> Result<Arc<dyn Resource>> {
        let pool = self.get_pool(resource.class())?;
        let removed = {
            let _guard = self.allocation_lock.lock();
            pool.remove(resource)?
        };
        self.emit_registry(RegistryEvent::ResourceRemoved {
            class: pool.class().to_string(),
            resource: removed.label(),
        });
        Ok(removed)
    }

    /// Exclusive section for one read-then-acquire allocation attempt
    pub fn lock_allocation(&self) -> MutexGuard<'_, ()> {
        self.allocation_lock.lock()
    }

    #[must_use]
    pub fn signal(&self) -> &Arc<ChangeSignal> {
        &self.signal
    }

    /// Wake everything waiting for resources to become available
    pub fn notify_changed(&self) {
        self.signal.notify();
    }
}

#[allow(clippy::cast_precision_loss)]
fn weight_by_value(resource: &dyn Resource, _request: &Request) -> f64 {
    resource
        .property("value")
        .and_then(chords_types::AttrValue::as_int)
        .map_or(1.0, |v| v as f64)
}

fn unknown_class(class: &ResourceClass) -> chords_errors::Error {
    RegistryError::UnknownClass {
        class: class.to_string(),
    }
    .into()
}
