use super::{check_class, eligible, not_in_pool, Candidates, Pool};
use crate::resource::Resource;
use chords_errors::{RegistryError, Result};
use chords_types::{AttrValue, Request, ResourceClass};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

/// Extracts the index key of a resource
pub type KeyFn = Arc<dyn Fn(&dyn Resource) -> Option<AttrValue> + Send + Sync>;

/// Pool indexed by a per-resource key.
///
/// A request carrying the key attribute is answered by a direct lookup;
/// any other request scans every resource in key order.
pub struct KeyedPool {
    class: ResourceClass,
    key_attribute: String,
    key_fn: KeyFn,
    resources: DashMap<AttrValue, Arc<dyn Resource>>,
}

impl KeyedPool {
    /// Pool keyed by the resource property named `key_attribute`
    pub fn new(class: impl Into<ResourceClass>, key_attribute: impl Into<String>) -> Self {
        let key_attribute = key_attribute.into();
        let property = key_attribute.clone();
        Self::with_key_fn(class, key_attribute, move |r: &dyn Resource| {
            r.property(&property).cloned()
        })
    }

    /// Pool keyed by a custom extractor; requests still look up by
    /// `key_attribute`
    pub fn with_key_fn<F>(
        class: impl Into<ResourceClass>,
        key_attribute: impl Into<String>,
        key_fn: F,
    ) -> Self
    where
        F: Fn(&dyn Resource) -> Option<AttrValue> + Send + Sync + 'static,
    {
        Self {
            class: class.into(),
            key_attribute: key_attribute.into(),
            key_fn: Arc::new(key_fn),
            resources: DashMap::new(),
        }
    }

    #[must_use]
    pub fn key_attribute(&self) -> &str {
        &self.key_attribute
    }

    /// Stored resource under `key`, regardless of availability
    #[must_use]
    pub fn get_by_key(&self, key: &AttrValue) -> Option<Arc<dyn Resource>> {
        self.resources.get(key).map(|r| Arc::clone(r.value()))
    }

    fn key_of(&self, resource: &dyn Resource) -> Result<AttrValue> {
        (self.key_fn)(resource).ok_or_else(|| {
            RegistryError::MissingKey {
                class: self.class.to_string(),
                key_attribute: self.key_attribute.clone(),
                resource: resource.label(),
            }
            .into()
        })
    }
}

impl fmt::Debug for KeyedPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedPool")
            .field("class", &self.class)
            .field("key_attribute", &self.key_attribute)
            .field("len", &self.resources.len())
            .finish_non_exhaustive()
    }
}

impl Pool for KeyedPool {
    fn kind(&self) -> &'static str {
        "keyed"
    }

    fn class(&self) -> &ResourceClass {
        &self.class
    }

    fn find(self: Arc<Self>, request: &Request) -> Candidates {
        if let Some(key) = request.attribute(&self.key_attribute) {
            let found = self
                .get_by_key(key)
                .filter(|r| eligible(r.as_ref(), request));
            return Box::new(found.into_iter());
        }
        let mut entries: Vec<(AttrValue, Arc<dyn Resource>)> = self
            .resources
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let request = request.clone();
        Box::new(
            entries
                .into_iter()
                .map(|(_, r)| r)
                .filter(move |r| eligible(r.as_ref(), &request)),
        )
    }

    fn add(&self, resource: Arc<dyn Resource>) -> Result<()> {
        check_class(&self.class, resource.as_ref())?;
        let key = self.key_of(resource.as_ref())?;
        match self.resources.entry(key) {
            Entry::Occupied(entry) => Err(RegistryError::KeyConflict {
                class: self.class.to_string(),
                key: entry.key().to_string(),
            }
            .into()),
            Entry::Vacant(entry) => {
                entry.insert(resource);
                Ok(())
            }
        }
    }

    fn remove(&self, resource: &dyn Resource) -> Result<Arc<dyn Resource>> {
        let key = self.key_of(resource)?;
        let identity = resource.identity();
        self.resources
            .remove_if(&key, |_, stored| stored.identity() == identity)
            .map(|(_, stored)| stored)
            .ok_or_else(|| not_in_pool(&self.class, resource))
    }

    fn resources(&self) -> Vec<Arc<dyn Resource>> {
        let mut entries: Vec<_> = self
            .resources
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.into_iter().map(|(_, r)| r).collect()
    }

    fn len(&self) -> usize {
        self.resources.len()
    }
}
