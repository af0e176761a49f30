use super::{Candidates, Pool};
use crate::resource::Resource;
use chords_errors::{RegistryError, Result};
use chords_types::{Request, ResourceClass};
use std::fmt;
use std::iter;
use std::sync::Arc;

/// Manufactures a new resource for a request
pub trait ResourceFactory: Send + Sync {
    fn create(&self, request: &Request) -> Option<Arc<dyn Resource>>;
}

impl<F> ResourceFactory for F
where
    F: Fn(&Request) -> Option<Arc<dyn Resource>> + Send + Sync,
{
    fn create(&self, request: &Request) -> Option<Arc<dyn Resource>> {
        self(request)
    }
}

/// Pool without storage: every pull from [`Pool::find`] creates a fresh
/// resource. The sequence ends when the factory returns `None`.
pub struct EphemeralPool<F> {
    class: ResourceClass,
    factory: F,
}

impl<F: ResourceFactory> EphemeralPool<F> {
    pub fn new(class: impl Into<ResourceClass>, factory: F) -> Self {
        Self {
            class: class.into(),
            factory,
        }
    }
}

fn unsupported(operation: &str) -> chords_errors::Error {
    RegistryError::UnsupportedOperation {
        pool: "ephemeral".to_string(),
        operation: operation.to_string(),
    }
    .into()
}

impl<F> fmt::Debug for EphemeralPool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralPool")
            .field("class", &self.class)
            .finish_non_exhaustive()
    }
}

impl<F: ResourceFactory + 'static> Pool for EphemeralPool<F> {
    fn kind(&self) -> &'static str {
        "ephemeral"
    }

    fn class(&self) -> &ResourceClass {
        &self.class
    }

    fn find(self: Arc<Self>, request: &Request) -> Candidates {
        let request = request.clone();
        Box::new(iter::from_fn(move || self.factory.create(&request)))
    }

    fn add(&self, _resource: Arc<dyn Resource>) -> Result<()> {
        Err(unsupported("add"))
    }

    fn remove(&self, _resource: &dyn Resource) -> Result<Arc<dyn Resource>> {
        Err(unsupported("remove"))
    }

    fn resources(&self) -> Vec<Arc<dyn Resource>> {
        Vec::new()
    }

    fn len(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::BasicResource;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn ticks() -> Arc<EphemeralPool<impl ResourceFactory>> {
        let counter = AtomicI64::new(0);
        Arc::new(EphemeralPool::new(
            "tick",
            move |_: &Request| -> Option<Arc<dyn Resource>> {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Some(Arc::new(BasicResource::new("tick").with_property("n", n)))
            },
        ))
    }

    #[test]
    fn test_every_pull_creates_a_resource() {
        let pool = ticks();
        let made: Vec<_> = Arc::clone(&pool)
            .find(&Request::exclusive("tick"))
            .take(3)
            .map(|r| r.property("n").and_then(|v| v.as_int()).unwrap())
            .collect();
        assert_eq!(made, vec![1, 2, 3]);
        let next = Arc::clone(&pool).get(&Request::exclusive("tick")).unwrap();
        assert_eq!(next.property("n").and_then(|v| v.as_int()), Some(4));
    }

    #[test]
    fn test_storage_operations_unsupported() {
        let pool = ticks();
        assert!(pool.add(Arc::new(BasicResource::new("tick"))).is_err());
        assert!(pool.remove(&BasicResource::new("tick")).is_err());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_factory_may_end_sequence() {
        let pool = Arc::new(EphemeralPool::new("slot", |request: &Request| {
            request
                .attributes()
                .get_int("size")
                .filter(|size| *size > 0)
                .map(|size| {
                    Arc::new(BasicResource::new("slot").with_property("size", size))
                        as Arc<dyn Resource>
                })
        }));
        assert!(Arc::clone(&pool).get(&Request::shared("slot")).is_none());
        assert!(pool.get(&Request::shared("slot").with("size", 4)).is_some());
    }
}
