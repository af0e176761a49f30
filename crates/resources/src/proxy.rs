//! Wrapping an arbitrary value as an allocatable resource

use crate::resource::Resource;
use crate::state::ResourceState;
use chords_types::ResourceClass;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// Adapter making any shared value allocatable.
///
/// Derefs to the wrapped value and compares, hashes and debugs as it does.
/// Each proxy carries its own lock state and resource identity, even when
/// two proxies wrap the same `Arc`.
pub struct ProxyResource<T> {
    inner: Arc<T>,
    class: ResourceClass,
    state: ResourceState,
}

impl<T> ProxyResource<T> {
    /// Wrap `value`, using the short type name of `T` as the class
    pub fn new(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc(inner: Arc<T>) -> Self {
        let class = ResourceClass::new(short_type_name::<T>());
        Self::with_class(inner, class)
    }

    pub fn with_class(inner: Arc<T>, class: impl Into<ResourceClass>) -> Self {
        Self {
            inner,
            class: class.into(),
            state: ResourceState::new(),
        }
    }

    #[must_use]
    pub fn inner(&self) -> &Arc<T> {
        &self.inner
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

impl<T> Deref for ProxyResource<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: PartialEq> PartialEq for ProxyResource<T> {
    fn eq(&self, other: &Self) -> bool {
        *self.inner == *other.inner
    }
}

impl<T: Eq> Eq for ProxyResource<T> {}

impl<T: Hash> Hash for ProxyResource<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash(state);
    }
}

impl<T: fmt::Debug> fmt::Debug for ProxyResource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl<T: fmt::Debug + Send + Sync> Resource for ProxyResource<T> {
    fn class(&self) -> &ResourceClass {
        &self.class
    }

    fn state(&self) -> &ResourceState {
        &self.state
    }

    fn label(&self) -> String {
        format!("{}({:?})", self.class, self.inner)
    }
}
