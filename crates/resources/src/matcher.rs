//! Attribute predicates deciding whether a resource fits a request
//!
//! Matchers are explicit, named callables attached to a resource. They see
//! the resource's own properties and the request, and never the resource
//! state: availability is decided separately by the lock state machine.

use chords_types::{Attributes, Request};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Request attribute giving an inclusive lower bound
pub const MIN_VALUE: &str = "min_value";
/// Request attribute giving an inclusive upper bound
pub const MAX_VALUE: &str = "max_value";

type Predicate = dyn Fn(&Attributes, &Request) -> bool + Send + Sync;

/// Named predicate over (resource properties, request)
#[derive(Clone)]
pub struct Matcher {
    name: Cow<'static, str>,
    predicate: Arc<Predicate>,
}

impl Matcher {
    pub fn new<F>(name: impl Into<Cow<'static, str>>, predicate: F) -> Self
    where
        F: Fn(&Attributes, &Request) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn matches(&self, properties: &Attributes, request: &Request) -> bool {
        (self.predicate)(properties, request)
    }

    /// Inclusive range check of an integer property against the request's
    /// `min_value`/`max_value` attributes. Absent bounds are open; a
    /// bounded request never matches a resource lacking the property.
    #[must_use]
    pub fn value_range(property: &'static str) -> Self {
        Self::new(format!("value_range({property})"), move |properties, request| {
            let min = request.attributes().get_int(MIN_VALUE);
            let max = request.attributes().get_int(MAX_VALUE);
            if min.is_none() && max.is_none() {
                return true;
            }
            let Some(value) = properties.get_int(property) else {
                return false;
            };
            min.is_none_or(|min| value >= min) && max.is_none_or(|max| value <= max)
        })
    }

    /// Every request attribute that names a resource property must equal it.
    /// Request attributes with no matching property are ignored.
    #[must_use]
    pub fn shared_properties() -> Self {
        Self::new("shared_properties", |properties, request| {
            request
                .attributes()
                .iter()
                .all(|(name, wanted)| properties.get(name).is_none_or(|value| value == wanted))
        })
    }

    /// Conjunction of several matchers
    #[must_use]
    pub fn all(matchers: Vec<Matcher>) -> Self {
        let name = matchers
            .iter()
            .map(Matcher::name)
            .collect::<Vec<_>>()
            .join(" & ");
        Self::new(name, move |properties, request| {
            matchers.iter().all(|m| m.matches(properties, request))
        })
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Matcher").field(&self.name).finish()
    }
}
