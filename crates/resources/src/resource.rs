//! The `Resource` capability and the stock attribute-matched resource

use crate::matcher::Matcher;
use crate::state::ResourceState;
use chords_errors::Result;
use chords_types::{AttrValue, Attributes, Request, ResourceClass};
use std::fmt;

static NO_PROPERTIES: Attributes = Attributes::empty();

/// One allocatable instance of a resource class.
///
/// Implementors supply their class and embedded [`ResourceState`]; the
/// state machine methods have defaults that delegate to it. Override
/// [`Resource::matches`] to add attribute predicates.
pub trait Resource: Send + Sync + fmt::Debug {
    fn class(&self) -> &ResourceClass;

    fn state(&self) -> &ResourceState;

    /// Descriptive properties matched against request attributes
    fn properties(&self) -> &Attributes {
        &NO_PROPERTIES
    }

    fn property(&self, name: &str) -> Option<&AttrValue> {
        self.properties().get(name)
    }

    fn matches(&self, request: &Request) -> bool {
        self.class() == request.class()
    }

    fn can_acquire(&self, request: &Request) -> bool {
        self.state().can_acquire(request)
    }

    /// # Errors
    ///
    /// Returns `AllocationError::Unavailable` when the state machine refuses.
    fn acquire(&self, request: &Request) -> Result<()> {
        self.state().acquire(request, || self.label())
    }

    /// # Errors
    ///
    /// Returns `AllocationError::NotHeld` when `request` holds nothing here.
    fn release(&self, request: &Request) -> Result<()> {
        self.state().release(request, || self.label())
    }

    /// Identity used to tell resources apart inside one allocation
    fn identity(&self) -> u64 {
        self.state().id().get()
    }

    /// Short human-readable name, used in errors and events
    fn label(&self) -> String {
        if self.properties().is_empty() {
            format!("{}#{}", self.class(), self.state().id())
        } else {
            format!("{}#{}{}", self.class(), self.state().id(), self.properties())
        }
    }
}

/// Resource described by a property set and an optional matcher
#[derive(Debug)]
pub struct BasicResource {
    class: ResourceClass,
    properties: Attributes,
    matcher: Option<Matcher>,
    state: ResourceState,
}

impl BasicResource {
    pub fn new(class: impl Into<ResourceClass>) -> Self {
        Self {
            class: class.into(),
            properties: Attributes::new(),
            matcher: None,
            state: ResourceState::new(),
        }
    }

    /// Resource with an integer `value` property, matched by
    /// `min_value`/`max_value` range and by equal properties
    pub fn numbered(class: impl Into<ResourceClass>, value: i64) -> Self {
        Self::new(class)
            .with_property("value", value)
            .with_matcher(Matcher::all(vec![
                Matcher::value_range("value"),
                Matcher::shared_properties(),
            ]))
    }

    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.properties.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_properties(mut self, properties: Attributes) -> Self {
        self.properties = properties;
        self
    }

    #[must_use]
    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Shortcut for the integer `value` property
    #[must_use]
    pub fn value(&self) -> Option<i64> {
        self.properties.get_int("value")
    }
}

impl Resource for BasicResource {
    fn class(&self) -> &ResourceClass {
        &self.class
    }

    fn state(&self) -> &ResourceState {
        &self.state
    }

    fn properties(&self) -> &Attributes {
        &self.properties
    }

    fn matches(&self, request: &Request) -> bool {
        self.class == *request.class()
            && self
                .matcher
                .as_ref()
                .is_none_or(|m| m.matches(&self.properties, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release_through_trait() {
        for request in [Request::shared("int"), Request::exclusive("int")] {
            let resource = BasicResource::new("int");
            assert!(resource.can_acquire(&request));
            assert!(resource.matches(&request));
            resource.acquire(&request).unwrap();
            assert_eq!(resource.state().is_shared(), request.is_shared());
            assert_eq!(resource.state().is_exclusive(), request.is_exclusive());
            resource.release(&request).unwrap();
            assert!(resource.state().is_idle());
        }
    }

    #[test]
    fn test_fail_release_unacquired_or_twice() {
        for request in [Request::shared("int"), Request::exclusive("int")] {
            let resource = BasicResource::new("int");
            assert!(resource.release(&request).is_err());
            resource.acquire(&request).unwrap();
            resource.release(&request).unwrap();
            assert!(resource.release(&request).is_err());
        }
    }

    #[test]
    fn test_fail_release_wrong_mode() {
        let resource = BasicResource::new("int");
        resource.acquire(&Request::shared("int")).unwrap();
        assert!(resource.release(&Request::exclusive("int")).is_err());

        let resource = BasicResource::new("int");
        resource.acquire(&Request::exclusive("int")).unwrap();
        assert!(resource.release(&Request::shared("int")).is_err());
        assert!(resource.state().is_exclusive());
    }

    #[test]
    fn test_numbered_matching() {
        let resource = BasicResource::numbered("int", 3);
        assert_eq!(resource.value(), Some(3));
        assert!(resource.matches(&Request::shared("int").with("max_value", 3)));
        assert!(!resource.matches(&Request::shared("int").with("max_value", 2)));
        assert!(!resource.matches(&Request::shared("float")));
        assert!(resource.matches(&Request::shared("int").with("value", 3)));
        assert!(!resource.matches(&Request::shared("int").with("value", 4)));
    }

    #[test]
    fn test_label_mentions_properties() {
        let resource = BasicResource::numbered("int", 7);
        assert!(resource.label().starts_with("int#"));
        assert!(resource.label().ends_with("{value=7}"));
    }
}
