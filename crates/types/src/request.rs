//! Resource requests

use crate::{AttrValue, Attributes, ResourceClass};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Access mode of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// Any number of concurrent shared holders
    #[default]
    Shared,
    /// A single holder, incompatible with any other hold
    Exclusive,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => write!(f, "shared"),
            Self::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// Immutable description of one desired resource.
///
/// Equality and hashing are structural over class, mode and the attribute
/// set, so requests built with attributes in different orders are
/// interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Request {
    class: ResourceClass,
    #[serde(default)]
    mode: AccessMode,
    #[serde(default)]
    attributes: Attributes,
}

impl Request {
    pub fn new(class: impl Into<ResourceClass>, mode: AccessMode, attributes: Attributes) -> Self {
        Self {
            class: class.into(),
            mode,
            attributes,
        }
    }

    /// Shared request with no attributes
    pub fn shared(class: impl Into<ResourceClass>) -> Self {
        Self::new(class, AccessMode::Shared, Attributes::new())
    }

    /// Exclusive request with no attributes
    pub fn exclusive(class: impl Into<ResourceClass>) -> Self {
        Self::new(class, AccessMode::Exclusive, Attributes::new())
    }

    /// Return a copy of this request with one more attribute
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(name, value);
        self
    }

    /// Return a copy of this request with its attributes replaced
    #[must_use]
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    #[must_use]
    pub fn class(&self) -> &ResourceClass {
        &self.class
    }

    #[must_use]
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        self.mode == AccessMode::Exclusive
    }

    #[must_use]
    pub fn is_shared(&self) -> bool {
        !self.is_exclusive()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Request {} {} {}>", self.mode, self.class, self.attributes)
    }
}
