//! Resource class tags

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Tag naming the category of a resource (e.g. `"slot"`, `"connection"`).
///
/// The registry keys pools by class, so two requests for the same class are
/// always served by the same pool.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceClass(Cow<'static, str>);

impl ResourceClass {
    /// Create a class from any string
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// Create a class from a static string without allocating
    #[must_use]
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ResourceClass {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

impl From<String> for ResourceClass {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl AsRef<str> for ResourceClass {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
