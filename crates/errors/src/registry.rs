//! Registry and pool error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum RegistryError {
    #[error("unknown resource class: {class}")]
    UnknownClass { class: String },

    #[error("resource class already registered: {class}")]
    AlreadyRegistered { class: String },

    #[error("resource {resource} is not in the {class} pool")]
    NotInPool { class: String, resource: String },

    #[error("{operation} is not supported by {pool} pools")]
    UnsupportedOperation { pool: String, operation: String },

    #[error("resource {resource} has class {found}, pool holds {expected}")]
    WrongClass {
        expected: String,
        found: String,
        resource: String,
    },

    #[error("resource {resource} has no {key_attribute} key for the {class} pool")]
    MissingKey {
        class: String,
        key_attribute: String,
        resource: String,
    },

    #[error("key {key} is already taken in the {class} pool")]
    KeyConflict { class: String, key: String },
}

impl UserFacingError for RegistryError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::UnknownClass { .. } => {
                Some("Register a pool for the class before requesting it.")
            }
            Self::AlreadyRegistered { .. } => {
                Some("Unregister the existing pool first, or reuse it.")
            }
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::UnknownClass { .. } => "registry.unknown_class",
            Self::AlreadyRegistered { .. } => "registry.already_registered",
            Self::NotInPool { .. } => "registry.not_in_pool",
            Self::UnsupportedOperation { .. } => "registry.unsupported_operation",
            Self::WrongClass { .. } => "registry.wrong_class",
            Self::MissingKey { .. } => "registry.missing_key",
            Self::KeyConflict { .. } => "registry.key_conflict",
        };
        Some(code)
    }
}
