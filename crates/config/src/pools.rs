//! Pool declarations

use chords_errors::{ConfigError, Error};
use chords_types::ResourceClass;
use serde::{Deserialize, Serialize};

/// Selection policy of a configured pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    /// Storage order
    #[default]
    List,
    /// Uniformly shuffled on every lookup
    Random,
    /// Weighted by the resource `value` property
    Weighted,
    /// Indexed by `key_attribute`
    Keyed,
}

impl std::fmt::Display for PoolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::List => write!(f, "list"),
            Self::Random => write!(f, "random"),
            Self::Weighted => write!(f, "weighted"),
            Self::Keyed => write!(f, "keyed"),
        }
    }
}

/// One `[[pools]]` entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolConfig {
    pub class: ResourceClass,
    #[serde(default)]
    pub kind: PoolKind,
    /// Number of resources to populate, valued `1..=size`
    #[serde(default)]
    pub size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_attribute: Option<String>,
}

impl PoolConfig {
    pub(crate) fn validate(&self) -> Result<(), Error> {
        match (self.kind, &self.key_attribute) {
            (PoolKind::Keyed, None) => Err(ConfigError::Invalid {
                message: format!("keyed pool {} needs a key_attribute", self.class),
            }
            .into()),
            (PoolKind::List | PoolKind::Random | PoolKind::Weighted, Some(_)) => {
                Err(ConfigError::Invalid {
                    message: format!(
                        "key_attribute is only valid for keyed pools ({} is {})",
                        self.class, self.kind
                    ),
                }
                .into())
            }
            _ => Ok(()),
        }
    }
}
