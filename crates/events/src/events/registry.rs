use serde::{Deserialize, Serialize};

/// Registry and pool inventory events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RegistryEvent {
    PoolRegistered { class: String, kind: String },
    PoolUnregistered { class: String },
    ResourceAdded { class: String, resource: String },
    ResourceRemoved { class: String, resource: String },
}
