//! Light identifiers and power status

use std::fmt;

use serde::{Deserialize, Serialize};

pub use light_api::models::{EnergyData, PowerStatus};

/// Identifier of a paired light
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LightId(String);

impl LightId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LightId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for LightId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
