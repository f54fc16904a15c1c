use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ModelConfigError;

/// Logical purpose of a model connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Basic,
    Reasoning,
    Vision,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Basic, Role::Reasoning, Role::Vision];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Reasoning => "reasoning",
            Self::Vision => "vision",
        }
    }

    /// Static config section holding this role's settings, e.g. `BASIC_MODEL`.
    pub fn section_name(&self) -> &'static str {
        match self {
            Self::Basic => "BASIC_MODEL",
            Self::Reasoning => "REASONING_MODEL",
            Self::Vision => "VISION_MODEL",
        }
    }

    /// Prefix of the environment variables overriding this role, e.g. `BASIC_MODEL__`.
    pub fn env_prefix(&self) -> String {
        format!("{}__", self.section_name())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ModelConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "reasoning" => Ok(Self::Reasoning),
            "vision" => Ok(Self::Vision),
            _ => Err(ModelConfigError::InvalidRole(s.to_string())),
        }
    }
}
