//! # Configuration
//!
//! Everything tunable at startup, read from one TOML file:
//!
//! ```toml
//! [world]
//! initial_entity_capacity = 4096
//! lazy_base_components = true
//!
//! [spatial]
//! max_depth = 10
//! test_near_far = false
//! ```
//!
//! Missing sections and keys fall back to their defaults.

use crate::error::WorldResult;
use meridian_spatial::SpsConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of entity slots reserved by a new world.
pub const DEFAULT_ENTITY_CAPACITY: usize = 1024;

/// Configuration for the game world.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Entity slots reserved up front.
    pub initial_entity_capacity: usize,
    /// Decode base component payloads on first use instead of at load.
    pub lazy_base_components: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            initial_entity_capacity: DEFAULT_ENTITY_CAPACITY,
            lazy_base_components: true,
        }
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeridianConfig {
    /// World settings
    pub world: WorldConfig,
    /// SPS settings shared by every level
    pub spatial: SpsConfig,
}

impl MeridianConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Fails on malformed TOML or mistyped values.
    pub fn from_toml_str(text: &str) -> WorldResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Fails if the file can't be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> WorldResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(MeridianConfig::from_toml_str("").unwrap(), MeridianConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let config = MeridianConfig::from_toml_str(
            "[world]\nlazy_base_components = false\n[spatial]\nmax_depth = 8\n",
        )
        .unwrap();
        assert!(!config.world.lazy_base_components);
        assert_eq!(config.world.initial_entity_capacity, DEFAULT_ENTITY_CAPACITY);
        assert_eq!(config.spatial.max_depth, 8);
        assert!(!config.spatial.test_near_far);
    }

    #[test]
    fn test_bad_value_rejected() {
        assert!(MeridianConfig::from_toml_str("[world]\ninitial_entity_capacity = \"many\"\n").is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(MeridianConfig::from_file("/nonexistent/meridian.toml").is_err());
    }
}
