//! Configuration system

pub use serde::{Deserialize, Serialize};

use crate::physics::backend::PhysicsMaterial;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        // Try different formats
        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, Default::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Physics subsystem configuration
///
/// Physics is optional on some runtime roles (a headless authoritative
/// server may run with no backend loaded), so `enabled` gates whether a
/// world instantiates a backend at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicsConfig {
    /// Whether a physics backend should be loaded for this role
    pub enabled: bool,

    /// Fixed simulation tick rate in Hz
    pub tick_rate: f32,

    /// Upper bound on fixed ticks consumed by a single update call,
    /// protecting against spiral-of-death after a long frame
    pub max_ticks_per_update: u32,

    /// Material applied to colliders that do not specify their own
    pub default_material: PhysicsMaterial,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_rate: 30.0,
            max_ticks_per_update: 5,
            default_material: PhysicsMaterial::default(),
        }
    }
}

impl Config for PhysicsConfig {}

impl PhysicsConfig {
    /// Duration of one fixed tick in seconds
    pub fn tick_interval(&self) -> f32 {
        1.0 / self.tick_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PhysicsConfig::default();
        assert!(config.enabled);
        assert!(config.tick_interval() > 0.0);
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("physics.toml");
        let path = path.to_str().unwrap();

        let mut config = PhysicsConfig::default();
        config.tick_rate = 60.0;
        config.save_to_file(path).unwrap();

        let loaded = PhysicsConfig::load_from_file(path).unwrap();
        assert_eq!(loaded.tick_rate, 60.0);
        assert_eq!(loaded.enabled, config.enabled);
    }

    #[test]
    fn test_unsupported_format() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        write!(file, "tick_rate: 30.0").unwrap();

        let result = PhysicsConfig::load_from_file(file.path().to_str().unwrap());
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
