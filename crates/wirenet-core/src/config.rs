//! Engine tuning values, loadable from JSON.

use crate::components::DEFAULT_MAX_WIRES;
use crate::error::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WiringConfig {
    /// Wire limit for connections whose definition does not set one
    pub default_max_wires: usize,
    /// How far from its holder a device may be attached
    pub max_attach_distance: f32,
    /// Multiplier applied to the delta passed to `update`
    pub time_scale: f32,
}

impl Default for WiringConfig {
    fn default() -> Self {
        Self {
            default_max_wires: DEFAULT_MAX_WIRES,
            max_attach_distance: 1.5,
            time_scale: 1.0,
        }
    }
}

impl WiringConfig {
    /// Parse a config; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = WiringConfig::from_json(r#"{ "default_max_wires": 2 }"#).unwrap();
        assert_eq!(config.default_max_wires, 2);
        assert_eq!(config.max_attach_distance, 1.5);
        assert_eq!(config.time_scale, 1.0);
    }

    #[test]
    fn test_bad_json_is_an_error() {
        assert!(WiringConfig::from_json("{ not json").is_err());
    }
}
