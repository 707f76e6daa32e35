//! Runtime configuration.

use log::warn;
use serde::{Deserialize, Serialize};

/// Environment variable capping the texture side length.
pub const ENV_MAX_TEXTURE_DIM: &str = "TEXMODEL_MAX_TEXTURE_DIM";
/// Environment variable forcing the software fallback adapter.
pub const ENV_FALLBACK_ADAPTER: &str = "TEXMODEL_FALLBACK_ADAPTER";
/// Environment variable preferring a low power adapter.
pub const ENV_LOW_POWER: &str = "TEXMODEL_LOW_POWER";

/// Adapter selection preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerPreference {
    #[default]
    HighPerformance,
    LowPower,
}

impl From<PowerPreference> for wgpu::PowerPreference {
    fn from(value: PowerPreference) -> Self {
        match value {
            PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
            PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
        }
    }
}

/// Options used when creating the device and the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    power_preference: PowerPreference,
    force_fallback_adapter: bool,
    max_texture_dimension: Option<u32>,
    label: Option<String>,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a configuration from the `TEXMODEL_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::new();
        if let Some(value) = lookup(ENV_MAX_TEXTURE_DIM) {
            match value.trim().parse::<u32>() {
                Ok(dim) if dim > 0 => config.max_texture_dimension = Some(dim),
                _ => warn!("Ignoring invalid {}={:?}", ENV_MAX_TEXTURE_DIM, value),
            }
        }
        if let Some(value) = lookup(ENV_FALLBACK_ADAPTER) {
            config.force_fallback_adapter = parse_flag(&value);
        }
        if let Some(value) = lookup(ENV_LOW_POWER) {
            if parse_flag(&value) {
                config.power_preference = PowerPreference::LowPower;
            }
        }
        config
    }

    pub fn with_power_preference(mut self, value: PowerPreference) -> Self {
        self.power_preference = value;
        self
    }

    pub fn with_fallback_adapter(mut self, value: bool) -> Self {
        self.force_fallback_adapter = value;
        self
    }

    /// Caps the texture side length below the device limit.
    pub fn with_max_texture_dimension(mut self, value: u32) -> Self {
        self.max_texture_dimension = Some(value);
        self
    }

    pub fn with_label(mut self, value: impl Into<String>) -> Self {
        self.label = Some(value.into());
        self
    }

    pub fn get_power_preference(&self) -> PowerPreference {
        self.power_preference
    }

    pub fn get_force_fallback_adapter(&self) -> bool {
        self.force_fallback_adapter
    }

    /// Effective texture side cap given the device limit. Never exceeds it.
    pub fn get_max_texture_dimension(&self, device_limit: u32) -> u32 {
        self.max_texture_dimension
            .map_or(device_limit, |cap| cap.min(device_limit))
    }

    pub fn get_label(&self) -> &str {
        self.label.as_deref().unwrap_or("texmodel")
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::new();
        assert_eq!(config.get_power_preference(), PowerPreference::HighPerformance);
        assert!(!config.get_force_fallback_adapter());
        assert_eq!(config.get_max_texture_dimension(8192), 8192);
        assert_eq!(config.get_label(), "texmodel");
    }

    #[test]
    fn test_cap_never_raises_limit() {
        let config = RuntimeConfig::new().with_max_texture_dimension(4096);
        assert_eq!(config.get_max_texture_dimension(8192), 4096);
        assert_eq!(config.get_max_texture_dimension(2048), 2048);
    }

    #[test]
    fn test_from_environment_values() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            (ENV_MAX_TEXTURE_DIM, "1024"),
            (ENV_FALLBACK_ADAPTER, "true"),
            (ENV_LOW_POWER, "1"),
        ]));
        assert_eq!(config.get_max_texture_dimension(8192), 1024);
        assert!(config.get_force_fallback_adapter());
        assert_eq!(config.get_power_preference(), PowerPreference::LowPower);
    }

    #[test]
    fn test_invalid_environment_values_ignored() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            (ENV_MAX_TEXTURE_DIM, "huge"),
            (ENV_LOW_POWER, "no"),
        ]));
        assert_eq!(config, RuntimeConfig::new());
    }

    #[test]
    fn test_deserialize_partial_json() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{"power_preference": "low_power", "max_texture_dimension": 2048}"#)
                .unwrap();
        assert_eq!(config.get_power_preference(), PowerPreference::LowPower);
        assert_eq!(config.get_max_texture_dimension(16384), 2048);
        assert!(!config.get_force_fallback_adapter());
    }
}
