/*!
Configuration management for the telescope host.
*/

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use telescope_client::TelescopeConfig;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub host: HostConfig,

    #[serde(default)]
    pub telescopes: Vec<TelescopeConfig>,
}

impl AppConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        let mut simulator = TelescopeConfig::simulated("Simulator");
        simulator.fov_circles = vec![0.5, 1.0];

        Self {
            host: HostConfig::default(),
            telescopes: vec![simulator],
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file as TOML: {}", path.as_ref().display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Check host settings and that telescope names are unique
    pub fn validate(&self) -> Result<()> {
        if self.host.tick_interval_ms == 0 {
            bail!("tick_interval_ms must be at least 1");
        }

        let mut names = HashSet::new();
        for telescope in &self.telescopes {
            telescope.validate()?;
            if !names.insert(telescope.name.as_str()) {
                bail!("duplicate telescope name '{}'", telescope.name);
            }
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Polling loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Time between communication ticks
    pub tick_interval_ms: u64,

    /// Print client status every this many ticks; 0 disables it
    pub status_interval_ticks: u64,

    /// Print status as JSON lines instead of plain text
    pub json_status: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            status_interval_ticks: 10,
            json_status: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use telescope_client::{SocketKind, TelescopeKind};
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_roundtrip() {
        let mut original_config = AppConfig::new();
        original_config.telescopes.push(TelescopeConfig {
            kind: TelescopeKind::Relay {
                address: "relay.local:10001".to_string(),
                protocol: SocketKind::Udp,
            },
            localized_name: Some("Relais".to_string()),
            ..TelescopeConfig::simulated("Relay")
        });

        let temp_file = NamedTempFile::new().unwrap();
        let temp_path = temp_file.path();

        original_config.save_to_file(temp_path).unwrap();
        let loaded_config = AppConfig::load_from_file(temp_path).unwrap();

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn test_default_values() {
        let config = AppConfig::new();

        assert_eq!(config.host.tick_interval_ms, 100);
        assert_eq!(config.host.status_interval_ticks, 10);
        assert!(!config.host.json_status);

        assert_eq!(config.telescopes.len(), 1);
        assert_eq!(config.telescopes[0].name, "Simulator");
        assert_eq!(config.telescopes[0].fov_circles, vec![0.5, 1.0]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_minimal_file_uses_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
            [[telescopes]]
            name = "Mount"
            [telescopes.kind]
            type = "serial"
            address = "bridge:4030"
            "#
        )
        .unwrap();

        let config = AppConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.host, HostConfig::default());
        assert_eq!(config.telescopes[0].name, "Mount");
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut config = AppConfig::new();
        config.telescopes.push(TelescopeConfig::simulated("Simulator"));

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = AppConfig::load_from_file("/nonexistent/telescoped.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/telescoped.toml"));
    }
}
