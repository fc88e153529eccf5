//! Provider Configuration
//!
//! YAML file with one section per concern. Every section has defaults, so a
//! missing file or a partial file is fine.

use crate::controlplane::listing::ListingConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Top-level provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Symmetrix id of the managed array
    pub array_id: String,
    /// Client backend name
    pub backend: String,
    pub listing: ListingConfig,
    pub simulator: SimulatorConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            array_id: "000197900123".to_string(),
            backend: "simulator".to_string(),
            listing: ListingConfig::default(),
            simulator: SimulatorConfig::default(),
        }
    }
}

/// Settings for the in-memory array
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// YAML inventory to seed the array with
    pub inventory: Option<PathBuf>,
    /// Artificial delay per call, in milliseconds
    pub latency_ms: u64,
}

impl ProviderConfig {
    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&raw)?;
        config.validate()?;
        debug!("Loaded config from {}: array {}", path.display(), config.array_id);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.array_id.trim().is_empty() {
            return Err(Error::Configuration("array_id must not be empty".into()));
        }
        if self.listing.concurrency == 0 {
            return Err(Error::Configuration(
                "listing.concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProviderConfig::load(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, ProviderConfig::default());
        assert_eq!(config.listing.concurrency, 10);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "array_id: \"000120000456\"\nlisting:\n  concurrency: 4").unwrap();

        let config = ProviderConfig::load(file.path()).unwrap();
        assert_eq!(config.array_id, "000120000456");
        assert_eq!(config.listing.concurrency, 4);
        assert_eq!(config.backend, "simulator");
        assert!(config.simulator.inventory.is_none());
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "listing:\n  concurrency: 0").unwrap();
        assert_matches!(ProviderConfig::load(file.path()), Err(Error::Configuration(_)));
    }

    #[test]
    fn test_malformed_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "listing: [not, a, map]").unwrap();
        assert_matches!(ProviderConfig::load(file.path()), Err(Error::YamlParse(_)));
    }
}
