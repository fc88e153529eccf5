//! Array Client Backends
//!
//! Implementations of [`PowerMaxClient`](crate::domain::ports::PowerMaxClient):
//! - Simulator: in-memory array, optionally seeded from a YAML inventory

pub mod simulator;

pub use simulator::*;

use crate::config::ProviderConfig;
use crate::domain::ports::PowerMaxClientRef;
use crate::error::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Factory for array client backends
pub struct BackendFactory;

impl BackendFactory {
    /// Create the backend named by `config.backend`
    pub fn create(config: &ProviderConfig) -> Result<PowerMaxClientRef> {
        if Self::is_simulator(&config.backend) {
            Ok(Arc::new(Self::simulator(config)?))
        } else {
            Err(Error::BackendUnavailable {
                backend: config.backend.clone(),
            })
        }
    }

    /// Whether `name` selects the in-memory array
    pub fn is_simulator(name: &str) -> bool {
        matches!(name.to_lowercase().as_str(), "simulator" | "sim")
    }

    /// Build a simulated array from the simulator section
    pub fn simulator(config: &ProviderConfig) -> Result<SimulatedArray> {
        let mut array = match &config.simulator.inventory {
            Some(path) => {
                info!("Seeding simulated array {} from {}", config.array_id, path.display());
                SimulatedArray::from_inventory(&config.array_id, Inventory::load(path)?)
            }
            None => SimulatedArray::new(&config.array_id),
        };
        if config.simulator.latency_ms > 0 {
            array = array.with_latency(Duration::from_millis(config.simulator.latency_ms));
        }
        Ok(array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulatorConfig;
    use crate::domain::records::HostRecord;
    use assert_matches::assert_matches;

    #[test]
    fn test_unknown_backend() {
        let config = ProviderConfig {
            backend: "unisphere".into(),
            ..Default::default()
        };
        assert_matches!(
            BackendFactory::create(&config).err(),
            Some(Error::BackendUnavailable { backend }) if backend == "unisphere"
        );
    }

    #[tokio::test]
    async fn test_simulator_seeded_from_inventory() {
        let seed = SimulatedArray::new("000197900123");
        seed.insert_host(HostRecord {
            host_id: "esx-01".into(),
            ..Default::default()
        });
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.yaml");
        std::fs::write(&path, seed.inventory().to_yaml().unwrap()).unwrap();

        let config = ProviderConfig {
            simulator: SimulatorConfig {
                inventory: Some(path),
                latency_ms: 0,
            },
            ..Default::default()
        };
        let client = BackendFactory::create(&config).unwrap();
        assert_eq!(client.backend_name(), "simulator");
        let host = client.get_host("000197900123", "esx-01").await.unwrap();
        assert_eq!(host.host_id, "esx-01");
    }

    #[test]
    fn test_missing_inventory_file() {
        let config = ProviderConfig {
            simulator: SimulatorConfig {
                inventory: Some("/nonexistent/inventory.yaml".into()),
                latency_ms: 0,
            },
            ..Default::default()
        };
        assert_matches!(BackendFactory::simulator(&config), Err(Error::Io(_)));
    }
}
