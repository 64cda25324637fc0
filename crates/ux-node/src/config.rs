//! Node configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node name, shown in logs.
    pub node_name: String,
    /// Data directory.
    pub data_dir: PathBuf,
    /// Network configuration.
    #[serde(default)]
    pub network: NetworkSettings,
    /// Witness configuration.
    #[serde(default)]
    pub witness: WitnessSettings,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_name: "uxnode".to_string(),
            data_dir: PathBuf::from("./uxnode-data"),
            network: NetworkSettings::default(),
            witness: WitnessSettings::default(),
        }
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// P2P bind address.
    pub bind_address: String,
    /// Publicly reachable address to advertise, when it differs from the
    /// bind address.
    pub declared_address: Option<String>,
    /// DNS seeds resolved at bootstrap.
    pub dns_seeds: Vec<String>,
    /// Static seed addresses merged with the resolved ones.
    pub static_seeds: Vec<String>,
    /// Maximum live peers.
    pub max_peers: usize,
    /// Minimum live peers.
    pub min_peers: usize,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            bind_address: format!("0.0.0.0:{}", ux_network::DEFAULT_PORT),
            declared_address: None,
            dns_seeds: vec![
                "seed1.uxnetwork.io:8223".to_string(),
                "seed2.uxnetwork.io:8223".to_string(),
            ],
            static_seeds: Vec::new(),
            max_peers: ux_network::MAX_PEERS,
            min_peers: ux_network::MIN_PEERS,
        }
    }
}

/// Witness configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WitnessSettings {
    /// Participate in consensus as a witness.
    pub enabled: bool,
    /// Hex-encoded secret key file.
    pub key_file: Option<PathBuf>,
    /// Concilium this witness serves.
    #[serde(default)]
    pub concilium_id: u32,
}

impl NodeConfig {
    /// Load configuration from a TOML file; missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config =
            toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.network.max_peers, 10);
        assert_eq!(config.network.min_peers, 3);
        assert!(!config.witness.enabled);
        assert!(config.network.bind_address.ends_with(":8223"));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = NodeConfig::load(Path::new("/nonexistent/uxnode.toml")).unwrap();
        assert_eq!(config.node_name, "uxnode");
    }

    #[test]
    fn test_parse_toml() {
        let raw = r#"
            node_name = "alpha"
            data_dir = "/tmp/alpha"

            [network]
            bind_address = "127.0.0.1:9001"
            dns_seeds = []
            static_seeds = ["10.0.0.2:8223"]
            max_peers = 5
            min_peers = 2

            [witness]
            enabled = true
            concilium_id = 3
        "#;
        let config: NodeConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.node_name, "alpha");
        assert_eq!(config.network.max_peers, 5);
        assert!(config.witness.enabled);
        assert_eq!(config.witness.concilium_id, 3);
    }
}
