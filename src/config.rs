use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub networks: Vec<NetworkConfig>,
    #[serde(default)]
    pub aggregation: AggregationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Per-network indexing configuration
///
/// Networks (e.g. testnet/mainnet) share the schema but run independent
/// pollers and never share rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub rpc_url: String,
    pub start_block_height: u64,
    pub max_requests_per_second: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_checkpoint_interval_secs")]
    pub checkpoint_interval_secs: u64,
    pub modules: ModuleConfig,
}

/// On-chain module addresses for the event-producing contracts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Bonding-curve (pump) contract
    pub pump_address: String,
    pub pump_module: String,
    /// AMM factory contract
    pub amm_address: String,
    pub amm_module: String,
    /// Staking contract
    pub staking_address: String,
    pub staking_module: String,
    /// Game contract
    pub game_address: String,
    pub game_module: String,
    /// Fungible-asset metadata view module
    pub fa_address: String,
    pub fa_module: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    pub ohlc_interval_secs: u64,
    pub tvl_interval_secs: u64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            ohlc_interval_secs: 60,
            tvl_interval_secs: 3600,
        }
    }
}

fn default_batch_size() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_checkpoint_interval_secs() -> u64 {
    30
}

impl ModuleConfig {
    pub fn pump_event(&self, name: &str) -> String {
        format!("{}::{}::{}", self.pump_address, self.pump_module, name)
    }

    pub fn amm_event(&self, name: &str) -> String {
        format!("{}::{}::{}", self.amm_address, self.amm_module, name)
    }

    pub fn staking_event(&self, name: &str) -> String {
        format!("{}::{}::{}", self.staking_address, self.staking_module, name)
    }

    pub fn game_event(&self, name: &str) -> String {
        format!("{}::{}::{}", self.game_address, self.game_module, name)
    }

    /// Fully-qualified view function in the FA metadata module
    pub fn fa_view(&self, name: &str) -> String {
        format!("{}::{}::{}", self.fa_address, self.fa_module, name)
    }
}

impl NetworkConfig {
    /// All event types this network's poller fetches each batch
    pub fn event_types(&self) -> Vec<String> {
        vec![
            self.modules.pump_event("TradeEvent"),
            self.modules.pump_event("PumpEvent"),
            self.modules.pump_event("TransferEvent"),
            self.modules.pump_event("UnfreezeEvent"),
            self.modules.amm_event("PairCreatedEvent"),
            self.modules.staking_event("PoolRegisteredEvent"),
            self.modules.game_event("GameResultEvent"),
        ]
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                path: "spike_indexer.db".to_string(),
            },
            networks: vec![NetworkConfig {
                name: "testnet".to_string(),
                rpc_url: "https://rpc-testnet.supra.com/rpc/v1".to_string(),
                start_block_height: 8_270_551,
                max_requests_per_second: 10,
                batch_size: default_batch_size(),
                poll_interval_ms: default_poll_interval_ms(),
                checkpoint_interval_secs: default_checkpoint_interval_secs(),
                modules: ModuleConfig {
                    pump_address: "0x0".to_string(),
                    pump_module: "pump_supra".to_string(),
                    amm_address: "0x0".to_string(),
                    amm_module: "spikey_amm".to_string(),
                    staking_address: "0x0".to_string(),
                    staking_module: "staking".to_string(),
                    game_address: "0x0".to_string(),
                    game_module: "game".to_string(),
                    fa_address: "0x0".to_string(),
                    fa_module: "pair".to_string(),
                },
            }],
            aggregation: AggregationConfig::default(),
        }
    }
}

impl Config {
    /// Load the config file, writing a default template if it doesn't exist
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            let default = Config::default();
            let contents = serde_json::to_string_pretty(&default)
                .context("Failed to serialize default config")?;
            fs::write(path, contents)
                .with_context(|| format!("Failed to write default config to {}", path.display()))?;
            return Ok(default);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(config)
    }

    pub fn network(&self, name: &str) -> Option<&NetworkConfig> {
        self.networks.iter().find(|n| n.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.networks.len(), 1);
        assert_eq!(parsed.networks[0].batch_size, 10);
        assert_eq!(parsed.aggregation.ohlc_interval_secs, 60);
    }

    #[test]
    fn test_event_types_cover_all_modules() {
        let config = Config::default();
        let types = config.networks[0].event_types();
        assert_eq!(types.len(), 7);
        assert!(types.iter().any(|t| t.ends_with("::TradeEvent")));
        assert!(types.iter().any(|t| t.ends_with("::PairCreatedEvent")));
        assert!(types.iter().any(|t| t.ends_with("::PoolRegisteredEvent")));
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configs.json");
        let config = Config::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.networks[0].name, "testnet");
    }
}
