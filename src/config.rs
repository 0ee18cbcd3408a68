//! Configuration management for the swap orchestrator
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::transaction::BridgeProtocol;

use anyhow::{Context, Result};
use ethers::types::Address;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Canonical Permit2 deployment, identical on every EVM chain
pub const PERMIT2_ADDRESS: &str = "0x000000000022D473030F116dDEE9F6B43aC78BA3";

lazy_static! {
    static ref ENV_VAR_PATTERN: Regex =
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("env var pattern is valid");
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub session: SessionConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    pub chains: HashMap<String, ChainConfig>,
    #[serde(default)]
    pub bridges: Vec<BridgeConfig>,
    #[serde(default)]
    pub orbiter: OrbiterConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub tracker_poll_interval_ms: u64,
    pub receipt_poll_interval_ms: u64,
    pub receipt_timeout_secs: u64,
    pub slippage_bps: u32,
    pub swap_deadline_secs: u64,
    /// How far back destination log lookups reach
    #[serde(default = "default_lookback_blocks")]
    pub delivery_lookback_blocks: u64,
    #[serde(default = "default_notification_history")]
    pub notification_history: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
    pub confirmation_blocks: u64,
    pub gas_price_strategy: GasPriceStrategy,
    pub max_gas_price_gwei: u64,
    /// Member of the Superchain interop set
    #[serde(default)]
    pub superchain: bool,
    pub enabled: bool,
    #[serde(default)]
    pub contracts: ContractsConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum GasPriceStrategy {
    Legacy,
    Eip1559,
    Arbitrum,
    Optimism,
}

/// Per-chain contract addresses used for quoting, encoding and delivery checks
#[derive(Debug, Clone, Deserialize)]
pub struct ContractsConfig {
    #[serde(default = "default_permit2")]
    pub permit2: String,
    pub universal_router: Option<String>,
    pub quoter: Option<String>,
    pub weth: Option<String>,
    pub mailbox: Option<String>,
    #[serde(default)]
    pub stargate_pools: Vec<String>,
    #[serde(default = "default_fee_tiers")]
    pub fee_tiers: Vec<u32>,
}

impl Default for ContractsConfig {
    fn default() -> Self {
        Self {
            permit2: default_permit2(),
            universal_router: None,
            quoter: None,
            weth: None,
            mailbox: None,
            stargate_pools: Vec::new(),
            fee_tiers: default_fee_tiers(),
        }
    }
}

/// A bridgeable asset: the same logical token deployed on several chains
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    pub asset: String,
    pub protocol: BridgeProtocol,
    /// chain name -> token address
    pub tokens: HashMap<String, String>,
    /// chain name -> router pulling the token, when it differs from the token
    #[serde(default)]
    pub routers: HashMap<String, String>,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub private_key_env: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            private_key_env: "ORCHESTRATOR_PRIVATE_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrbiterConfig {
    pub api_url: String,
}

impl Default for OrbiterConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.orbiter.finance/sdk".to_string(),
        }
    }
}

fn default_permit2() -> String {
    PERMIT2_ADDRESS.to_string()
}

fn default_fee_tiers() -> Vec<u32> {
    vec![500, 3000, 10000]
}

fn default_decimals() -> u8 {
    18
}

fn default_lookback_blocks() -> u64 {
    50_000
}

fn default_notification_history() -> usize {
    50
}

impl Settings {
    /// Load settings from the file named by `ORCHESTRATOR_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("ORCHESTRATOR_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    /// Parse settings from TOML text
    pub fn parse(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        // At least one chain must be enabled
        if self.enabled_chains().is_empty() {
            anyhow::bail!("At least one chain must be enabled");
        }

        for (name, chain) in &self.chains {
            if chain.enabled && chain.rpc_urls.is_empty() {
                anyhow::bail!("Chain {} has no RPC URLs configured", name);
            }
        }

        for bridge in &self.bridges {
            if bridge.tokens.len() < 2 {
                anyhow::bail!(
                    "Bridge route for {} must list tokens on at least two chains",
                    bridge.asset
                );
            }
            for chain_name in bridge.tokens.keys().chain(bridge.routers.keys()) {
                if !self.chains.contains_key(chain_name) {
                    anyhow::bail!(
                        "Bridge route for {} references unknown chain {}",
                        bridge.asset,
                        chain_name
                    );
                }
            }
        }

        if self.session.slippage_bps >= 10_000 {
            anyhow::bail!("Slippage must be below 10000 bps");
        }

        Ok(())
    }

    /// Get list of enabled chains
    pub fn enabled_chains(&self) -> Vec<(&String, &ChainConfig)> {
        self.chains.iter().filter(|(_, c)| c.enabled).collect()
    }

    /// Get chain config by chain ID
    pub fn get_chain_by_id(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }

    /// Resolve a chain table name to its chain ID
    pub fn chain_id_of(&self, name: &str) -> Option<u64> {
        self.chains.get(name).map(|c| c.chain_id)
    }
}

/// Parse a configured contract address
pub fn parse_address(value: &str) -> OrchestratorResult<Address> {
    Address::from_str(value)
        .map_err(|e| OrchestratorError::Config(format!("Invalid address {}: {}", value, e)))
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR_PATTERN.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) const SAMPLE_CONFIG: &str = r#"
[session]
tracker_poll_interval_ms = 2000
receipt_poll_interval_ms = 1000
receipt_timeout_secs = 300
slippage_bps = 50
swap_deadline_secs = 1200

[api]
host = "127.0.0.1"
port = 8080

[metrics]
enabled = false
port = 9090

[chains.ethereum]
chain_id = 1
name = "Ethereum"
rpc_urls = ["https://eth.example.com"]
confirmation_blocks = 1
gas_price_strategy = "eip1559"
max_gas_price_gwei = 200
enabled = true

[chains.ethereum.contracts]
universal_router = "0x66a9893cC07D91D95644AEDD05D03f95e1dBA8Af"
quoter = "0x61fFE014bA17989E743c5F6cB21bF9697530B21e"
weth = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"
mailbox = "0xc005dc82818d67AF737725bD4bf75435d065D239"

[chains.optimism]
chain_id = 10
name = "OP Mainnet"
rpc_urls = ["https://op.example.com"]
confirmation_blocks = 1
gas_price_strategy = "optimism"
max_gas_price_gwei = 50
superchain = true
enabled = true

[chains.base]
chain_id = 8453
name = "Base"
rpc_urls = ["https://base.example.com"]
confirmation_blocks = 1
gas_price_strategy = "eip1559"
max_gas_price_gwei = 50
superchain = true
enabled = true

[[bridges]]
asset = "USDC"
protocol = "hyperlane"
decimals = 6
tokens = { ethereum = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", optimism = "0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85" }
routers = { ethereum = "0x1111111111111111111111111111111111111111", optimism = "0x2222222222222222222222222222222222222222" }

[[bridges]]
asset = "SUPR"
protocol = "superchain"
tokens = { optimism = "0x3333333333333333333333333333333333333333", base = "0x3333333333333333333333333333333333333333" }
"#;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("ORCH_TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${ORCH_TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_parse_sample_config() {
        let settings = Settings::parse(SAMPLE_CONFIG).unwrap();
        assert_eq!(settings.enabled_chains().len(), 3);
        assert_eq!(settings.bridges.len(), 2);
        assert_eq!(settings.bridges[1].protocol, BridgeProtocol::Superchain);
        assert_eq!(settings.chain_id_of("optimism"), Some(10));

        let ethereum = settings.get_chain_by_id(1).unwrap();
        assert_eq!(ethereum.contracts.permit2, PERMIT2_ADDRESS);
        assert_eq!(ethereum.contracts.fee_tiers, vec![500, 3000, 10000]);
        assert_eq!(settings.session.delivery_lookback_blocks, 50_000);
        assert_eq!(settings.orbiter.api_url, "https://api.orbiter.finance/sdk");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_CONFIG.as_bytes()).unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.api.port, 8080);
    }

    #[test]
    fn test_rejects_bridge_with_unknown_chain() {
        let config = SAMPLE_CONFIG.replace("optimism = \"0x0b2C", "arbitrum = \"0x0b2C");
        let err = Settings::parse(&config).unwrap_err();
        assert!(err.to_string().contains("unknown chain arbitrum"));
    }

    #[test]
    fn test_rejects_all_disabled_chains() {
        let config = SAMPLE_CONFIG.replace("enabled = true", "enabled = false");
        assert!(Settings::parse(&config).is_err());
    }
}
