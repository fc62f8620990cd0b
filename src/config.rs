//! Configuration for the Molyparket aggregator
//!
//! Settings come from the environment (and `.env`), or from a TOML file.
//! Per-chain values use `chainId=value` lists, e.g.
//! `MARKET_CONTRACTS=8453=0xabc...,84532=0xdef...`.

use alloy_primitives::Address;
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::market::MarketContext;

/// Chain used when the caller does not name one (Base)
pub const DEFAULT_CHAIN_ID: u64 = 8453;

const DEFAULT_BASE_RPC: &str = "https://mainnet.base.org";

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // ========== Network Settings ==========
    /// JSON-RPC endpoint per chain id
    pub rpc_urls: BTreeMap<String, String>,

    /// Chain used when none is requested
    pub default_chain_id: u64,

    // ========== Market Settings ==========
    /// Deployed market contract per chain id; chains without one stay idle
    pub market_contracts: BTreeMap<String, String>,

    /// How many of the most recent pools to load
    pub look_back: u64,

    // ========== Timing ==========
    /// Upper bound for any single contract read
    pub request_timeout_secs: u64,

    /// Delay between refresh passes in watch mode
    pub poll_interval_secs: u64,

    // ========== Wallet ==========
    /// Key used for trading actions (KEEP SECRET!). Reads work without it.
    #[serde(skip_serializing)]
    pub private_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            rpc_urls: match env::var("RPC_URLS") {
                Ok(raw) => Self::parse_chain_map(&raw)?,
                Err(_) => defaults.rpc_urls,
            },
            default_chain_id: env::var("DEFAULT_CHAIN_ID")
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.default_chain_id),
            market_contracts: match env::var("MARKET_CONTRACTS") {
                Ok(raw) => Self::parse_chain_map(&raw)?,
                Err(_) => defaults.market_contracts,
            },
            look_back: env::var("LOOK_BACK")
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.look_back),
            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.request_timeout_secs),
            poll_interval_secs: env::var("POLL_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.poll_interval_secs),
            private_key: env::var("PRIVATE_KEY").ok().filter(|k| !k.trim().is_empty()),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file (the private key is never written)
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Parse `8453=value,84532=value` into a map keyed by chain id
    pub fn parse_chain_map(raw: &str) -> Result<BTreeMap<String, String>> {
        let mut map = BTreeMap::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (chain, value) = entry
                .split_once('=')
                .ok_or_else(|| eyre!("Expected chainId=value, got '{}'", entry))?;
            let chain = chain.trim();
            chain
                .parse::<u64>()
                .map_err(|_| eyre!("Invalid chain id '{}' in '{}'", chain, entry))?;
            map.insert(chain.to_string(), value.trim().to_string());
        }
        Ok(map)
    }

    /// Requested chain, or the configured default
    pub fn effective_chain_id(&self, requested: Option<u64>) -> u64 {
        requested.unwrap_or(self.default_chain_id)
    }

    /// Market contract deployed on `chain_id`, if any
    pub fn contract_address(&self, chain_id: u64) -> Result<Option<Address>> {
        match self.market_contracts.get(&chain_id.to_string()) {
            Some(raw) if !raw.trim().is_empty() => Address::from_str(raw.trim())
                .map(Some)
                .map_err(|e| eyre!("Invalid market contract for chain {}: {}", chain_id, e)),
            _ => Ok(None),
        }
    }

    /// Chain/contract pair to aggregate, `None` when the chain has no market
    pub fn market_context(&self, requested: Option<u64>) -> Result<Option<MarketContext>> {
        let chain_id = self.effective_chain_id(requested);
        Ok(self.contract_address(chain_id)?.map(|contract| MarketContext::new(chain_id, contract)))
    }

    /// RPC endpoints keyed by numeric chain id
    pub fn rpc_url_map(&self) -> Result<BTreeMap<u64, String>> {
        self.rpc_urls
            .iter()
            .map(|(chain, url)| {
                let chain_id = chain
                    .parse::<u64>()
                    .map_err(|_| eyre!("Invalid chain id '{}' in RPC_URLS", chain))?;
                Ok((chain_id, url.clone()))
            })
            .collect()
    }

    /// Validate configuration before talking to the chain
    pub fn validate(&self) -> Result<()> {
        let rpc_urls = self.rpc_url_map()?;
        for (chain, url) in &rpc_urls {
            if url.is_empty() || url.contains("YOUR_API_KEY") {
                return Err(eyre!("Invalid RPC URL for chain {} - please set a real endpoint", chain));
            }
        }

        for chain in self.market_contracts.keys() {
            let chain_id: u64 = chain
                .parse()
                .map_err(|_| eyre!("Invalid chain id '{}' in MARKET_CONTRACTS", chain))?;
            self.contract_address(chain_id)?;
            if !rpc_urls.contains_key(&chain_id) {
                return Err(eyre!("Market contract configured for chain {} but no RPC URL", chain_id));
            }
        }

        if self.look_back == 0 {
            return Err(eyre!("LOOK_BACK must be at least 1"));
        }
        if self.request_timeout_secs == 0 {
            return Err(eyre!("REQUEST_TIMEOUT_SECS must be at least 1"));
        }

        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║              MOLYPARKET - CONFIGURATION                    ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Default Chain:     {:^40} ║", self.default_chain_id);
        println!("║ Look-back:         {:^40} ║", format!("{} pools", self.look_back));
        println!("║ Request Timeout:   {:^40} ║", format!("{}s", self.request_timeout_secs));
        println!("║ Poll Interval:     {:^40} ║", format!("{}s", self.poll_interval_secs));
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ MARKETS                                                    ║");
        if self.market_contracts.is_empty() {
            println!("║ • {:<56} ║", "none configured");
        }
        for (chain, contract) in &self.market_contracts {
            println!("║ • {:<8} {:<47} ║", chain, contract);
        }
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ RPC ENDPOINTS:     {:^40} ║", self.rpc_urls.len());
        println!("║ Signer Key:        {:^40} ║",
            if self.private_key.is_some() { "✓ Configured" } else { "✗ Read-only" }
        );
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_urls: BTreeMap::from([(DEFAULT_CHAIN_ID.to_string(), DEFAULT_BASE_RPC.to_string())]),
            default_chain_id: DEFAULT_CHAIN_ID,
            market_contracts: BTreeMap::new(),
            look_back: 40,
            request_timeout_secs: 15,
            poll_interval_secs: 12,
            private_key: None,
        }
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    const CONTRACT: &str = "0x2222222222222222222222222222222222222222";

    fn with_market() -> Config {
        let mut config = Config::default();
        config.market_contracts.insert("8453".to_string(), CONTRACT.to_string());
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.default_chain_id, 8453);
        assert_eq!(config.look_back, 40);
        assert!(config.private_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_chain_map() {
        let map = Config::parse_chain_map("8453=https://a, 84532 = https://b ,").unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["84532"], "https://b");

        assert!(Config::parse_chain_map("base=https://a").is_err());
        assert!(Config::parse_chain_map("8453").is_err());
    }

    #[test]
    fn test_market_context_falls_back_to_default_chain() {
        let config = with_market();
        let ctx = config.market_context(None).unwrap().unwrap();
        assert_eq!(ctx.chain_id, 8453);
        assert_eq!(ctx.contract, Address::from_str(CONTRACT).unwrap());

        // unknown chain: no market, not an error
        assert!(config.market_context(Some(1)).unwrap().is_none());
    }

    #[test]
    fn test_invalid_contract_rejected() {
        let mut config = Config::default();
        config.market_contracts.insert("8453".to_string(), "0xnope".to_string());
        assert!(config.contract_address(8453).is_err());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_market_without_rpc_rejected() {
        let mut config = with_market();
        config.market_contracts.insert("10".to_string(), CONTRACT.to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_skips_private_key() {
        let mut config = with_market();
        config.private_key = Some("0xdeadbeef".to_string());

        let text = toml::to_string_pretty(&config).unwrap();
        assert!(!text.contains("deadbeef"));

        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.market_contracts, config.market_contracts);
        assert_eq!(parsed.private_key, None);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: Config = toml::from_str("look_back = 10\n").unwrap();
        assert_eq!(parsed.look_back, 10);
        assert_eq!(parsed.request_timeout_secs, 15);
    }
}
