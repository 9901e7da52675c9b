//! Configuration section types

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint of the Metis node used for contract reads
    pub rpc_url: String,
    /// Chain ID (1088 = Metis Andromeda)
    pub chain_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HerculesConfig {
    pub enabled: bool,
    /// Pair-listing subgraph endpoint
    pub subgraph_url: String,
    /// Pairs requested per page
    pub page_size: usize,
    /// Upper bound on pages fetched in one pass
    pub max_pages: usize,
    /// Pool trading fee as a fraction (0.0025 = 0.25%)
    pub fee_rate: f64,
    /// Pairs must hold strictly more than this in USD reserves
    pub min_reserve_usd: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AaveConfig {
    pub enabled: bool,
    /// AaveProtocolDataProvider contract
    pub data_provider: String,
    /// AaveOracle contract (USD prices, 8 decimals)
    pub oracle: String,
    /// RewardsController contract; empty disables incentive lookups
    pub rewards_controller: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetswapConfig {
    pub enabled: bool,
    /// Hosted pool summary endpoint
    pub summary_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnkiConfig {
    pub enabled: bool,
    /// Reward distribution subgraph endpoint
    pub subgraph_url: String,
    /// Staking token whose historical supply prices each distribution
    pub staking_token: String,
    /// Staking token decimals
    pub token_decimals: u32,
    /// Distribution events requested per pass
    pub event_limit: usize,
    /// Multiplier converting one distribution's rate into an annual figure
    pub annualization_factor: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    /// Snapshot max age in seconds; unset keeps the first snapshot forever
    pub max_age_secs: Option<u64>,
    /// Background refresh period in seconds; unset disables it
    pub refresh_interval_secs: Option<u64>,
}

impl CacheConfig {
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_secs.map(Duration::from_secs)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}
