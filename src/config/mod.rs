//! Configuration management for Yieldscope
//!
//! Loads from TOML files + environment variables via .env

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub hercules: HerculesConfig,
    pub aave: AaveConfig,
    pub netswap: NetswapConfig,
    pub enki: EnkiConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Self::builder()?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (YIELDSCOPE__*)
            .add_source(
                Environment::with_prefix("YIELDSCOPE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;
        Ok(app_config)
    }

    /// Defaults only, no files or environment
    pub fn defaults() -> Result<Self> {
        let config = Self::builder()?
            .build()
            .context("Failed to build default configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize default configuration")
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let builder = Config::builder()
            // Network defaults
            .set_default("network.rpc_url", "https://andromeda.metis.io/?owner=1088")?
            .set_default("network.chain_id", 1088)?
            // Hercules defaults
            .set_default("hercules.enabled", true)?
            .set_default("hercules.subgraph_url", "")?
            .set_default("hercules.page_size", 100)?
            .set_default("hercules.max_pages", 50)?
            .set_default("hercules.fee_rate", 0.0025)?
            .set_default("hercules.min_reserve_usd", 1000.0)?
            // AAVE defaults
            .set_default("aave.enabled", true)?
            .set_default("aave.data_provider", "")?
            .set_default("aave.oracle", "")?
            .set_default("aave.rewards_controller", "")?
            // Netswap defaults
            .set_default("netswap.enabled", true)?
            .set_default("netswap.summary_url", "")?
            // Enki defaults
            .set_default("enki.enabled", true)?
            .set_default("enki.subgraph_url", "")?
            .set_default("enki.staking_token", "")?
            .set_default("enki.token_decimals", 18)?
            .set_default("enki.event_limit", 20)?
            .set_default("enki.annualization_factor", 10.0)?
            // HTTP defaults
            .set_default("http.timeout_secs", 30)?
            // Logging defaults
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?;
        Ok(builder)
    }

    fn validate(&self) -> Result<()> {
        if self.hercules.page_size == 0 {
            bail!("hercules.page_size must be greater than zero");
        }
        if !(0.0..1.0).contains(&self.hercules.fee_rate) {
            bail!("hercules.fee_rate must be a fraction in [0, 1)");
        }
        if self.enki.annualization_factor <= 0.0 {
            bail!("enki.annualization_factor must be positive");
        }
        if self.http.timeout_secs == 0 {
            bail!("http.timeout_secs must be greater than zero");
        }
        Ok(())
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "chain={} hercules={} aave={} netswap={} enki={} cache_max_age={:?}",
            self.network.chain_id,
            self.hercules.enabled,
            self.aave.enabled,
            self.netswap.enabled,
            self.enki.enabled,
            self.cache.max_age_secs
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
