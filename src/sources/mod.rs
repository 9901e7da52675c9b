//! Yield source implementations (Hercules, AAVE, Netswap, Enki)
//!
//! Every adapter implements [`YieldSource`] and returns protocol-native
//! [`RawYieldSource`] records. Each one sits on a transport trait so the
//! derivation logic can be exercised without network access.

mod aave;
mod enki;
mod graphql;
mod hercules;
mod netswap;
#[cfg(test)]
mod testing;

pub use aave::{
    AaveSource, IncentiveRecord, LendingMarket, OnChainLendingMarket, ReserveRecord,
};
pub use enki::{
    DistributionEvent, DistributionIndex, EnkiSource, OnChainSupplyHistory,
    SubgraphDistributionIndex, SupplyHistory,
};
pub use graphql::GraphQlClient;
pub use hercules::{
    HerculesSource, HourBucket, PairListing, PairRecord, PairToken, SubgraphPairListing,
};
pub use netswap::{HttpPoolSummary, NetswapSource, PoolSummary};

use async_trait::async_trait;
use thiserror::Error;

/// Adapter-level failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Response is missing expected field '{0}'")]
    MissingField(String),

    #[error("Contract call failed: {0}")]
    Contract(String),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Source task aborted: {0}")]
    Aborted(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SourceError::Decode(e.to_string())
        } else {
            SourceError::Http(e.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        SourceError::Decode(e.to_string())
    }
}

/// Lending reserve with rates already converted to percentages
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LendingReserve {
    pub symbol: String,
    pub underlying_asset: String,
    pub supply_apy: f64,
    pub variable_borrow_apy: f64,
    pub stable_borrow_apy: f64,
    /// Bonus emission APR on the supply side, in percent
    pub incentive_apr: f64,
    pub total_liquidity_usd: f64,
    pub total_debt_usd: f64,
}

/// DEX pair with fee yield derived from trailing volume
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DexPair {
    pub pool_address: String,
    pub token0: String,
    pub token1: String,
    pub reserve_usd: f64,
    pub volume_24h_usd: f64,
    /// Fee APR in percent, rounded to 2 decimals
    pub apr: f64,
}

/// Pool as reported by a hosted summary endpoint (formatted strings)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HostedPool {
    pub pool_address: String,
    pub name: String,
    pub apy: Option<String>,
    pub apr: Option<String>,
    pub tvl: Option<String>,
}

/// One liquid-staking reward distribution priced against historical supply
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StakingDistribution {
    pub label: String,
    pub block_number: u64,
    pub timestamp: i64,
    /// Rewards sent to the vault, in token units
    pub amount_to_vault: f64,
    /// Staking token supply at `block_number`, in token units
    pub total_supply: f64,
    /// Annualized rate in percent
    pub apr: f64,
}

/// Protocol-native record produced by an adapter
#[derive(Debug, Clone, PartialEq)]
pub enum RawYieldSource {
    LendingReserve(LendingReserve),
    DexPair(DexPair),
    HostedPool(HostedPool),
    StakingDistribution(StakingDistribution),
}

/// Trait for protocol adapters
#[async_trait]
pub trait YieldSource: Send + Sync {
    /// Protocol display name; drives category lookup downstream
    fn name(&self) -> &'static str;

    /// Fetch the protocol's current yield records
    async fn fetch(&self) -> Result<Vec<RawYieldSource>, SourceError>;
}

/// Parse a decimal string from an upstream payload
///
/// Falls back to an `f64` parse when the string carries more digits than
/// `Decimal` holds.
pub(crate) fn parse_decimal(text: &str) -> Option<rust_decimal::Decimal> {
    use rust_decimal::prelude::FromPrimitive;
    use std::str::FromStr;

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    rust_decimal::Decimal::from_str(trimmed).ok().or_else(|| {
        trimmed
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .and_then(rust_decimal::Decimal::from_f64)
    })
}
