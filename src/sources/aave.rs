//! AAVE v3 lending adapter
//!
//! Reads the reserve list and incentive emissions from the lending market,
//! converts fractional rates into percentages and attaches the supply-side
//! incentive APR to each reserve. Either view failing fails the whole call.

use async_trait::async_trait;
use ethers::contract::abigen;
use ethers::providers::Middleware;
use ethers::types::{Address, U256};
use ethers::utils::format_units;
use futures_util::future::try_join_all;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{parse_decimal, LendingReserve, RawYieldSource, SourceError, YieldSource};
use crate::config::AaveConfig;
use crate::types::AAVE;

/// Seconds per year used by the protocol's rate model
pub const SECONDS_PER_YEAR: f64 = 31_536_000.0;

/// RAY precision of on-chain rates
const RAY_DECIMALS: u32 = 27;

/// Oracle base currency precision (USD, 8 decimals)
const ORACLE_DECIMALS: u32 = 8;

abigen!(
    AaveProtocolDataProvider,
    r#"[
        struct TokenData { string symbol; address tokenAddress; }
        function getAllReservesTokens() external view returns (TokenData[])
        function getReserveConfigurationData(address asset) external view returns (uint256 decimals, uint256 ltv, uint256 liquidationThreshold, uint256 liquidationBonus, uint256 reserveFactor, bool usageAsCollateralEnabled, bool borrowingEnabled, bool stableBorrowRateEnabled, bool isActive, bool isFrozen)
        function getReserveData(address asset) external view returns (uint256 unbacked, uint256 accruedToTreasuryScaled, uint256 totalAToken, uint256 totalStableDebt, uint256 totalVariableDebt, uint256 liquidityRate, uint256 variableBorrowRate, uint256 stableBorrowRate, uint256 averageStableBorrowRate, uint256 liquidityIndex, uint256 variableBorrowIndex, uint40 lastUpdateTimestamp)
        function getReserveTokensAddresses(address asset) external view returns (address aTokenAddress, address stableDebtTokenAddress, address variableDebtTokenAddress)
    ]"#
);

abigen!(
    AaveOracle,
    r#"[
        function getAssetPrice(address asset) external view returns (uint256)
    ]"#
);

abigen!(
    RewardsController,
    r#"[
        function getRewardsByAsset(address asset) external view returns (address[])
        function getRewardsData(address asset, address reward) external view returns (uint256, uint256, uint256, uint256)
    ]"#
);

abigen!(
    Erc20Decimals,
    r#"[
        function decimals() external view returns (uint8)
    ]"#
);

/// Reserve as reported by the market view
///
/// Rates are fractional decimal strings ("0.0345" = 3.45%), totals are USD.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReserveRecord {
    pub underlying_asset: String,
    pub symbol: String,
    pub supply_apy: String,
    pub variable_borrow_apy: String,
    pub stable_borrow_apy: String,
    pub total_liquidity_usd: String,
    pub total_debt_usd: String,
}

/// Active reward emission on a reserve's supply side
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IncentiveRecord {
    pub underlying_asset: String,
    pub reward_token: String,
    /// Emission value per year in USD
    pub emission_usd_per_year: String,
}

/// Reserve-data and incentive-data views of a lending market
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LendingMarket: Send + Sync {
    async fn reserves(&self) -> Result<Vec<ReserveRecord>, SourceError>;

    async fn incentives(&self) -> Result<Vec<IncentiveRecord>, SourceError>;
}

pub struct AaveSource<M> {
    market: M,
}

impl<M: LendingMarket> AaveSource<M> {
    pub fn new(market: M) -> Self {
        Self { market }
    }
}

/// Fraction string to percentage; malformed values count as 0
fn fraction_to_pct(text: &str) -> f64 {
    parse_decimal(text)
        .and_then(|v| v.checked_mul(dec!(100)))
        .and_then(|v| v.to_f64())
        .unwrap_or(0.0)
}

fn usd(text: &str) -> Decimal {
    parse_decimal(text).unwrap_or(Decimal::ZERO)
}

fn to_lending_reserve(reserve: &ReserveRecord, emissions: &HashMap<String, Decimal>) -> LendingReserve {
    let total_liquidity_usd = usd(&reserve.total_liquidity_usd);
    let incentive_apr = emissions
        .get(&reserve.underlying_asset.to_lowercase())
        .filter(|_| total_liquidity_usd > Decimal::ZERO)
        .and_then(|emission| emission.checked_div(total_liquidity_usd))
        .and_then(|v| v.checked_mul(dec!(100)))
        .and_then(|v| v.to_f64())
        .unwrap_or(0.0);

    LendingReserve {
        symbol: reserve.symbol.clone(),
        underlying_asset: reserve.underlying_asset.clone(),
        supply_apy: fraction_to_pct(&reserve.supply_apy),
        variable_borrow_apy: fraction_to_pct(&reserve.variable_borrow_apy),
        stable_borrow_apy: fraction_to_pct(&reserve.stable_borrow_apy),
        incentive_apr,
        total_liquidity_usd: total_liquidity_usd.to_f64().unwrap_or(0.0),
        total_debt_usd: usd(&reserve.total_debt_usd).to_f64().unwrap_or(0.0),
    }
}

#[async_trait]
impl<M: LendingMarket> YieldSource for AaveSource<M> {
    fn name(&self) -> &'static str {
        AAVE
    }

    async fn fetch(&self) -> Result<Vec<RawYieldSource>, SourceError> {
        let (reserves, incentives) =
            tokio::try_join!(self.market.reserves(), self.market.incentives()).map_err(|e| {
                warn!(source = %AAVE, error = %e, "Failed to read lending market");
                e
            })?;

        let mut emissions: HashMap<String, Decimal> = HashMap::new();
        for incentive in &incentives {
            *emissions
                .entry(incentive.underlying_asset.to_lowercase())
                .or_insert(Decimal::ZERO) += usd(&incentive.emission_usd_per_year);
        }

        let records: Vec<RawYieldSource> = reserves
            .iter()
            .map(|reserve| RawYieldSource::LendingReserve(to_lending_reserve(reserve, &emissions)))
            .collect();

        info!(
            source = %AAVE,
            reserves = records.len(),
            incentives = incentives.len(),
            "Fetched AAVE reserves"
        );
        Ok(records)
    }
}

// ─────────────────────────────────────────────────────────────────
// On-chain market
// ─────────────────────────────────────────────────────────────────

fn contract_err(e: impl std::fmt::Display) -> SourceError {
    SourceError::Contract(e.to_string())
}

fn parse_address(field: &str, value: &str) -> Result<Address, SourceError> {
    value.parse::<Address>().map_err(|_| SourceError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn units(amount: U256, decimals: u32) -> Result<f64, SourceError> {
    let text = format_units(amount, decimals).map_err(|e| SourceError::InvalidValue {
        field: "amount".to_string(),
        value: e.to_string(),
    })?;
    Ok(text.parse::<f64>().unwrap_or(0.0))
}

/// Per-second compounded APY (fraction) from a RAY-denominated APR
pub(crate) fn ray_rate_to_apy(rate: U256) -> Result<f64, SourceError> {
    let apr = units(rate, RAY_DECIMALS)?;
    Ok((1.0 + apr / SECONDS_PER_YEAR).powf(SECONDS_PER_YEAR) - 1.0)
}

/// Lending market read from AAVE v3 periphery contracts
pub struct OnChainLendingMarket<M> {
    provider: Arc<M>,
    data_provider: AaveProtocolDataProvider<M>,
    oracle: AaveOracle<M>,
    rewards: Option<RewardsController<M>>,
}

impl<M: Middleware + 'static> OnChainLendingMarket<M> {
    pub fn new(provider: Arc<M>, config: &AaveConfig) -> Result<Self, SourceError> {
        let data_provider = parse_address("aave.data_provider", &config.data_provider)?;
        let oracle = parse_address("aave.oracle", &config.oracle)?;
        let rewards = if config.rewards_controller.trim().is_empty() {
            None
        } else {
            let address = parse_address("aave.rewards_controller", &config.rewards_controller)?;
            Some(RewardsController::new(address, provider.clone()))
        };

        Ok(Self {
            data_provider: AaveProtocolDataProvider::new(data_provider, provider.clone()),
            oracle: AaveOracle::new(oracle, provider.clone()),
            rewards,
            provider,
        })
    }

    async fn price_usd(&self, asset: Address) -> Result<f64, SourceError> {
        let price = self.oracle.get_asset_price(asset).call().await.map_err(contract_err)?;
        units(price, ORACLE_DECIMALS)
    }

    async fn read_reserve(&self, symbol: String, asset: Address) -> Result<ReserveRecord, SourceError> {
        let config = self
            .data_provider
            .get_reserve_configuration_data(asset)
            .call()
            .await
            .map_err(contract_err)?;
        let data = self
            .data_provider
            .get_reserve_data(asset)
            .call()
            .await
            .map_err(contract_err)?;
        let price = self.price_usd(asset).await?;

        let decimals = config.0.low_u32();
        let total_liquidity = units(data.2, decimals)?;
        // stable + variable debt
        let total_debt = units(data.3.saturating_add(data.4), decimals)?;

        Ok(ReserveRecord {
            underlying_asset: format!("{:?}", asset),
            symbol,
            supply_apy: ray_rate_to_apy(data.5)?.to_string(),
            variable_borrow_apy: ray_rate_to_apy(data.6)?.to_string(),
            stable_borrow_apy: ray_rate_to_apy(data.7)?.to_string(),
            total_liquidity_usd: (total_liquidity * price).to_string(),
            total_debt_usd: (total_debt * price).to_string(),
        })
    }

    async fn read_incentives(
        &self,
        rewards: &RewardsController<M>,
        asset: Address,
    ) -> Result<Vec<IncentiveRecord>, SourceError> {
        let (a_token, _, _) = self
            .data_provider
            .get_reserve_tokens_addresses(asset)
            .call()
            .await
            .map_err(contract_err)?;
        let reward_tokens = rewards
            .get_rewards_by_asset(a_token)
            .call()
            .await
            .map_err(contract_err)?;

        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let mut records = Vec::new();

        for reward in reward_tokens {
            let (_index, emission_per_second, _last_update, distribution_end) = rewards
                .get_rewards_data(a_token, reward)
                .call()
                .await
                .map_err(contract_err)?;

            if emission_per_second.is_zero() || distribution_end < U256::from(now) {
                continue;
            }

            // Reward tokens the oracle does not price carry no USD value
            let price = match self.price_usd(reward).await {
                Ok(price) => price,
                Err(e) => {
                    debug!(source = %AAVE, reward = ?reward, error = %e, "Skipping unpriced reward");
                    continue;
                }
            };
            let decimals = Erc20Decimals::new(reward, self.provider.clone())
                .decimals()
                .call()
                .await
                .map_err(contract_err)?;

            let per_second = units(emission_per_second, decimals as u32)?;
            records.push(IncentiveRecord {
                underlying_asset: format!("{:?}", asset),
                reward_token: format!("{:?}", reward),
                emission_usd_per_year: (per_second * SECONDS_PER_YEAR * price).to_string(),
            });
        }

        Ok(records)
    }
}

#[async_trait]
impl<M: Middleware + 'static> LendingMarket for OnChainLendingMarket<M> {
    async fn reserves(&self) -> Result<Vec<ReserveRecord>, SourceError> {
        let tokens = self
            .data_provider
            .get_all_reserves_tokens()
            .call()
            .await
            .map_err(contract_err)?;
        debug!(source = %AAVE, reserves = tokens.len(), "Listed reserves");

        try_join_all(
            tokens
                .into_iter()
                .map(|(symbol, asset)| self.read_reserve(symbol, asset)),
        )
        .await
    }

    async fn incentives(&self) -> Result<Vec<IncentiveRecord>, SourceError> {
        let Some(rewards) = &self.rewards else {
            return Ok(Vec::new());
        };

        let tokens = self
            .data_provider
            .get_all_reserves_tokens()
            .call()
            .await
            .map_err(contract_err)?;

        let per_reserve = try_join_all(
            tokens
                .iter()
                .map(|(_, asset)| self.read_incentives(rewards, *asset)),
        )
        .await?;

        Ok(per_reserve.into_iter().flatten().collect())
    }
}
