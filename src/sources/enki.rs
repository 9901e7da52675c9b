//! Enki liquid staking adapter
//!
//! Each reward distribution is priced against the staking token supply at
//! the distribution's block:
//! `amount_to_vault / total_supply * 365 * annualization_factor`.
//! Historical supply queries run concurrently; an event whose query or
//! math fails is skipped without affecting the rest of the batch.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use ethers::contract::abigen;
use ethers::providers::Middleware;
use ethers::types::{Address, BlockId, BlockNumber, U256, U64};
use ethers::utils::format_units;
use futures_util::future::join_all;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::graphql::GraphQlClient;
use super::{parse_decimal, RawYieldSource, SourceError, StakingDistribution, YieldSource};
use crate::config::EnkiConfig;
use crate::types::ENKI;

const DISTRIBUTIONS_QUERY: &str = r#"
query Distributions($first: Int!) {
  rewardDistributions(first: $first, orderBy: blockNumber, orderDirection: desc) {
    id
    amountToVault
    blockNumber
    blockTimestamp
  }
}
"#;

abigen!(
    Erc20Supply,
    r#"[
        function totalSupply() external view returns (uint256)
    ]"#
);

/// Reward distribution event, newest first
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionEvent {
    pub id: String,
    /// Raw token amount (integer string, token decimals applied downstream)
    pub amount_to_vault: String,
    pub block_number: String,
    #[serde(default)]
    pub block_timestamp: Option<String>,
}

/// Event-index source listing reward distributions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DistributionIndex: Send + Sync {
    async fn distributions(&self, limit: usize) -> Result<Vec<DistributionEvent>, SourceError>;
}

/// Point-in-time staking token supply
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SupplyHistory: Send + Sync {
    async fn total_supply_at(&self, block: u64) -> Result<U256, SourceError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DistributionsData {
    reward_distributions: Vec<DistributionEvent>,
}

pub struct SubgraphDistributionIndex {
    client: GraphQlClient,
}

impl SubgraphDistributionIndex {
    pub fn new(client: GraphQlClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DistributionIndex for SubgraphDistributionIndex {
    async fn distributions(&self, limit: usize) -> Result<Vec<DistributionEvent>, SourceError> {
        let data: DistributionsData = self
            .client
            .query(DISTRIBUTIONS_QUERY, json!({ "first": limit }))
            .await?;
        Ok(data.reward_distributions)
    }
}

/// Historical `totalSupply()` reads against an archive-capable RPC node
pub struct OnChainSupplyHistory<M> {
    token: Erc20Supply<M>,
}

impl<M: Middleware + 'static> OnChainSupplyHistory<M> {
    pub fn new(provider: Arc<M>, token: &str) -> Result<Self, SourceError> {
        let address = token
            .parse::<Address>()
            .map_err(|_| SourceError::InvalidValue {
                field: "enki.staking_token".to_string(),
                value: token.to_string(),
            })?;
        Ok(Self {
            token: Erc20Supply::new(address, provider),
        })
    }
}

#[async_trait]
impl<M: Middleware + 'static> SupplyHistory for OnChainSupplyHistory<M> {
    async fn total_supply_at(&self, block: u64) -> Result<U256, SourceError> {
        self.token
            .total_supply()
            .block(BlockId::Number(BlockNumber::Number(U64::from(block))))
            .call()
            .await
            .map_err(|e| SourceError::Contract(e.to_string()))
    }
}

pub struct EnkiSource<I, H> {
    index: I,
    history: H,
    token_decimals: u32,
    event_limit: usize,
    annualization_factor: Decimal,
}

impl<I: DistributionIndex, H: SupplyHistory> EnkiSource<I, H> {
    pub fn new(index: I, history: H, config: &EnkiConfig) -> Self {
        Self {
            index,
            history,
            token_decimals: config.token_decimals,
            event_limit: config.event_limit.max(1),
            annualization_factor: Decimal::from_f64(config.annualization_factor)
                .unwrap_or(dec!(10)),
        }
    }

    async fn price_event(&self, event: DistributionEvent) -> Result<StakingDistribution, SourceError> {
        let block_number = event
            .block_number
            .trim()
            .parse::<u64>()
            .map_err(|_| SourceError::InvalidValue {
                field: "blockNumber".to_string(),
                value: event.block_number.clone(),
            })?;
        let amount = U256::from_dec_str(event.amount_to_vault.trim()).map_err(|_| {
            SourceError::InvalidValue {
                field: "amountToVault".to_string(),
                value: event.amount_to_vault.clone(),
            }
        })?;

        let supply = self.history.total_supply_at(block_number).await?;
        if supply.is_zero() {
            return Err(SourceError::InvalidValue {
                field: "totalSupply".to_string(),
                value: "0".to_string(),
            });
        }

        let amount_units = self.token_units(amount)?;
        let supply_units = self.token_units(supply)?;
        let apr = distribution_apr(amount_units, supply_units, self.annualization_factor)
            .ok_or_else(|| SourceError::InvalidValue {
                field: "apr".to_string(),
                value: format!("{} / {}", amount_units, supply_units),
            })?;

        let timestamp = event
            .block_timestamp
            .as_deref()
            .and_then(|t| t.trim().parse::<i64>().ok())
            .unwrap_or(0);

        Ok(StakingDistribution {
            label: distribution_label(timestamp, block_number),
            block_number,
            timestamp,
            amount_to_vault: amount_units.to_f64().unwrap_or(0.0),
            total_supply: supply_units.to_f64().unwrap_or(0.0),
            apr: apr.to_f64().unwrap_or(0.0),
        })
    }

    fn token_units(&self, amount: U256) -> Result<Decimal, SourceError> {
        let text = format_units(amount, self.token_decimals).map_err(|e| {
            SourceError::InvalidValue {
                field: "amount".to_string(),
                value: e.to_string(),
            }
        })?;
        parse_decimal(&text).ok_or(SourceError::InvalidValue {
            field: "amount".to_string(),
            value: text,
        })
    }
}

/// Per-distribution rate scaled to a year
pub(crate) fn distribution_apr(amount: Decimal, supply: Decimal, factor: Decimal) -> Option<Decimal> {
    if supply <= Decimal::ZERO {
        return None;
    }
    amount
        .checked_div(supply)?
        .checked_mul(dec!(365))?
        .checked_mul(factor)
}

fn distribution_label(timestamp: i64, block_number: u64) -> String {
    match Utc.timestamp_opt(timestamp, 0).single() {
        Some(dt) if timestamp > 0 => format!("Distribution {}", dt.format("%Y-%m-%d %H:%M UTC")),
        _ => format!("Distribution #{}", block_number),
    }
}

#[async_trait]
impl<I: DistributionIndex, H: SupplyHistory> YieldSource for EnkiSource<I, H> {
    fn name(&self) -> &'static str {
        ENKI
    }

    async fn fetch(&self) -> Result<Vec<RawYieldSource>, SourceError> {
        let events = self
            .index
            .distributions(self.event_limit)
            .await
            .map_err(|e| {
                warn!(source = %ENKI, error = %e, "Failed to list distributions");
                e
            })?;
        let total = events.len();

        let priced = join_all(events.into_iter().map(|event| async move {
            let id = event.id.clone();
            (id, self.price_event(event).await)
        }))
        .await;

        let records: Vec<RawYieldSource> = priced
            .into_iter()
            .filter_map(|(id, result)| match result {
                Ok(distribution) => Some(RawYieldSource::StakingDistribution(distribution)),
                Err(e) => {
                    warn!(source = %ENKI, event = %id, error = %e, "Skipping distribution");
                    None
                }
            })
            .collect();

        debug!(source = %ENKI, skipped = total - records.len(), "Priced distributions");
        info!(source = %ENKI, distributions = records.len(), "Fetched Enki distributions");
        Ok(records)
    }
}
