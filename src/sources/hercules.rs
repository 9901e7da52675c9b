//! Hercules DEX adapter
//!
//! Pages through the pair-listing subgraph, drops pairs below the liquidity
//! floor, and derives a fee APR from the trailing 24h volume:
//! `volume_24h * 365 * fee_rate / reserve_usd * 100`.

use async_trait::async_trait;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::graphql::GraphQlClient;
use super::{parse_decimal, DexPair, RawYieldSource, SourceError, YieldSource};
use crate::config::HerculesConfig;
use crate::types::HERCULES;

const PAIRS_QUERY: &str = r#"
query Pairs($first: Int!, $skip: Int!) {
  pairs(first: $first, skip: $skip, orderBy: reserveUSD, orderDirection: desc) {
    id
    reserveUSD
    token0 { symbol }
    token1 { symbol }
    pairHourData(first: 24, orderBy: hourStartUnix, orderDirection: desc) {
      hourlyVolumeUSD
    }
  }
}
"#;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PairToken {
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HourBucket {
    #[serde(rename = "hourlyVolumeUSD")]
    pub hourly_volume_usd: String,
}

/// Pair as returned by the listing source
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PairRecord {
    pub id: String,
    #[serde(rename = "reserveUSD")]
    pub reserve_usd: String,
    pub token0: PairToken,
    pub token1: PairToken,
    #[serde(rename = "pairHourData", default)]
    pub hour_data: Option<Vec<HourBucket>>,
}

/// Paginated pair listing ordered by reserve size
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PairListing: Send + Sync {
    async fn fetch_page(&self, skip: usize, first: usize) -> Result<Vec<PairRecord>, SourceError>;
}

#[derive(Debug, Deserialize)]
struct PairsData {
    pairs: Vec<PairRecord>,
}

/// Pair listing backed by the Hercules subgraph
pub struct SubgraphPairListing {
    client: GraphQlClient,
}

impl SubgraphPairListing {
    pub fn new(client: GraphQlClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PairListing for SubgraphPairListing {
    async fn fetch_page(&self, skip: usize, first: usize) -> Result<Vec<PairRecord>, SourceError> {
        debug!(
            source = %HERCULES,
            endpoint = %self.client.endpoint(),
            skip,
            first,
            "Requesting pair page"
        );
        let data: PairsData = self
            .client
            .query(PAIRS_QUERY, json!({ "first": first, "skip": skip }))
            .await?;
        Ok(data.pairs)
    }
}

pub struct HerculesSource<L> {
    listing: L,
    page_size: usize,
    max_pages: usize,
    fee_rate: Decimal,
    min_reserve_usd: Decimal,
}

impl<L: PairListing> HerculesSource<L> {
    pub fn new(listing: L, config: &HerculesConfig) -> Self {
        Self {
            listing,
            page_size: config.page_size.max(1),
            max_pages: config.max_pages.max(1),
            fee_rate: Decimal::from_f64(config.fee_rate).unwrap_or(dec!(0.0025)),
            min_reserve_usd: Decimal::from_f64(config.min_reserve_usd).unwrap_or(dec!(1000)),
        }
    }

    /// Page until an empty page comes back; the floor must see every pair
    async fn fetch_all_pairs(&self) -> Result<Vec<PairRecord>, SourceError> {
        let mut pairs = Vec::new();
        let mut skip = 0;

        for page_idx in 0..self.max_pages {
            let page = self.listing.fetch_page(skip, self.page_size).await?;
            debug!(source = %HERCULES, page = page_idx, count = page.len(), "Fetched pair page");
            if page.is_empty() {
                return Ok(pairs);
            }
            skip += page.len();
            pairs.extend(page);
        }

        warn!(
            source = %HERCULES,
            max_pages = self.max_pages,
            pairs = pairs.len(),
            "Stopped paging at page limit"
        );
        Ok(pairs)
    }

    fn to_dex_pair(&self, pair: &PairRecord) -> Option<DexPair> {
        let reserve_usd = parse_decimal(&pair.reserve_usd).unwrap_or(Decimal::ZERO);
        if reserve_usd <= Decimal::ZERO || reserve_usd <= self.min_reserve_usd {
            return None;
        }

        let volume_24h: Decimal = pair
            .hour_data
            .iter()
            .flatten()
            .filter_map(|bucket| parse_decimal(&bucket.hourly_volume_usd))
            .sum();

        let apr = fee_apr(volume_24h, reserve_usd, self.fee_rate);

        Some(DexPair {
            pool_address: pair.id.clone(),
            token0: pair.token0.symbol.clone(),
            token1: pair.token1.symbol.clone(),
            reserve_usd: reserve_usd.to_f64().unwrap_or(0.0),
            volume_24h_usd: volume_24h.to_f64().unwrap_or(0.0),
            apr: apr.to_f64().unwrap_or(0.0),
        })
    }
}

/// Annualized fee yield in percent, rounded to 2 decimals
pub(crate) fn fee_apr(volume_24h: Decimal, reserve_usd: Decimal, fee_rate: Decimal) -> Decimal {
    if reserve_usd <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    volume_24h
        .checked_mul(dec!(365))
        .and_then(|v| v.checked_mul(fee_rate))
        .and_then(|v| v.checked_div(reserve_usd))
        .and_then(|v| v.checked_mul(dec!(100)))
        .map(|v| v.round_dp(2))
        .unwrap_or(Decimal::ZERO)
}

#[async_trait]
impl<L: PairListing> YieldSource for HerculesSource<L> {
    fn name(&self) -> &'static str {
        HERCULES
    }

    async fn fetch(&self) -> Result<Vec<RawYieldSource>, SourceError> {
        let pairs = self.fetch_all_pairs().await.map_err(|e| {
            warn!(source = %HERCULES, error = %e, "Failed to fetch pairs");
            e
        })?;

        let retained: Vec<RawYieldSource> = pairs
            .iter()
            .filter_map(|pair| self.to_dex_pair(pair))
            .map(RawYieldSource::DexPair)
            .collect();

        info!(
            source = %HERCULES,
            pairs = pairs.len(),
            retained = retained.len(),
            "Fetched Hercules pairs"
        );
        Ok(retained)
    }
}
