//! Yield aggregation engine
//!
//! Fans out to every registered source concurrently, normalizes what comes
//! back, and keeps the merged result as one owned snapshot. Queries are
//! answered from the snapshot; population happens lazily on first use, when
//! the snapshot is older than the configured max age, or on `refresh()`.
//!
//! Population runs under a mutex, so concurrent cache misses collapse into
//! a single fan-out: whoever waits on the lock finds the snapshot already
//! filled and reuses it.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ethers::providers::{Http, Provider};
use futures_util::future::join_all;
use rust_decimal::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::format::format_usd;
use crate::normalize::to_unified;
use crate::sources::{
    AaveSource, EnkiSource, GraphQlClient, HerculesSource, HttpPoolSummary, NetswapSource,
    OnChainLendingMarket, OnChainSupplyHistory, SourceError, SubgraphDistributionIndex,
    SubgraphPairListing, YieldSource,
};
use crate::types::{ProtocolCategory, TvlSummary, UnifiedYieldRecord, AAVE, ENKI, HERCULES, NETSWAP};

/// Records returned by `get_top_yield` when no limit is given
pub const DEFAULT_TOP_LIMIT: usize = 10;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregatorError {
    #[error("All yield sources failed and no cached data is available: {}", .0.join("; "))]
    AllSourcesFailed(Vec<String>),
}

/// Result of one source in the most recent fan-out
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceOutcome {
    pub source: String,
    #[serde(flatten)]
    pub status: SourceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SourceStatus {
    Ok { records: usize },
    Failed { error: String },
}

/// Cache state reported to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotInfo {
    pub records: usize,
    pub fetched_at: Option<DateTime<Utc>>,
    pub age_secs: Option<u64>,
    pub max_age_secs: Option<u64>,
    pub sources: Vec<SourceOutcome>,
}

struct Snapshot {
    records: Arc<Vec<UnifiedYieldRecord>>,
    fetched_at: DateTime<Utc>,
    loaded_at: Instant,
}

impl Snapshot {
    fn is_fresh(&self, max_age: Option<Duration>) -> bool {
        match max_age {
            Some(max_age) => self.loaded_at.elapsed() < max_age,
            None => true,
        }
    }
}

pub struct YieldAggregator {
    /// Registration order is the merge order
    sources: Vec<Arc<dyn YieldSource>>,
    max_age: Option<Duration>,
    cache: RwLock<Option<Snapshot>>,
    outcomes: RwLock<Vec<SourceOutcome>>,
    populate: Mutex<()>,
}

impl YieldAggregator {
    pub fn new(sources: Vec<Arc<dyn YieldSource>>, max_age: Option<Duration>) -> Self {
        Self {
            sources,
            max_age,
            cache: RwLock::new(None),
            outcomes: RwLock::new(Vec::new()),
            populate: Mutex::new(()),
        }
    }

    /// Build the production source set in Hercules, AAVE, Netswap, Enki order
    ///
    /// Sources that are disabled or missing their endpoint/contract settings
    /// are left out with a warning.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.http.timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let mut sources: Vec<Arc<dyn YieldSource>> = Vec::new();
        let mut provider: Option<Arc<Provider<Http>>> = None;
        let mut rpc = || -> Result<Arc<Provider<Http>>> {
            if let Some(provider) = &provider {
                return Ok(provider.clone());
            }
            let created = Arc::new(
                Provider::<Http>::try_from(config.network.rpc_url.as_str())
                    .with_context(|| format!("Invalid RPC URL {}", config.network.rpc_url))?
                    .interval(Duration::from_millis(500)),
            );
            provider = Some(created.clone());
            Ok(created)
        };

        let hercules = &config.hercules;
        if enabled(HERCULES, hercules.enabled, &[&hercules.subgraph_url]) {
            let listing =
                SubgraphPairListing::new(GraphQlClient::new(http.clone(), &hercules.subgraph_url));
            sources.push(Arc::new(HerculesSource::new(listing, hercules)));
        }

        let aave = &config.aave;
        if enabled(AAVE, aave.enabled, &[&aave.data_provider, &aave.oracle]) {
            let market = OnChainLendingMarket::new(rpc()?, aave)
                .context("Failed to build AAVE lending market")?;
            sources.push(Arc::new(AaveSource::new(market)));
        }

        let netswap = &config.netswap;
        if enabled(NETSWAP, netswap.enabled, &[&netswap.summary_url]) {
            let summary = HttpPoolSummary::new(http.clone(), &netswap.summary_url);
            sources.push(Arc::new(NetswapSource::new(summary)));
        }

        let enki = &config.enki;
        if enabled(ENKI, enki.enabled, &[&enki.subgraph_url, &enki.staking_token]) {
            let index =
                SubgraphDistributionIndex::new(GraphQlClient::new(http.clone(), &enki.subgraph_url));
            let history = OnChainSupplyHistory::new(rpc()?, &enki.staking_token)
                .context("Failed to build Enki supply history")?;
            sources.push(Arc::new(EnkiSource::new(index, history, enki)));
        }

        info!(
            sources = ?sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            max_age = ?config.cache.max_age(),
            "Yield aggregator configured"
        );
        Ok(Self::new(sources, config.cache.max_age()))
    }

    /// Names of the registered sources, in merge order
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub async fn get_all_data(&self) -> Result<Vec<UnifiedYieldRecord>, AggregatorError> {
        Ok(self.records().await?.as_ref().clone())
    }

    /// Case-insensitive exact match on the protocol display name
    pub async fn get_data_by_protocol(
        &self,
        protocol_name: &str,
    ) -> Result<Vec<UnifiedYieldRecord>, AggregatorError> {
        let records = self.records().await?;
        Ok(records
            .iter()
            .filter(|r| r.protocol_name.eq_ignore_ascii_case(protocol_name))
            .cloned()
            .collect())
    }

    pub async fn get_data_by_category(
        &self,
        category: ProtocolCategory,
    ) -> Result<Vec<UnifiedYieldRecord>, AggregatorError> {
        let records = self.records().await?;
        Ok(records
            .iter()
            .filter(|r| r.category() == category)
            .cloned()
            .collect())
    }

    /// Highest APY first; ties keep merge order
    pub async fn get_top_yield(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<UnifiedYieldRecord>, AggregatorError> {
        let mut records = self.records().await?.as_ref().clone();
        // sort_by is stable
        records.sort_by(|a, b| b.apy.total_cmp(&a.apy));
        records.truncate(limit.unwrap_or(DEFAULT_TOP_LIMIT));
        Ok(records)
    }

    /// Case-insensitive substring match on the record name
    pub async fn get_data_by_token(
        &self,
        token: &str,
    ) -> Result<Vec<UnifiedYieldRecord>, AggregatorError> {
        let needle = token.to_lowercase();
        let records = self.records().await?;
        Ok(records
            .iter()
            .filter(|r| r.name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    pub async fn get_total_tvl(&self) -> Result<TvlSummary, AggregatorError> {
        let records = self.records().await?;

        let mut total = Decimal::ZERO;
        let mut by_protocol: BTreeMap<String, Decimal> = BTreeMap::new();
        for record in records.iter() {
            let tvl = Decimal::from_f64(record.tvl).unwrap_or_default();
            total += tvl;
            *by_protocol.entry(record.protocol_name.clone()).or_default() += tvl;
        }

        Ok(TvlSummary {
            total_tvl: format_usd(total.to_f64().unwrap_or(0.0)),
            by_protocol: by_protocol
                .into_iter()
                .map(|(name, tvl)| (name, format_usd(tvl.to_f64().unwrap_or(0.0))))
                .collect(),
        })
    }

    /// Re-run the fan-out regardless of snapshot age; returns the record count
    pub async fn refresh(&self) -> Result<usize, AggregatorError> {
        let _guard = self.populate.lock().await;
        Ok(self.populate_locked().await?.len())
    }

    /// Drop the snapshot; the next query repopulates
    pub async fn invalidate(&self) {
        let _guard = self.populate.lock().await;
        if self.cache.write().await.take().is_some() {
            info!("Yield snapshot invalidated");
        }
    }

    pub async fn snapshot_info(&self) -> SnapshotInfo {
        let cache = self.cache.read().await;
        let sources = self.outcomes.read().await.clone();
        SnapshotInfo {
            records: cache.as_ref().map(|s| s.records.len()).unwrap_or(0),
            fetched_at: cache.as_ref().map(|s| s.fetched_at),
            age_secs: cache.as_ref().map(|s| s.loaded_at.elapsed().as_secs()),
            max_age_secs: self.max_age.map(|d| d.as_secs()),
            sources,
        }
    }

    /// Periodically refresh the snapshot until the task is aborted
    pub fn spawn_refresh_task(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match self.refresh().await {
                    Ok(count) => debug!(records = count, "Background refresh complete"),
                    Err(e) => warn!(error = %e, "Background refresh failed"),
                }
            }
        })
    }

    async fn fresh_records(&self) -> Option<Arc<Vec<UnifiedYieldRecord>>> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|snapshot| snapshot.is_fresh(self.max_age))
            .map(|snapshot| snapshot.records.clone())
    }

    async fn records(&self) -> Result<Arc<Vec<UnifiedYieldRecord>>, AggregatorError> {
        if let Some(records) = self.fresh_records().await {
            return Ok(records);
        }

        let _guard = self.populate.lock().await;
        // Another caller may have populated while we waited
        if let Some(records) = self.fresh_records().await {
            return Ok(records);
        }
        self.populate_locked().await
    }

    /// Caller must hold `self.populate`
    async fn populate_locked(&self) -> Result<Arc<Vec<UnifiedYieldRecord>>, AggregatorError> {
        let started = Instant::now();
        // Each source runs on its own task so a panicking adapter only fails itself
        let results = join_all(self.sources.iter().map(|source| {
            let source = source.clone();
            async move {
                let name = source.name();
                let result = match tokio::spawn(async move { source.fetch().await }).await {
                    Ok(result) => result,
                    Err(e) => Err(SourceError::Aborted(e.to_string())),
                };
                (name, result)
            }
        }))
        .await;

        let mut records = Vec::new();
        let mut outcomes = Vec::with_capacity(results.len());
        let mut failures = Vec::new();

        for (name, result) in results {
            match result {
                Ok(raw) => {
                    let before = records.len();
                    records.extend(
                        raw.into_iter()
                            .map(|item| to_unified(name, item))
                            .filter(|record| record.category().is_known()),
                    );
                    let count = records.len() - before;
                    debug!(source = %name, count, "Source contributed records");
                    outcomes.push(SourceOutcome {
                        source: name.to_string(),
                        status: SourceStatus::Ok { records: count },
                    });
                }
                Err(e) => {
                    warn!(source = %name, error = %e, "Source failed, contributing no records");
                    failures.push(format!("{}: {}", name, e));
                    outcomes.push(SourceOutcome {
                        source: name.to_string(),
                        status: SourceStatus::Failed {
                            error: e.to_string(),
                        },
                    });
                }
            }
        }
        *self.outcomes.write().await = outcomes;

        if !self.sources.is_empty() && failures.len() == self.sources.len() {
            if let Some(snapshot) = self.cache.read().await.as_ref() {
                warn!(
                    failed = failures.len(),
                    records = snapshot.records.len(),
                    "All sources failed, serving stale snapshot"
                );
                return Ok(snapshot.records.clone());
            }
            error!(failed = failures.len(), "All sources failed with no snapshot to fall back on");
            return Err(AggregatorError::AllSourcesFailed(failures));
        }

        let records = Arc::new(records);
        *self.cache.write().await = Some(Snapshot {
            records: records.clone(),
            fetched_at: Utc::now(),
            loaded_at: Instant::now(),
        });

        info!(
            records = records.len(),
            failed = failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Yield snapshot populated"
        );
        Ok(records)
    }
}

fn enabled(name: &str, flag: bool, required: &[&str]) -> bool {
    if !flag {
        info!(source = %name, "Source disabled");
        return false;
    }
    if required.iter().any(|value| value.trim().is_empty()) {
        warn!(source = %name, "Source enabled but not configured, skipping");
        return false;
    }
    true
}
