//! Netswap adapter
//!
//! The hosted summary endpoint already reports APY/APR/TVL per pool. The
//! adapter only validates the payload and flattens the
//! address → pool mapping into a list ordered by address.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};

use super::{HostedPool, RawYieldSource, SourceError, YieldSource};
use crate::types::NETSWAP;

/// Hosted summary returning `{ "data": { "<address>": { ... } } }`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PoolSummary: Send + Sync {
    async fn fetch_summary(&self) -> Result<Value, SourceError>;
}

pub struct HttpPoolSummary {
    client: Client,
    url: String,
}

impl HttpPoolSummary {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl PoolSummary for HttpPoolSummary {
    async fn fetch_summary(&self) -> Result<Value, SourceError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }
        Ok(response.json().await?)
    }
}

pub struct NetswapSource<S> {
    summary: S,
}

impl<S: PoolSummary> NetswapSource<S> {
    pub fn new(summary: S) -> Self {
        Self { summary }
    }
}

/// Strings pass through; numbers are rendered so downstream parsing is uniform
fn text_field(pool: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match pool.get(*key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn flatten_pools(payload: &Value) -> Result<Vec<HostedPool>, SourceError> {
    let pools = payload
        .get("data")
        .and_then(Value::as_object)
        .ok_or_else(|| SourceError::MissingField("data".to_string()))?;

    let mut entries: Vec<(&String, &Value)> = pools.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    Ok(entries
        .into_iter()
        .map(|(address, pool)| HostedPool {
            pool_address: address.clone(),
            name: text_field(pool, &["name", "symbol"]).unwrap_or_default(),
            apy: text_field(pool, &["apy"]),
            apr: text_field(pool, &["apr"]),
            tvl: text_field(pool, &["tvl", "liquidity"]),
        })
        .collect())
}

#[async_trait]
impl<S: PoolSummary> YieldSource for NetswapSource<S> {
    fn name(&self) -> &'static str {
        NETSWAP
    }

    async fn fetch(&self) -> Result<Vec<RawYieldSource>, SourceError> {
        let payload = self.summary.fetch_summary().await.map_err(|e| {
            warn!(source = %NETSWAP, error = %e, "Failed to fetch pool summary");
            e
        })?;

        let pools = flatten_pools(&payload).map_err(|e| {
            warn!(source = %NETSWAP, error = %e, "Malformed pool summary");
            e
        })?;

        info!(source = %NETSWAP, pools = pools.len(), "Fetched Netswap pools");
        Ok(pools.into_iter().map(RawYieldSource::HostedPool).collect())
    }
}
