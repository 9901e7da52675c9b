//! JSON-lines query protocol
//!
//! One request object per line in, one response object per line out:
//!
//! ```text
//! {"id": 1, "op": "getTopYield", "limit": 5}
//! {"id": 1, "ok": true, "result": [...]}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::aggregator::YieldAggregator;
use crate::types::ProtocolCategory;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Operation {
    GetAllData,
    GetDataByProtocol {
        protocol: String,
    },
    GetDataByCategory {
        category: String,
    },
    GetTopYield {
        #[serde(default)]
        limit: Option<usize>,
    },
    GetDataByToken {
        token: String,
    },
    GetTotalTvl,
    Refresh,
    Invalidate,
    Status,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub id: Value,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Value, error: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Parse one request line into its id and operation
pub fn parse_request(line: &str) -> Result<(Value, Operation), (Value, String)> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| (Value::Null, format!("Invalid JSON: {}", e)))?;
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let op = serde_json::from_value::<Operation>(value)
        .map_err(|e| (id.clone(), format!("Invalid request: {}", e)))?;
    Ok((id, op))
}

pub async fn dispatch(aggregator: &YieldAggregator, op: Operation) -> Result<Value, String> {
    match op {
        Operation::GetAllData => to_value(aggregator.get_all_data().await),
        Operation::GetDataByProtocol { protocol } => {
            to_value(aggregator.get_data_by_protocol(&protocol).await)
        }
        Operation::GetDataByCategory { category } => {
            let category = ProtocolCategory::from_str(&category)
                .ok_or_else(|| format!("Unknown category '{}'", category))?;
            to_value(aggregator.get_data_by_category(category).await)
        }
        Operation::GetTopYield { limit } => to_value(aggregator.get_top_yield(limit).await),
        Operation::GetDataByToken { token } => to_value(aggregator.get_data_by_token(&token).await),
        Operation::GetTotalTvl => to_value(aggregator.get_total_tvl().await),
        Operation::Refresh => to_value(
            aggregator
                .refresh()
                .await
                .map(|records| serde_json::json!({ "records": records })),
        ),
        Operation::Invalidate => {
            aggregator.invalidate().await;
            Ok(Value::Bool(true))
        }
        Operation::Status => to_value(Ok::<_, String>(aggregator.snapshot_info().await)),
    }
}

fn to_value<T: Serialize, E: std::fmt::Display>(result: Result<T, E>) -> Result<Value, String> {
    let data = result.map_err(|e| e.to_string())?;
    serde_json::to_value(data).map_err(|e| format!("Failed to serialize result: {}", e))
}

/// Handle one request line end to end
pub async fn handle_line(aggregator: &YieldAggregator, line: &str) -> Response {
    let (id, op) = match parse_request(line) {
        Ok(parsed) => parsed,
        Err((id, error)) => {
            warn!(error = %error, "Rejected request");
            return Response::failure(id, error);
        }
    };

    debug!(id = %id, op = ?op, "Handling request");
    match dispatch(aggregator, op).await {
        Ok(result) => Response::success(id, result),
        Err(error) => {
            warn!(id = %id, error = %error, "Request failed");
            Response::failure(id, error)
        }
    }
}

/// Serve requests until the reader hits EOF
pub async fn serve<R, W>(aggregator: &YieldAggregator, reader: R, mut writer: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(aggregator, &line).await;
        let mut encoded = serde_json::to_vec(&response)?;
        encoded.push(b'\n');
        writer.write_all(&encoded).await?;
        writer.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{LendingReserve, RawYieldSource, SourceError, YieldSource};
    use crate::types::AAVE;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct StaticLending;

    #[async_trait]
    impl YieldSource for StaticLending {
        fn name(&self) -> &'static str {
            AAVE
        }

        async fn fetch(&self) -> Result<Vec<RawYieldSource>, SourceError> {
            Ok(vec![RawYieldSource::LendingReserve(LendingReserve {
                symbol: "m.USDC".to_string(),
                supply_apy: 4.0,
                total_liquidity_usd: 2_500_000.0,
                ..Default::default()
            })])
        }
    }

    fn aggregator() -> YieldAggregator {
        YieldAggregator::new(vec![Arc::new(StaticLending) as Arc<dyn YieldSource>], None)
    }

    #[test]
    fn test_parse_request_variants() {
        let (id, op) = parse_request(r#"{"id": 7, "op": "getTopYield", "limit": 3}"#).unwrap();
        assert_eq!(id, json!(7));
        assert_eq!(op, Operation::GetTopYield { limit: Some(3) });

        let (_, op) = parse_request(r#"{"id": "a", "op": "getTopYield"}"#).unwrap();
        assert_eq!(op, Operation::GetTopYield { limit: None });

        let (_, op) = parse_request(r#"{"op": "getTotalTvl"}"#).unwrap();
        assert_eq!(op, Operation::GetTotalTvl);
    }

    #[test]
    fn test_parse_request_errors_keep_id() {
        let (id, error) = parse_request(r#"{"id": 3, "op": "launchRockets"}"#).unwrap_err();
        assert_eq!(id, json!(3));
        assert!(error.starts_with("Invalid request"));

        let (id, _) = parse_request("not json").unwrap_err();
        assert_eq!(id, Value::Null);
    }

    #[tokio::test]
    async fn test_handle_line_round_trip() {
        let aggregator = aggregator();

        let response = handle_line(&aggregator, r#"{"id": 1, "op": "getDataByProtocol", "protocol": "aave"}"#).await;
        assert!(response.ok);
        let result = response.result.unwrap();
        assert_eq!(result[0]["protocol"], json!("Lending"));
        assert_eq!(result[0]["protocolName"], json!("AAVE"));
        assert_eq!(result[0]["name"], json!("m.USDC"));

        let response = handle_line(&aggregator, r#"{"id": 2, "op": "getTotalTvl"}"#).await;
        assert_eq!(
            response.result.unwrap(),
            json!({ "totalTvl": "$2.50M", "byProtocol": { "AAVE": "$2.50M" } })
        );
    }

    #[tokio::test]
    async fn test_unknown_category_is_an_error_response() {
        let aggregator = aggregator();
        let response =
            handle_line(&aggregator, r#"{"id": 9, "op": "getDataByCategory", "category": "nft"}"#).await;
        assert!(!response.ok);
        assert_eq!(response.id, json!(9));
        assert_eq!(response.error.as_deref(), Some("Unknown category 'nft'"));
    }

    #[tokio::test]
    async fn test_serve_writes_one_line_per_request() {
        let aggregator = aggregator();
        let input = b"{\"id\":1,\"op\":\"refresh\"}\n\n{\"id\":2,\"op\":\"status\"}\n";
        let mut output = Vec::new();

        serve(&aggregator, &input[..], &mut output).await.unwrap();

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["result"], json!({ "records": 1 }));
        assert_eq!(lines[1]["result"]["records"], json!(1));
        assert_eq!(lines[1]["result"]["sources"][0]["status"], json!("ok"));
    }
}
