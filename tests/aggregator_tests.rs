//! Aggregation engine tests against stub yield sources

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::sync::Arc;
    use yieldscope::aggregator::{SourceStatus, YieldAggregator, DEFAULT_TOP_LIMIT};
    use yieldscope::format::{format_amount, parse_formatted_amount};
    use yieldscope::sources::{
        DexPair, HostedPool, LendingReserve, RawYieldSource, SourceError, StakingDistribution,
        YieldSource,
    };
    use yieldscope::types::{ProtocolCategory, AAVE, ENKI, HERCULES, NETSWAP};

    /// Source returning a fixed record list, or failing
    struct StubSource {
        name: &'static str,
        records: Result<Vec<RawYieldSource>, SourceError>,
    }

    #[async_trait]
    impl YieldSource for StubSource {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch(&self) -> Result<Vec<RawYieldSource>, SourceError> {
            self.records.clone()
        }
    }

    fn stub(name: &'static str, records: Vec<RawYieldSource>) -> Arc<dyn YieldSource> {
        Arc::new(StubSource {
            name,
            records: Ok(records),
        })
    }

    fn failing(name: &'static str) -> Arc<dyn YieldSource> {
        Arc::new(StubSource {
            name,
            records: Err(SourceError::Contract("execution reverted".to_string())),
        })
    }

    fn pair(token0: &str, token1: &str, reserve_usd: f64) -> RawYieldSource {
        RawYieldSource::DexPair(DexPair {
            pool_address: format!("0x{}{}", token0.to_lowercase(), token1.to_lowercase()),
            token0: token0.to_string(),
            token1: token1.to_string(),
            reserve_usd,
            volume_24h_usd: 0.0,
            apr: 0.0,
        })
    }

    fn reserve(symbol: &str, supply_apy: f64, liquidity: f64) -> RawYieldSource {
        RawYieldSource::LendingReserve(LendingReserve {
            symbol: symbol.to_string(),
            supply_apy,
            total_liquidity_usd: liquidity,
            ..Default::default()
        })
    }

    fn hosted(name: &str, apy: &str) -> RawYieldSource {
        RawYieldSource::HostedPool(HostedPool {
            pool_address: format!("0x{}", name.to_lowercase()),
            name: name.to_string(),
            apy: Some(apy.to_string()),
            apr: None,
            tvl: Some("$10.0K".to_string()),
        })
    }

    fn distribution(label: &str) -> RawYieldSource {
        RawYieldSource::StakingDistribution(StakingDistribution {
            label: label.to_string(),
            apr: 0.4,
            total_supply: 50_000.0,
            ..Default::default()
        })
    }

    fn full_set() -> Vec<Arc<dyn YieldSource>> {
        vec![
            stub(HERCULES, vec![pair("METIS", "USDC", 5_000.0)]),
            stub(AAVE, vec![reserve("USDC", 3.0, 1_000_000.0)]),
            stub(NETSWAP, vec![hosted("WETH-METIS", "12.5%")]),
            stub(ENKI, vec![distribution("Distribution 2024-05-01 12:00 UTC")]),
        ]
    }

    // ============================================================================
    // Fan-out and isolation
    // ============================================================================

    #[tokio::test]
    async fn test_merge_follows_registration_order() {
        let aggregator = YieldAggregator::new(full_set(), None);
        let records = aggregator.get_all_data().await.unwrap();

        let names: Vec<&str> = records.iter().map(|r| r.protocol_name.as_str()).collect();
        assert_eq!(names, vec![HERCULES, AAVE, NETSWAP, ENKI]);
        assert!(records.iter().all(|r| r.category().is_known()));
    }

    #[tokio::test]
    async fn test_lending_failure_leaves_other_sources_intact() {
        let aggregator = YieldAggregator::new(
            vec![
                stub(HERCULES, vec![pair("METIS", "USDC", 5_000.0)]),
                failing(AAVE),
                stub(NETSWAP, vec![hosted("WETH-METIS", "12.5%")]),
                stub(ENKI, vec![distribution("Distribution 1")]),
            ],
            None,
        );

        let records = aggregator.get_all_data().await.unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.protocol_name.as_str()).collect();
        assert_eq!(names, vec![HERCULES, NETSWAP, ENKI]);

        let info = aggregator.snapshot_info().await;
        assert_eq!(info.records, 3);
        assert!(matches!(info.sources[1].status, SourceStatus::Failed { .. }));
        assert_eq!(info.sources[0].status, SourceStatus::Ok { records: 1 });
    }

    #[tokio::test]
    async fn test_unknown_protocols_are_dropped() {
        let aggregator = YieldAggregator::new(
            vec![
                stub("Curve", vec![pair("CRV", "USDC", 9_000_000.0)]),
                stub(AAVE, vec![reserve("USDC", 3.0, 1_000.0)]),
            ],
            None,
        );

        let records = aggregator.get_all_data().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].protocol_name, AAVE);
    }

    // ============================================================================
    // Queries
    // ============================================================================

    #[tokio::test]
    async fn test_protocol_filter_is_case_insensitive() {
        let aggregator = YieldAggregator::new(full_set(), None);
        let lower = aggregator.get_data_by_protocol("aave").await.unwrap();
        let upper = aggregator.get_data_by_protocol("AAVE").await.unwrap();

        assert_eq!(lower, upper);
        assert_eq!(lower.len(), 1);
        assert!(aggregator.get_data_by_protocol("aav").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_top_yield_is_stable_and_truncated() {
        let aggregator = YieldAggregator::new(
            vec![stub(
                AAVE,
                vec![
                    reserve("A", 5.0, 1.0),
                    reserve("B", 20.0, 1.0),
                    reserve("C", 20.0, 1.0),
                    reserve("D", 1.0, 1.0),
                ],
            )],
            None,
        );

        let top = aggregator.get_top_yield(Some(3)).await.unwrap();
        let names: Vec<&str> = top.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["B", "C", "A"]);
    }

    #[tokio::test]
    async fn test_top_yield_defaults_to_ten() {
        let reserves = (0..15)
            .map(|i| reserve(&format!("R{}", i), i as f64, 1.0))
            .collect();
        let aggregator = YieldAggregator::new(vec![stub(AAVE, reserves)], None);

        let top = aggregator.get_top_yield(None).await.unwrap();
        assert_eq!(top.len(), DEFAULT_TOP_LIMIT);
        assert_eq!(top[0].name, "R14");
    }

    #[tokio::test]
    async fn test_token_filter_matches_substrings() {
        let aggregator = YieldAggregator::new(full_set(), None);

        let metis = aggregator.get_data_by_token("metis").await.unwrap();
        let names: Vec<&str> = metis.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["METIS-USDC", "WETH-METIS"]);

        let usdc = aggregator.get_data_by_token("UsDc").await.unwrap();
        assert_eq!(usdc.len(), 2);
    }

    #[tokio::test]
    async fn test_category_filter() {
        let aggregator = YieldAggregator::new(full_set(), None);
        let dex = aggregator
            .get_data_by_category(ProtocolCategory::Dex)
            .await
            .unwrap();
        assert_eq!(dex.len(), 2);
        let lst = aggregator
            .get_data_by_category(ProtocolCategory::Lst)
            .await
            .unwrap();
        assert_eq!(lst[0].protocol_name, ENKI);
    }

    #[tokio::test]
    async fn test_total_tvl_grouping() {
        let aggregator = YieldAggregator::new(
            vec![
                stub(
                    HERCULES,
                    vec![pair("METIS", "USDC", 1_000_000.0), pair("WETH", "USDC", 500_000.0)],
                ),
                stub(AAVE, vec![reserve("USDC", 3.0, 2_500_000_000.0)]),
            ],
            None,
        );

        let tvl = aggregator.get_total_tvl().await.unwrap();
        assert_eq!(tvl.by_protocol.get(HERCULES).map(String::as_str), Some("$1.50M"));
        assert_eq!(tvl.by_protocol.get(AAVE).map(String::as_str), Some("$2.50B"));
        assert_eq!(tvl.total_tvl, "$2.50B");
    }

    // ============================================================================
    // Formatting
    // ============================================================================

    #[test]
    fn test_format_round_trip_tolerance() {
        for x in [1_500.0, 12_345.0, 987_654.0, 1_234_567.0, 45_678_901.0, 2_500_000_000.0] {
            let back = parse_formatted_amount(&format_amount(x));
            assert!((back - x).abs() / x < 0.01, "{} came back as {}", x, back);
        }
        for x in [0.0, 0.5, 12.34, 999.99] {
            let back = parse_formatted_amount(&format_amount(x));
            assert!((back - x).abs() < 0.005, "{} came back as {}", x, back);
        }
    }

    #[test]
    fn test_queries_from_blocking_context() {
        let aggregator = YieldAggregator::new(full_set(), None);
        let records = tokio_test::block_on(aggregator.get_all_data()).unwrap();
        assert_eq!(records.len(), 4);
    }
}
