//! Maps protocol-native records into [`UnifiedYieldRecord`]
//!
//! Every mapping is total: missing numerics become 0, missing strings
//! become empty, and TVL is clamped to a finite non-negative value.

use crate::format::{apr_to_apy, parse_formatted_amount, parse_percentage, DAILY_COMPOUNDING_PERIODS};
use crate::sources::{DexPair, HostedPool, LendingReserve, RawYieldSource, StakingDistribution};
use crate::types::UnifiedYieldRecord;

/// Normalize one adapter record; `protocol_name` is the producing adapter's name
pub fn to_unified(protocol_name: &str, raw: RawYieldSource) -> UnifiedYieldRecord {
    let mut record = match raw {
        RawYieldSource::LendingReserve(reserve) => from_lending(protocol_name, reserve),
        RawYieldSource::DexPair(pair) => from_dex_pair(protocol_name, pair),
        RawYieldSource::HostedPool(pool) => from_hosted_pool(protocol_name, pool),
        RawYieldSource::StakingDistribution(event) => from_staking(protocol_name, event),
    };
    record.apy = finite_or_zero(record.apy);
    record.tvl = non_negative(record.tvl);
    record
}

fn from_lending(protocol_name: &str, reserve: LendingReserve) -> UnifiedYieldRecord {
    UnifiedYieldRecord {
        apy: reserve.supply_apy,
        // Reward emissions are a simple rate on top of the supply APY
        apr: Some(reserve.incentive_apr).filter(|apr| *apr > 0.0),
        tvl: reserve.total_liquidity_usd,
        borrow: Some(finite_or_zero(reserve.variable_borrow_apy)),
        stable_borrow_apy: Some(finite_or_zero(reserve.stable_borrow_apy)),
        ..UnifiedYieldRecord::new(protocol_name, reserve.symbol)
    }
}

fn from_dex_pair(protocol_name: &str, pair: DexPair) -> UnifiedYieldRecord {
    UnifiedYieldRecord {
        apy: 0.0,
        apr: Some(finite_or_zero(pair.apr)),
        tvl: pair.reserve_usd,
        pool_address: Some(pair.pool_address),
        ..UnifiedYieldRecord::new(protocol_name, format!("{}-{}", pair.token0, pair.token1))
    }
}

fn from_hosted_pool(protocol_name: &str, pool: HostedPool) -> UnifiedYieldRecord {
    let apr = pool.apr.as_deref().and_then(parse_percentage);
    let apy = match pool.apy.as_deref().and_then(parse_percentage) {
        Some(apy) => apy,
        None => apr
            .map(|apr| apr_to_apy(apr, DAILY_COMPOUNDING_PERIODS))
            .unwrap_or(0.0),
    };
    let tvl = pool.tvl.as_deref().map(parse_formatted_amount).unwrap_or(0.0);

    UnifiedYieldRecord {
        apy,
        apr,
        tvl,
        pool_address: Some(pool.pool_address),
        ..UnifiedYieldRecord::new(protocol_name, pool.name)
    }
}

fn from_staking(protocol_name: &str, event: StakingDistribution) -> UnifiedYieldRecord {
    UnifiedYieldRecord {
        apy: 0.0,
        apr: Some(finite_or_zero(event.apr)),
        tvl: event.total_supply,
        ..UnifiedYieldRecord::new(protocol_name, event.label)
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn non_negative(value: f64) -> f64 {
    finite_or_zero(value).max(0.0)
}
