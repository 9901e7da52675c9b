//! Core types used throughout Yieldscope
//!
//! Defines the protocol categories, the unified yield record every adapter
//! is normalized into, and the TVL summary served to callers.

use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

/// Display name of the Hercules DEX
pub const HERCULES: &str = "Hercules";
/// Display name of the AAVE lending market
pub const AAVE: &str = "AAVE";
/// Display name of the Netswap DEX
pub const NETSWAP: &str = "Netswap";
/// Display name of the Enki liquid staking protocol
pub const ENKI: &str = "Enki";

/// Protocol category a yield opportunity belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum ProtocolCategory {
    Dex,
    Lending,
    #[serde(alias = "LST")]
    Lst,
    Unknown,
}

impl ProtocolCategory {
    /// Resolve the category from a protocol display name (case-insensitive)
    pub fn for_protocol(protocol_name: &str) -> Self {
        match protocol_name.to_ascii_lowercase().as_str() {
            "hercules" | "netswap" => ProtocolCategory::Dex,
            "aave" => ProtocolCategory::Lending,
            "enki" => ProtocolCategory::Lst,
            _ => ProtocolCategory::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolCategory::Dex => "Dex",
            ProtocolCategory::Lending => "Lending",
            ProtocolCategory::Lst => "LST",
            ProtocolCategory::Unknown => "Unknown",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "dex" => Some(ProtocolCategory::Dex),
            "lending" => Some(ProtocolCategory::Lending),
            "lst" | "liquidstaking" | "liquid_staking" => Some(ProtocolCategory::Lst),
            _ => None,
        }
    }

    /// Categories that survive aggregation
    pub fn is_known(&self) -> bool {
        !matches!(self, ProtocolCategory::Unknown)
    }
}

impl fmt::Display for ProtocolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ProtocolCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One yield-bearing opportunity, normalized across protocols
///
/// The category is not stored: it is always derived from `protocol_name`
/// so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnifiedYieldRecord {
    pub protocol_name: String,
    pub name: String,
    /// Compounding-adjusted yield in percent; 0 when the source only reports APR
    pub apy: f64,
    /// Simple rate in percent
    pub apr: Option<f64>,
    /// USD value locked
    pub tvl: f64,
    /// Variable borrow APY (lending only)
    pub borrow: Option<f64>,
    /// Stable borrow APY (lending only)
    pub stable_borrow_apy: Option<f64>,
    /// On-chain pool address (DEX only)
    pub pool_address: Option<String>,
}

impl UnifiedYieldRecord {
    pub fn new(protocol_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            protocol_name: protocol_name.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn category(&self) -> ProtocolCategory {
        ProtocolCategory::for_protocol(&self.protocol_name)
    }
}

impl Serialize for UnifiedYieldRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("UnifiedYieldRecord", 9)?;
        state.serialize_field("protocol", &self.category())?;
        state.serialize_field("protocolName", &self.protocol_name)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("apy", &self.apy)?;
        if let Some(apr) = self.apr {
            state.serialize_field("apr", &apr)?;
        } else {
            state.skip_field("apr")?;
        }
        state.serialize_field("tvl", &self.tvl)?;
        match self.borrow {
            Some(borrow) => state.serialize_field("borrow", &borrow)?,
            None => state.skip_field("borrow")?,
        }
        match self.stable_borrow_apy {
            Some(stable) => state.serialize_field("stableBorrowApy", &stable)?,
            None => state.skip_field("stableBorrowApy")?,
        }
        match &self.pool_address {
            Some(address) => state.serialize_field("poolAddress", address)?,
            None => state.skip_field("poolAddress")?,
        }
        state.end()
    }
}

/// TVL totals, formatted for display ("$1.50M")
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TvlSummary {
    pub total_tvl: String,
    pub by_protocol: BTreeMap<String, String>,
}
