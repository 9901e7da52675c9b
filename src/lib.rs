//! Yieldscope Library
//!
//! Yield and TVL aggregation for Metis DeFi protocols

pub mod aggregator;
pub mod config;
pub mod format;
pub mod normalize;
pub mod server;
pub mod sources;
pub mod types;
