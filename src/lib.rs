//! Molyparket - prediction market pool aggregation
//!
//! Reads pools from a Molyparket market contract, caches immutable contract
//! responses, and publishes a reconciled snapshot of the most recent pools.

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod market;
pub mod units;
