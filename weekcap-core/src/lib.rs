//! Weekcap Core: domain types, sources, weekly aggregation and smoothing.
//!
//! This crate contains everything that does not touch run state:
//! - Domain types (daily samples, weekly buckets, smoothed weeks)
//! - Source fetcher trait, rate-limit retry contract, CoinMarketCap fetcher
//! - Logo store with URL-hash deduplication
//! - Weekly aggregator anchored at the run start
//! - Rolling 3-bucket smoother with top-K re-ranking

pub mod aggregate;
pub mod data;
pub mod domain;
pub mod rank;
pub mod smooth;

pub use aggregate::{aggregate, week_start, AggregateError};
pub use smooth::{smooth, SmoothError, SmoothingWeights, WeightsError};
