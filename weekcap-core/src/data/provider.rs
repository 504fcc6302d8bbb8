//! Source fetcher trait and structured error types.
//!
//! The SourceFetcher trait abstracts over upstream ranking sources so the
//! harvester can run against the live site or a scripted in-memory source.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{EntityRecord, MalformedRecord};

/// One ranked row as returned by a source, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub rank: Option<u32>,
    pub name: String,
    pub symbol: Option<String>,
    pub market_cap: f64,
    pub price: f64,
    pub image_url: Option<String>,
}

impl Listing {
    pub fn new(name: impl Into<String>, market_cap: f64, price: f64) -> Self {
        Self {
            rank: None,
            name: name.into(),
            symbol: None,
            market_cap,
            price,
            image_url: None,
        }
    }

    /// Validate into the record kept in a daily sample.
    pub fn to_record(&self) -> Result<EntityRecord, MalformedRecord> {
        EntityRecord::new(self.name.clone(), self.market_cap, self.price)
    }
}

/// Structured error types for fetch operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by source (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("still rate limited after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },

    #[error("HTTP {status} for {day}")]
    Http { status: u16, day: NaiveDate },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("data error: {0}")]
    Other(String),
}

impl DataError {
    /// Rate limiting is the only recoverable fetch failure.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, DataError::RateLimited { .. })
    }
}

/// Trait for upstream ranking sources.
///
/// `fetch_day` returns the ranked listings for one calendar day, or fails.
/// Implementations report rate limiting as [`DataError::RateLimited`] and leave
/// the waiting to [`fetch_with_retry`](super::retry::fetch_with_retry).
pub trait SourceFetcher: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch the ranked listings for a single day.
    fn fetch_day(&self, day: NaiveDate) -> Result<Vec<Listing>, DataError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_converts_to_record() {
        let rec = Listing::new("Bitcoin", 100.0, 2.0).to_record().unwrap();
        assert_eq!(rec.name, "Bitcoin");
        assert_eq!(rec.price, 2.0);
    }

    #[test]
    fn malformed_listing_is_rejected() {
        assert!(Listing::new("Bitcoin", -5.0, 2.0).to_record().is_err());
    }

    #[test]
    fn only_rate_limit_is_recoverable() {
        assert!(DataError::RateLimited { retry_after_secs: 60 }.is_rate_limited());
        assert!(!DataError::Other("boom".into()).is_rate_limited());
        assert!(!DataError::RateLimitExhausted { attempts: 3 }.is_rate_limited());
    }
}
