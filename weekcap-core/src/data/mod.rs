//! Upstream sources, retry contract and logo storage

pub mod assets;
pub mod coinmarketcap;
pub mod provider;
pub mod retry;
pub mod scripted;

pub use assets::{HttpImageSource, ImageSource, ImageStats, ImageStore};
pub use coinmarketcap::{CoinMarketCapFetcher, DEFAULT_LISTING_DEPTH};
pub use provider::{DataError, Listing, SourceFetcher};
pub use retry::{fetch_with_retry, RecordingSleeper, RetryPolicy, Sleeper, ThreadSleeper};
pub use scripted::{synthetic_listings, ScriptedFetcher, ScriptedResponse};
