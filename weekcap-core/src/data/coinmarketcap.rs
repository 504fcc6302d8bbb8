//! CoinMarketCap historical snapshot fetcher.
//!
//! Fetches `https://coinmarketcap.com/historical/YYYYMMDD/` and reads the
//! ranking out of the page's embedded `__NEXT_DATA__` JSON blob. The page has
//! shipped two row shapes over the years; both are accepted:
//!
//! - `{ name, symbol, cmcRank, quotes: [{ marketCap, price }] }`
//! - `{ name, symbol, cmc_rank, quote: { USD: { market_cap, price } } }`
//!
//! Rate limiting (HTTP 429) is reported, not retried; see
//! [`fetch_with_retry`](super::retry::fetch_with_retry).

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION};
use serde_json::Value;
use tracing::{debug, warn};

use super::provider::{DataError, Listing, SourceFetcher};

const BASE_URL: &str = "https://coinmarketcap.com/historical";
const IMAGE_BASE_URL: &str = "https://s2.coinmarketcap.com/static/img/coins/32x32";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const NEXT_DATA_MARKER: &str = "id=\"__NEXT_DATA__\"";

/// Default number of ranked rows kept per day.
pub const DEFAULT_LISTING_DEPTH: usize = 50;

/// CoinMarketCap historical page fetcher.
pub struct CoinMarketCapFetcher {
    client: reqwest::blocking::Client,
    base_url: String,
    listing_depth: usize,
}

impl CoinMarketCapFetcher {
    pub fn new(timeout: Duration, listing_depth: usize) -> Result<Self, DataError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
            listing_depth,
        })
    }

    /// Point the fetcher at a different host (mirrors, local fixtures).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Historical snapshot URL for a day.
    pub fn historical_url(&self, day: NaiveDate) -> String {
        format!("{}/{}/", self.base_url, day.format("%Y%m%d"))
    }
}

impl SourceFetcher for CoinMarketCapFetcher {
    fn name(&self) -> &str {
        "coinmarketcap"
    }

    fn fetch_day(&self, day: NaiveDate) -> Result<Vec<Listing>, DataError> {
        let url = self.historical_url(day);
        debug!(%url, "fetching snapshot");

        let resp = self.client.get(&url).send().map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                DataError::NetworkUnreachable(e.to_string())
            } else {
                DataError::Other(format!("request for {day} failed: {e}"))
            }
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(DataError::RateLimited {
                retry_after_secs: retry_after,
            });
        }
        if !status.is_success() {
            return Err(DataError::Http {
                status: status.as_u16(),
                day,
            });
        }

        let body = resp
            .text()
            .map_err(|e| DataError::NetworkUnreachable(format!("reading body for {day}: {e}")))?;
        parse_listings(&body, self.listing_depth)
    }
}

// ── Page parsing ─────────────────────────────────────────────────────

/// Extract up to `depth` ranked listings from a historical snapshot page.
///
/// Rows missing a name or a numeric field are dropped with a warning. A page
/// without the embedded data blob, or without any recognizable ranking, is a
/// [`DataError::ResponseFormatChanged`].
pub fn parse_listings(html: &str, depth: usize) -> Result<Vec<Listing>, DataError> {
    let blob = extract_next_data(html)?;
    let root: Value = serde_json::from_str(blob)
        .map_err(|e| DataError::ResponseFormatChanged(format!("__NEXT_DATA__ is not JSON: {e}")))?;

    let rows = find_listing_rows(&root).ok_or_else(|| {
        DataError::ResponseFormatChanged("no listing table in __NEXT_DATA__".into())
    })?;

    let mut listings: Vec<Listing> = rows
        .iter()
        .enumerate()
        .filter_map(|(i, row)| match parse_row(row) {
            Some(mut listing) => {
                if listing.rank.is_none() {
                    listing.rank = Some(i as u32 + 1);
                }
                Some(listing)
            }
            None => {
                warn!(row = i + 1, "dropping unparsable listing row");
                None
            }
        })
        .collect();

    listings.sort_by_key(|l| l.rank.unwrap_or(u32::MAX));
    listings.truncate(depth);
    Ok(listings)
}

fn extract_next_data(html: &str) -> Result<&str, DataError> {
    let missing = || DataError::ResponseFormatChanged("page has no __NEXT_DATA__ script".into());
    let marker = html.find(NEXT_DATA_MARKER).ok_or_else(missing)?;
    let after_marker = &html[marker..];
    let open = after_marker.find('>').ok_or_else(missing)? + 1;
    let body = &after_marker[open..];
    let close = body.find("</script>").ok_or_else(missing)?;
    Ok(body[..close].trim())
}

/// Depth-first search for the first array of named objects holding at least
/// one ranking row. Rows that don't parse are dropped later, one by one.
fn find_listing_rows(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Array(items) => {
            if items.iter().all(|v| v.get("name").is_some()) && items.iter().any(looks_like_row) {
                return Some(items);
            }
            items.iter().find_map(find_listing_rows)
        }
        Value::Object(map) => map.values().find_map(find_listing_rows),
        _ => None,
    }
}

fn looks_like_row(v: &Value) -> bool {
    v.get("name").is_some() && (v.get("quotes").is_some() || v.get("quote").is_some())
}

fn parse_row(row: &Value) -> Option<Listing> {
    let name = row.get("name")?.as_str()?.trim().to_string();
    if name.is_empty() {
        return None;
    }

    let (market_cap, price) = if let Some(q) = row.get("quotes").and_then(|q| q.get(0)) {
        (number(q.get("marketCap")?)?, number(q.get("price")?)?)
    } else {
        let usd = row.get("quote")?.get("USD")?;
        (number(usd.get("market_cap")?)?, number(usd.get("price")?)?)
    };

    let rank = ["cmcRank", "cmc_rank", "rank"]
        .iter()
        .find_map(|k| row.get(*k).and_then(Value::as_u64))
        .and_then(|r| u32::try_from(r).ok());

    let image_url = row
        .get("id")
        .and_then(Value::as_u64)
        .map(|id| format!("{IMAGE_BASE_URL}/{id}.png"));

    Some(Listing {
        rank,
        name,
        symbol: row.get("symbol").and_then(Value::as_str).map(str::to_string),
        market_cap,
        price,
        image_url,
    })
}

/// A JSON number, or a display string like `"$1,234.56"`.
fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_money(s),
        _ => None,
    }
}

/// Parse a formatted currency amount, ignoring `$`, commas and whitespace.
pub fn parse_money(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '$' | ',') && !c.is_whitespace())
        .collect();
    cleaned.parse::<f64>().ok()
}
