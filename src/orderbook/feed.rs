//! Top-of-book prices from venue order book responses.
//!
//! The venue returns books in several shapes: a plain object with `bids` and
//! `asks`, the same object wrapped under `book` or `data`, or an array of
//! per-token snapshots. Levels are `{price, size}` objects or `[price, size]`
//! pairs, with numbers or numeric strings. Everything is normalized into an
//! [`OutcomeBook`] before a price is read.

use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::debug;

use super::types::{OutcomeBook, PriceLevel, Quote};
use crate::error::FeedError;
use crate::market::ExecutionApi;
use crate::metrics;

/// Best bid/ask reader over an [`ExecutionApi`].
#[derive(Clone)]
pub struct PriceFeed {
    api: Arc<dyn ExecutionApi>,
}

impl PriceFeed {
    /// Feed over `api`.
    pub fn new(api: Arc<dyn ExecutionApi>) -> Self {
        Self { api }
    }

    /// Fetch and normalize the book for `token_id`.
    pub async fn book(&self, token_id: &str) -> Result<OutcomeBook, FeedError> {
        let started = Instant::now();
        let raw = self.api.order_book(token_id).await;
        metrics::record_book_fetch(started.elapsed());

        let raw = raw.map_err(|e| FeedError::BookUnavailable {
            token_id: token_id.to_string(),
            reason: e.to_string(),
        })?;
        Ok(normalize_book(token_id, &raw))
    }

    /// Lowest ask, or `None` if the query failed or the side is empty.
    pub async fn best_ask(&self, token_id: &str) -> Option<Decimal> {
        self.book_or_log(token_id).await?.best_ask()
    }

    /// Highest bid, or `None` if the query failed or the side is empty.
    pub async fn best_bid(&self, token_id: &str) -> Option<Decimal> {
        self.book_or_log(token_id).await?.best_bid()
    }

    /// Both sides from a single fetch.
    pub async fn quote(&self, token_id: &str) -> Result<Quote, FeedError> {
        let book = self.book(token_id).await?;
        book.quote().ok_or_else(|| FeedError::EmptySide {
            token_id: token_id.to_string(),
            side: if book.asks.is_empty() { "ask" } else { "bid" },
        })
    }

    /// The book cut to `depth` levels per side, best first.
    pub async fn top_levels(&self, token_id: &str, depth: usize) -> Result<OutcomeBook, FeedError> {
        let mut book = self.book(token_id).await?;
        book.bids.truncate(depth);
        book.asks.truncate(depth);
        Ok(book)
    }

    async fn book_or_log(&self, token_id: &str) -> Option<OutcomeBook> {
        match self.book(token_id).await {
            Ok(book) => Some(book),
            Err(e) => {
                debug!(error = %e, "Order book query failed");
                None
            }
        }
    }
}

/// Normalize any supported book shape into an [`OutcomeBook`].
///
/// Unreadable input gives an empty book rather than an error.
pub fn normalize_book(token_id: &str, raw: &Value) -> OutcomeBook {
    let mut book = OutcomeBook::empty(token_id);
    let Some(body) = locate_book(token_id, raw) else {
        return book;
    };

    book.bids = parse_levels(body.get("bids"));
    book.asks = parse_levels(body.get("asks"));
    book.bids.sort_by(|a, b| b.price.cmp(&a.price)); // Descending
    book.asks.sort_by(|a, b| a.price.cmp(&b.price)); // Ascending
    book.fetched_at = OffsetDateTime::now_utc();
    book
}

fn locate_book<'a>(token_id: &str, raw: &'a Value) -> Option<&'a Value> {
    match raw {
        Value::Object(map) => {
            if map.contains_key("bids") || map.contains_key("asks") {
                return Some(raw);
            }
            ["book", "data"]
                .iter()
                .filter_map(|k| map.get(*k))
                .find_map(|inner| locate_book(token_id, inner))
        }
        Value::Array(snapshots) => {
            let matches_token = |s: &&Value| {
                ["asset_id", "token_id", "tokenID"]
                    .iter()
                    .filter_map(|k| s.get(*k))
                    .filter_map(Value::as_str)
                    .any(|id| id == token_id)
            };
            snapshots
                .iter()
                .find(matches_token)
                .or_else(|| snapshots.first())
                .and_then(|s| locate_book(token_id, s))
        }
        _ => None,
    }
}

fn parse_levels(levels: Option<&Value>) -> Vec<PriceLevel> {
    levels
        .and_then(Value::as_array)
        .map(|levels| {
            levels
                .iter()
                .filter_map(parse_level)
                .filter(|l| l.size > Decimal::ZERO)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_level(level: &Value) -> Option<PriceLevel> {
    let (price, size) = match level {
        Value::Object(map) => (map.get("price")?, map.get("size")?),
        Value::Array(pair) if pair.len() >= 2 => (&pair[0], &pair[1]),
        _ => return None,
    };
    let price = decimal_of(price)?;
    let size = decimal_of(size)?;
    (price > Decimal::ZERO).then_some(PriceLevel { price, size })
}

fn decimal_of(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}
