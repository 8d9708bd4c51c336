//! Market discovery for the 15-minute up/down series.
//!
//! Slots are addressed by computed slugs (`<prefix>-<start_ts>`) and looked up
//! on the Gamma API; the live slot wins, otherwise the nearest upcoming one.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, instrument};

use super::types::{MarketDescriptor, OutcomeTokens, SLOT_SECONDS};
use crate::config::Config;
use crate::error::MarketError;

/// Source of market instances and their outcome tokens.
#[async_trait]
pub trait MarketDirectory: Send + Sync {
    /// Resolve the live market at `now`, or the next upcoming one.
    async fn find_current_market(&self, now: i64) -> Option<MarketDescriptor>;

    /// Resolve the UP/DOWN token ids of a market instance.
    async fn outcome_tokens(&self, instance_id: &str) -> Option<OutcomeTokens>;
}

/// Floor a unix timestamp to the start of its 15-minute slot.
///
/// US Eastern offsets are whole hours, so the floor matches the ET-aligned
/// windows the venue uses.
pub fn slot_start(ts: i64) -> i64 {
    ts.div_euclid(SLOT_SECONDS) * SLOT_SECONDS
}

/// Build the slug for a slot start.
pub fn build_slug(prefix: &str, start_ts: i64) -> String {
    format!("{}-{}", prefix, start_ts)
}

/// Slot starts to look up around `now`, nearest first.
///
/// Previous/current/next are always included, then up to `forward` slots
/// ahead and `backward` slots behind.
pub fn candidate_slot_starts(now: i64, forward: i64, backward: i64) -> Vec<i64> {
    let base = slot_start(now);
    let mut starts = vec![base - SLOT_SECONDS, base, base + SLOT_SECONDS];
    starts.extend((2..=forward).map(|i| base + i * SLOT_SECONDS));
    starts.extend((2..=backward).map(|i| base - i * SLOT_SECONDS));

    starts.sort_unstable();
    starts.dedup();
    starts.sort_by_key(|ts| (ts - now).abs());
    starts
}

/// Pick the live descriptor with the latest start, else the nearest future one.
pub fn pick_market(
    candidates: impl IntoIterator<Item = MarketDescriptor>,
    now: i64,
) -> Option<MarketDescriptor> {
    let mut live: Option<MarketDescriptor> = None;
    let mut next: Option<MarketDescriptor> = None;

    for market in candidates {
        if market.is_live {
            if live.as_ref().map_or(true, |l| market.start_time > l.start_time) {
                live = Some(market);
            }
        } else if market.start_time > now
            && next.as_ref().map_or(true, |n| market.start_time < n.start_time)
        {
            next = Some(market);
        }
    }

    live.or(next)
}

/// Lenient boolean read (bools, "true"/"1"/"yes", numbers).
fn loose_bool(value: Option<&Value>, default: bool) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().map_or(default, |n| n != 0),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "y" => true,
            "false" | "0" | "no" | "n" => false,
            _ => default,
        },
        _ => default,
    }
}

/// Read a list that may be a JSON array, a JSON-encoded array string or a comma list.
pub fn parse_listish(value: Option<&Value>) -> Vec<String> {
    let scalar = |v: &Value| match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };

    match value {
        Some(Value::Array(items)) => items.iter().filter_map(scalar).collect(),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Vec::new();
            }
            match serde_json::from_str::<Value>(s) {
                Ok(Value::Array(items)) => items.iter().filter_map(scalar).collect(),
                Ok(_) => Vec::new(),
                Err(_) => s
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect(),
            }
        }
        _ => Vec::new(),
    }
}

/// A Gamma market is tradeable when it is not closed and has an order book.
pub fn is_tradeable(market: &Value) -> bool {
    !loose_bool(market.get("closed"), false) && loose_bool(market.get("enableOrderBook"), true)
}

fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Extract the UP/DOWN token ids from a Gamma market payload.
pub fn extract_outcome_tokens(market: &Value) -> Option<OutcomeTokens> {
    let mut up = None;
    let mut down = None;

    let outcomes = parse_listish(market.get("outcomes").or_else(|| market.get("shortOutcomes")));
    let token_ids = parse_listish(market.get("clobTokenIds"));
    for (name, token_id) in outcomes.iter().zip(token_ids.iter()) {
        match name.to_ascii_lowercase().as_str() {
            "up" => up = Some(token_id.clone()),
            "down" => down = Some(token_id.clone()),
            _ => {}
        }
    }
    if let (Some(up), Some(down)) = (&up, &down) {
        return Some(OutcomeTokens::new(up.clone(), down.clone()));
    }

    let (mut up, mut down) = (None, None);
    for token in market.get("tokens")?.as_array()? {
        let name = token
            .get("outcome")
            .or_else(|| token.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let Some(token_id) = id_string(
            token
                .get("clobTokenId")
                .or_else(|| token.get("tokenId"))
                .or_else(|| token.get("token_id"))
                .or_else(|| token.get("id")),
        ) else {
            continue;
        };
        match name.as_str() {
            "up" => up = Some(token_id),
            "down" => down = Some(token_id),
            _ => {}
        }
    }

    Some(OutcomeTokens::new(up?, down?))
}

/// Directory backed by the Gamma metadata API.
#[derive(Debug, Clone)]
pub struct GammaDirectory {
    http: reqwest::Client,
    gamma_url: String,
    slug_prefix: String,
    forward_steps: i64,
    backward_steps: i64,
}

impl GammaDirectory {
    /// Slots looked up ahead of the current one.
    pub const FORWARD_STEPS: i64 = 12;
    /// Slots looked up behind the current one.
    pub const BACKWARD_STEPS: i64 = 4;

    /// Create a directory from config.
    pub fn new(config: &Config) -> Result<Self, MarketError> {
        Self::with_endpoint(
            &config.gamma_api_url,
            &config.market_slug_prefix,
            config.http_timeout(),
        )
    }

    /// Create a directory for an explicit Gamma URL and slug prefix.
    pub fn with_endpoint(
        gamma_url: &str,
        slug_prefix: &str,
        timeout: Duration,
    ) -> Result<Self, MarketError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .user_agent("btc-15m-bot/1.0")
            .build()?;

        Ok(Self {
            http,
            gamma_url: gamma_url.trim_end_matches('/').to_string(),
            slug_prefix: slug_prefix.to_string(),
            forward_steps: Self::FORWARD_STEPS,
            backward_steps: Self::BACKWARD_STEPS,
        })
    }

    async fn get_json(&self, url: &str, resource: &str) -> Result<Value, MarketError> {
        let response = self
            .http
            .get(url)
            .header("Cache-Control", "no-cache")
            .header("Pragma", "no-cache")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MarketError::FetchFailed {
                resource: resource.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        response
            .json()
            .await
            .map_err(|e| MarketError::ParseError(format!("{}: {}", resource, e)))
    }

    /// Fetch the market for one slot, if it exists and is tradeable.
    #[instrument(skip(self))]
    pub async fn fetch_slot(&self, start_ts: i64, now: i64) -> Result<MarketDescriptor, MarketError> {
        let slug = build_slug(&self.slug_prefix, start_ts);
        let url = format!("{}/markets/slug/{}", self.gamma_url, slug);
        let market = self.get_json(&url, &slug).await?;

        if !market.is_object() {
            return Err(MarketError::ParseError(format!("{}: not an object", slug)));
        }
        if !is_tradeable(&market) {
            return Err(MarketError::FetchFailed {
                resource: slug,
                reason: "market closed or without order book".to_string(),
            });
        }

        let instance_id = id_string(
            market
                .get("id")
                .or_else(|| market.get("market_id"))
                .or_else(|| market.get("marketId")),
        )
        .ok_or_else(|| MarketError::ParseError(format!("{}: missing market id", slug)))?;

        let label = market
            .get("question")
            .or_else(|| market.get("title"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| slug.clone());

        Ok(MarketDescriptor::for_slot(instance_id, label, slug, start_ts, now))
    }

    /// Fetch the token mapping for a market id.
    #[instrument(skip(self))]
    pub async fn fetch_tokens(&self, instance_id: &str) -> Result<OutcomeTokens, MarketError> {
        let url = format!("{}/markets/{}", self.gamma_url, instance_id);
        let market = self.get_json(&url, instance_id).await?;
        extract_outcome_tokens(&market).ok_or_else(|| MarketError::ConditionsUnavailable {
            instance_id: instance_id.to_string(),
        })
    }
}

#[async_trait]
impl MarketDirectory for GammaDirectory {
    async fn find_current_market(&self, now: i64) -> Option<MarketDescriptor> {
        let mut found = Vec::new();
        for start in candidate_slot_starts(now, self.forward_steps, self.backward_steps) {
            match self.fetch_slot(start, now).await {
                // Windows never overlap, so the first live one is the only one.
                Ok(market) if market.is_live => {
                    found.clear();
                    found.push(market);
                    break;
                }
                Ok(market) => found.push(market),
                Err(e) => debug!(start, error = %e, "Slot not available"),
            }
        }

        let picked = pick_market(found, now);
        if let Some(market) = &picked {
            info!(slot = %market.slot_id, live = market.is_live, "Resolved market");
        }
        picked
    }

    async fn outcome_tokens(&self, instance_id: &str) -> Option<OutcomeTokens> {
        match self.fetch_tokens(instance_id).await {
            Ok(tokens) => Some(tokens),
            Err(e) => {
                debug!(instance_id, error = %e, "Outcome tokens unavailable");
                None
            }
        }
    }
}
