//! Market-related types for 15-minute up/down prediction markets.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Duration of one market slot in seconds.
pub const SLOT_SECONDS: i64 = 900;

/// Market outcome for 15min binary markets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    /// Price goes up.
    #[strum(to_string = "UP", serialize = "up", serialize = "Up")]
    Up,
    /// Price goes down.
    #[strum(to_string = "DOWN", serialize = "down", serialize = "Down")]
    Down,
}

impl Outcome {
    /// Both outcomes in evaluation order.
    pub const ALL: [Outcome; 2] = [Outcome::Up, Outcome::Down];

    /// Get the opposite outcome.
    pub fn opposite(&self) -> Self {
        match self {
            Outcome::Up => Outcome::Down,
            Outcome::Down => Outcome::Up,
        }
    }
}

/// One 15-minute market instance.
///
/// Produced fresh by a [`MarketDirectory`](super::MarketDirectory) lookup and
/// never mutated afterwards; a new `slot_id` supersedes it wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketDescriptor {
    /// Venue market id, used to fetch the outcome tokens.
    pub instance_id: String,
    /// Human readable question or title.
    pub label: String,
    /// Slug of the 15-minute window (e.g. "btc-updown-15m-1765301400").
    pub slot_id: String,
    /// Unix timestamp when the window opens.
    pub start_time: i64,
    /// Unix timestamp when the window closes (start + 900s).
    pub end_time: i64,
    /// Whether `start_time <= now < end_time` at lookup time.
    pub is_live: bool,
}

impl MarketDescriptor {
    /// Build a descriptor for the slot starting at `start_time`, evaluated at `now`.
    pub fn for_slot(
        instance_id: impl Into<String>,
        label: impl Into<String>,
        slot_id: impl Into<String>,
        start_time: i64,
        now: i64,
    ) -> Self {
        let end_time = start_time + SLOT_SECONDS;
        Self {
            instance_id: instance_id.into(),
            label: label.into(),
            slot_id: slot_id.into(),
            start_time,
            end_time,
            is_live: start_time <= now && now < end_time,
        }
    }

    /// Seconds until the window closes, or `None` once closed.
    pub fn time_remaining(&self, now: i64) -> Option<i64> {
        let remaining = self.end_time - now;
        (remaining > 0).then_some(remaining)
    }

    /// Format remaining time as "Xm Ys" string.
    pub fn time_remaining_str(&self, now: i64) -> String {
        match self.time_remaining(now) {
            Some(secs) => format!("{}m {}s", secs / 60, secs % 60),
            None => "CLOSED".to_string(),
        }
    }
}

/// The UP/DOWN token ids of one market instance.
///
/// Only valid for the descriptor they were fetched against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeTokens {
    /// UP token ID for CLOB.
    pub up: String,
    /// DOWN token ID for CLOB.
    pub down: String,
}

impl OutcomeTokens {
    /// Create a token mapping.
    pub fn new(up: impl Into<String>, down: impl Into<String>) -> Self {
        Self {
            up: up.into(),
            down: down.into(),
        }
    }

    /// Get the token ID for a given outcome.
    pub fn token_id(&self, outcome: Outcome) -> &str {
        match outcome {
            Outcome::Up => &self.up,
            Outcome::Down => &self.down,
        }
    }

    /// `(outcome, token_id)` pairs, UP first.
    pub fn pairs(&self) -> [(Outcome, &str); 2] {
        [(Outcome::Up, &self.up), (Outcome::Down, &self.down)]
    }

    /// Whether `token_id` belongs to this mapping.
    pub fn contains(&self, token_id: &str) -> bool {
        self.up == token_id || self.down == token_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn outcome_opposite_works() {
        assert_eq!(Outcome::Up.opposite(), Outcome::Down);
        assert_eq!(Outcome::Down.opposite(), Outcome::Up);
    }

    #[test]
    fn outcome_string_forms() {
        assert_eq!(Outcome::from_str("up").unwrap(), Outcome::Up);
        assert_eq!(Outcome::from_str("DOWN").unwrap(), Outcome::Down);
        assert_eq!(Outcome::Up.to_string(), "UP");
        assert_eq!(Outcome::Down.to_string(), "DOWN");
        assert!(Outcome::from_str("yes").is_err());
    }

    #[test]
    fn descriptor_liveness_follows_window() {
        let live = MarketDescriptor::for_slot("1", "q", "s-900", 900, 1000);
        assert!(live.is_live);
        assert_eq!(live.end_time - live.start_time, SLOT_SECONDS);
        assert_eq!(live.time_remaining_str(1000), "13m 20s");

        let upcoming = MarketDescriptor::for_slot("2", "q", "s-1800", 1800, 1000);
        assert!(!upcoming.is_live);

        let closed = MarketDescriptor::for_slot("3", "q", "s-0", 0, 900);
        assert!(!closed.is_live);
        assert_eq!(closed.time_remaining(900), None);
    }

    #[test]
    fn tokens_map_outcomes() {
        let tokens = OutcomeTokens::new("up-token", "down-token");
        assert_eq!(tokens.token_id(Outcome::Up), "up-token");
        assert_eq!(tokens.token_id(Outcome::Down), "down-token");
        assert_eq!(tokens.pairs()[0], (Outcome::Up, "up-token"));
        assert!(tokens.contains("down-token"));
        assert!(!tokens.contains("other"));
    }
}
