//! Order types and argument bundles.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order.
    #[strum(to_string = "BUY", serialize = "buy")]
    Buy,
    /// Sell order.
    #[strum(to_string = "SELL", serialize = "sell")]
    Sell,
}

/// Order time-in-force.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// Fill-or-kill: must fill entirely or cancel.
    #[default]
    #[strum(to_string = "FOK", serialize = "fok")]
    FOK,
    /// Fill-and-kill: fill what's available, cancel rest.
    #[strum(to_string = "FAK", serialize = "fak")]
    FAK,
    /// Good-till-cancelled: stays on book until filled or cancelled.
    #[strum(to_string = "GTC", serialize = "gtc")]
    GTC,
}

/// Normalized order arguments.
///
/// The venue has read order arguments both as typed fields and as a loose
/// key/value mapping under snake_case and camelCase spellings. The struct
/// carries the typed view; [`OrderArgs::to_map`] renders the mapping view
/// with every spelling present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderArgs {
    /// Token ID to trade.
    pub token_id: String,
    /// Order side (buy/sell).
    pub side: Side,
    /// Limit price.
    pub price: Decimal,
    /// Order size in shares.
    pub size: Decimal,
    /// Notional for market-style orders: `price * size` for buys, `size` for sells.
    pub amount: Option<Decimal>,
    /// Fill policy.
    pub order_type: TimeInForce,
    /// Fee rate in basis points. Always present, always zero.
    pub fee_rate_bps: u32,
}

impl OrderArgs {
    /// Limit-style arguments.
    pub fn limit(
        token_id: impl Into<String>,
        side: Side,
        price: Decimal,
        size: Decimal,
        order_type: TimeInForce,
    ) -> Self {
        Self {
            token_id: token_id.into(),
            side,
            price,
            size,
            amount: None,
            order_type,
            fee_rate_bps: 0,
        }
    }

    /// Market-style arguments with the notional amount filled in.
    pub fn market(
        token_id: impl Into<String>,
        side: Side,
        price: Decimal,
        size: Decimal,
        order_type: TimeInForce,
    ) -> Self {
        let amount = match side {
            Side::Buy => price * size,
            Side::Sell => size,
        };
        Self {
            amount: Some(amount),
            ..Self::limit(token_id, side, price, size, order_type)
        }
    }

    /// Validate order parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.token_id.is_empty() {
            return Err("token_id is required".to_string());
        }
        if self.price <= Decimal::ZERO || self.price >= Decimal::ONE {
            return Err(format!("price {} outside (0, 1)", self.price));
        }
        if self.size <= Decimal::ZERO {
            return Err("size must be positive".to_string());
        }
        Ok(())
    }

    /// Mapping view with both field spellings.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        let token = Value::String(self.token_id.clone());
        map.insert("token_id".into(), token.clone());
        map.insert("tokenID".into(), token);
        map.insert("side".into(), Value::String(self.side.to_string()));
        map.insert("price".into(), Value::String(self.price.normalize().to_string()));
        map.insert("size".into(), Value::String(self.size.normalize().to_string()));
        if let Some(amount) = self.amount {
            map.insert("amount".into(), Value::String(amount.normalize().to_string()));
        }
        let fee = Value::from(self.fee_rate_bps);
        map.insert("fee_rate_bps".into(), fee.clone());
        map.insert("feeRateBps".into(), fee);
        let order_type = Value::String(self.order_type.to_string());
        map.insert("order_type".into(), order_type.clone());
        map.insert("orderType".into(), order_type);
        map
    }

    /// Read one field through the mapping view.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.to_map().remove(key)
    }
}

/// Order status from API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Order is pending.
    #[strum(to_string = "pending", serialize = "PENDING")]
    Pending,
    /// Order is live on the book.
    #[strum(to_string = "live", serialize = "LIVE")]
    Live,
    /// Order is fully filled.
    #[strum(
        to_string = "filled",
        serialize = "FILLED",
        serialize = "matched",
        serialize = "MATCHED"
    )]
    Filled,
    /// Order was cancelled.
    #[strum(
        to_string = "canceled",
        serialize = "cancelled",
        serialize = "CANCELED",
        serialize = "CANCELLED"
    )]
    Canceled,
    /// Order was rejected.
    #[strum(to_string = "rejected", serialize = "REJECTED")]
    Rejected,
    /// Order expired.
    #[strum(to_string = "expired", serialize = "EXPIRED")]
    Expired,
}

impl OrderStatus {
    /// Check if status is terminal (won't change).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }

    /// Check if order was filled.
    pub fn is_filled(&self) -> bool {
        matches!(self, OrderStatus::Filled)
    }

    /// Terminal without a fill.
    pub fn is_dead(&self) -> bool {
        self.is_terminal() && !self.is_filled()
    }
}

/// Order state summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderState {
    /// Order ID.
    pub order_id: String,
    /// Current status, when the venue reported a recognizable one.
    pub status: Option<OrderStatus>,
    /// Filled size.
    pub filled_size: Option<Decimal>,
    /// Original size.
    pub original_size: Option<Decimal>,
}

impl OrderState {
    /// Synthetic fill reported in dry-run mode.
    pub fn synthetic_fill(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            status: Some(OrderStatus::Filled),
            ..Default::default()
        }
    }

    /// Whether the venue explicitly killed the order without filling it.
    pub fn is_dead(&self) -> bool {
        self.status.is_some_and(|s| s.is_dead())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn market_args_compute_notional() {
        let buy = OrderArgs::market("token-123", Side::Buy, dec!(0.785), dec!(5), TimeInForce::FOK);
        assert_eq!(buy.amount, Some(dec!(3.925)));

        let sell = OrderArgs::market("token-123", Side::Sell, dec!(0.915), dec!(5), TimeInForce::FOK);
        assert_eq!(sell.amount, Some(dec!(5)));

        let limit = OrderArgs::limit("token-123", Side::Buy, dec!(0.5), dec!(5), TimeInForce::GTC);
        assert_eq!(limit.amount, None);
        assert_eq!(limit.fee_rate_bps, 0);
    }

    #[test]
    fn mapping_view_carries_both_spellings() {
        let args = OrderArgs::market("tok", Side::Buy, dec!(0.50), dec!(10), TimeInForce::FOK);
        assert_eq!(args.get("fee_rate_bps"), Some(json!(0)));
        assert_eq!(args.get("feeRateBps"), Some(json!(0)));
        assert_eq!(args.get("token_id"), Some(json!("tok")));
        assert_eq!(args.get("tokenID"), Some(json!("tok")));
        assert_eq!(args.get("orderType"), Some(json!("FOK")));
        assert_eq!(args.get("side"), Some(json!("BUY")));
        assert_eq!(args.get("price"), Some(json!("0.5")));
        assert_eq!(args.get("amount"), Some(json!("5")));
        assert_eq!(args.get("nonexistent"), None);
    }

    #[test]
    fn order_args_validation() {
        let valid = OrderArgs::limit("token", Side::Buy, dec!(0.50), dec!(10), TimeInForce::FOK);
        assert!(valid.validate().is_ok());

        let no_token = OrderArgs::limit("", Side::Buy, dec!(0.50), dec!(10), TimeInForce::FOK);
        assert!(no_token.validate().is_err());

        let zero_price = OrderArgs::limit("token", Side::Buy, dec!(0), dec!(10), TimeInForce::FOK);
        assert!(zero_price.validate().is_err());

        let negative_size =
            OrderArgs::limit("token", Side::Sell, dec!(0.50), dec!(-10), TimeInForce::FOK);
        assert!(negative_size.validate().is_err());
    }

    #[test]
    fn order_status_terminal() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Live.is_terminal());
        assert!(OrderStatus::Canceled.is_dead());
        assert!(!OrderStatus::Filled.is_dead());
        assert_eq!(OrderStatus::from_str("MATCHED").unwrap(), OrderStatus::Filled);
    }

    #[test]
    fn time_in_force_from_string() {
        assert_eq!(TimeInForce::from_str("FOK").unwrap(), TimeInForce::FOK);
        assert_eq!(TimeInForce::from_str("fok").unwrap(), TimeInForce::FOK);
        assert_eq!(TimeInForce::from_str("GTC").unwrap(), TimeInForce::GTC);
        assert_eq!(TimeInForce::FAK.to_string(), "FAK");
        assert!(TimeInForce::from_str("IOC").is_err());
    }

    #[test]
    fn synthetic_fill_is_filled() {
        let state = OrderState::synthetic_fill("dry-run-1");
        assert_eq!(state.status, Some(OrderStatus::Filled));
        assert!(!state.is_dead());
    }
}
