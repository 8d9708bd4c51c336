//! Position tracking, the one-shot buy guard and running statistics.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;

use crate::market::Outcome;

/// One open (bought, not yet sold) holding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    /// Token ID.
    pub token_id: String,
    /// Which side of the market this token is.
    pub outcome: Outcome,
    /// Best ask observed when the buy was placed.
    pub entry_price: Decimal,
    /// Number of shares owned.
    pub size: Decimal,
    /// Order that opened the position.
    pub order_id: String,
    /// Slot the position was opened in.
    pub slot_id: String,
}

impl Position {
    /// Calculate the cost basis.
    pub fn cost_basis(&self) -> Decimal {
        self.size * self.entry_price
    }

    /// Calculate P&L at a given exit price.
    pub fn pnl(&self, exit_price: Decimal) -> Decimal {
        (exit_price - self.entry_price) * self.size
    }
}

/// Open positions keyed by token; at most one per token.
#[derive(Debug, Default)]
pub struct PositionBook {
    positions: HashMap<String, Position>,
}

impl PositionBook {
    /// Empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Position held in `token_id`, if any.
    pub fn get(&self, token_id: &str) -> Option<&Position> {
        self.positions.get(token_id)
    }

    /// Whether a position is held in `token_id`.
    pub fn contains(&self, token_id: &str) -> bool {
        self.positions.contains_key(token_id)
    }

    /// Record a new position. Refuses to overwrite an existing one and hands
    /// the rejected position back.
    pub fn open(&mut self, position: Position) -> Result<(), Position> {
        if self.positions.contains_key(&position.token_id) {
            return Err(position);
        }
        self.positions.insert(position.token_id.clone(), position);
        Ok(())
    }

    /// Remove and return the position in `token_id`.
    pub fn close(&mut self, token_id: &str) -> Option<Position> {
        self.positions.remove(token_id)
    }

    /// Drop every position, returning what was dropped.
    pub fn clear(&mut self) -> Vec<Position> {
        self.positions.drain().map(|(_, p)| p).collect()
    }

    /// Number of open positions.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether no positions are open.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Iterate over open positions.
    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// Total cost basis of open positions.
    pub fn total_cost_basis(&self) -> Decimal {
        self.positions.values().map(Position::cost_basis).sum()
    }
}

/// `(slot, outcome)` pairs that have already had their one buy attempt.
///
/// Entries are never removed during a run.
#[derive(Debug, Default)]
pub struct BuyGuard {
    attempted: HashSet<(String, Outcome)>,
}

impl BuyGuard {
    /// Empty guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `(slot_id, outcome)` has been attempted.
    pub fn is_consumed(&self, slot_id: &str, outcome: Outcome) -> bool {
        self.attempted.contains(&(slot_id.to_string(), outcome))
    }

    /// Mark `(slot_id, outcome)` attempted. Returns false if it already was.
    pub fn try_consume(&mut self, slot_id: &str, outcome: Outcome) -> bool {
        self.attempted.insert((slot_id.to_string(), outcome))
    }

    /// Number of consumed entries across all slots.
    pub fn len(&self) -> usize {
        self.attempted.len()
    }

    /// Whether nothing has been consumed yet.
    pub fn is_empty(&self) -> bool {
        self.attempted.is_empty()
    }
}

/// Monotonic counters for the whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunningStats {
    /// Buys that returned an order id and were not killed.
    pub total_buys: u64,
    /// Sells that returned an order id and were not killed.
    pub total_sells: u64,
    /// Sum of entry notional over all buys.
    pub total_invested: Decimal,
    /// Realized profit over closed positions.
    pub total_profit: Decimal,
    /// Buy attempts that produced no order.
    pub failed_buys: u64,
    /// Sell attempts that produced no order.
    pub failed_sells: u64,
    /// Positions dropped from bookkeeping at rollover.
    pub abandoned_positions: u64,
}

impl RunningStats {
    /// Account for an opened position.
    pub fn record_buy(&mut self, position: &Position) {
        self.total_buys += 1;
        self.total_invested += position.cost_basis();
    }

    /// Account for a closed position, returning the realized profit.
    pub fn record_sell(&mut self, position: &Position, exit_price: Decimal) -> Decimal {
        let profit = position.pnl(exit_price);
        self.total_sells += 1;
        self.total_profit += profit;
        profit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(token: &str, entry: Decimal) -> Position {
        Position {
            token_id: token.to_string(),
            outcome: Outcome::Up,
            entry_price: entry,
            size: dec!(5),
            order_id: "order-1".to_string(),
            slot_id: "btc-updown-15m-900".to_string(),
        }
    }

    #[test]
    fn position_calculations() {
        let pos = position("token", dec!(0.78));
        assert_eq!(pos.cost_basis(), dec!(3.90));
        assert_eq!(pos.pnl(dec!(0.92)), dec!(0.70));
        assert_eq!(pos.pnl(dec!(0.70)), dec!(-0.40));
    }

    #[test]
    fn book_holds_one_position_per_token() {
        let mut book = PositionBook::new();
        assert!(book.open(position("a", dec!(0.5))).is_ok());
        let rejected = book.open(position("a", dec!(0.6))).unwrap_err();
        assert_eq!(rejected.entry_price, dec!(0.6));
        assert_eq!(book.len(), 1);
        assert_eq!(book.get("a").unwrap().entry_price, dec!(0.5));

        assert!(book.open(position("b", dec!(0.4))).is_ok());
        assert_eq!(book.total_cost_basis(), dec!(4.5));

        assert!(book.close("a").is_some());
        assert!(book.close("a").is_none());
        assert_eq!(book.clear().len(), 1);
        assert!(book.is_empty());
    }

    #[test]
    fn guard_consumes_once_per_slot_and_outcome() {
        let mut guard = BuyGuard::new();
        assert!(guard.try_consume("slot-1", Outcome::Up));
        assert!(!guard.try_consume("slot-1", Outcome::Up));
        assert!(guard.try_consume("slot-1", Outcome::Down));
        assert!(guard.try_consume("slot-2", Outcome::Up));
        assert!(guard.is_consumed("slot-1", Outcome::Up));
        assert!(!guard.is_consumed("slot-3", Outcome::Up));
        assert_eq!(guard.len(), 3);
    }

    #[test]
    fn stats_accumulate() {
        let mut stats = RunningStats::default();
        let pos = position("a", dec!(0.78));
        stats.record_buy(&pos);
        let profit = stats.record_sell(&pos, dec!(0.92));
        assert_eq!(profit, dec!(0.70));
        assert_eq!(stats.total_buys, 1);
        assert_eq!(stats.total_sells, 1);
        assert_eq!(stats.total_invested, dec!(3.90));
        assert_eq!(stats.total_profit, dec!(0.70));
    }
}
