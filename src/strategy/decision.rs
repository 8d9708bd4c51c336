//! Buy/sell rule and limit price clamps.

use rust_decimal::Decimal;

/// Slippage allowance added to the ask on buys and taken off the bid on sells.
pub const PRICE_PAD: Decimal = Decimal::from_parts(5, 0, 0, false, 3); // 0.005
/// Highest limit price a buy may carry.
pub const MAX_LIMIT_PRICE: Decimal = Decimal::from_parts(99, 0, 0, false, 2); // 0.99
/// Lowest limit price a sell may carry.
pub const MIN_LIMIT_PRICE: Decimal = Decimal::from_parts(1, 0, 0, false, 2); // 0.01

/// Limit price for a buy at the observed best ask.
pub fn buy_limit_price(best_ask: Decimal) -> Decimal {
    (best_ask + PRICE_PAD).min(MAX_LIMIT_PRICE)
}

/// Limit price for a sell at the observed best bid.
pub fn sell_limit_price(best_bid: Decimal) -> Decimal {
    (best_bid - PRICE_PAD).max(MIN_LIMIT_PRICE)
}

/// What to do with one token this scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing.
    Hold,
    /// Buy at `limit`; `reference` is the observed ask.
    Buy {
        /// Padded limit price.
        limit: Decimal,
        /// Best ask the decision was made on.
        reference: Decimal,
    },
    /// Sell the held position at `limit`; `reference` is the observed bid.
    Sell {
        /// Padded limit price.
        limit: Decimal,
        /// Best bid the decision was made on.
        reference: Decimal,
    },
}

/// Inputs to one buy/sell decision.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput {
    /// Best ask for the token.
    pub best_ask: Decimal,
    /// Best bid for the token.
    pub best_bid: Decimal,
    /// A position is held in the token.
    pub holding: bool,
    /// The `(slot, outcome)` buy attempt has been used.
    pub guard_consumed: bool,
}

/// Apply the one-shot buy / guarded-sell rule.
///
/// A held token can only sell; a flat token can only buy, and only while its
/// guard is unused.
pub fn decide(input: DecisionInput, buy_price: Decimal, sell_price: Decimal) -> Action {
    if input.holding {
        if input.best_bid >= sell_price {
            return Action::Sell {
                limit: sell_limit_price(input.best_bid),
                reference: input.best_bid,
            };
        }
        return Action::Hold;
    }

    if !input.guard_consumed && input.best_ask <= buy_price {
        return Action::Buy {
            limit: buy_limit_price(input.best_ask),
            reference: input.best_ask,
        };
    }

    Action::Hold
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn input(ask: Decimal, bid: Decimal, holding: bool, guard_consumed: bool) -> DecisionInput {
        DecisionInput {
            best_ask: ask,
            best_bid: bid,
            holding,
            guard_consumed,
        }
    }

    #[test]
    fn constants_match_their_literals() {
        assert_eq!(PRICE_PAD, dec!(0.005));
        assert_eq!(MAX_LIMIT_PRICE, dec!(0.99));
        assert_eq!(MIN_LIMIT_PRICE, dec!(0.01));
    }

    #[test]
    fn limit_prices_are_padded_and_clamped() {
        assert_eq!(buy_limit_price(dec!(0.78)), dec!(0.785));
        assert_eq!(buy_limit_price(dec!(0.988)), dec!(0.99));
        assert_eq!(buy_limit_price(dec!(0.99)), dec!(0.99));
        assert_eq!(sell_limit_price(dec!(0.92)), dec!(0.915));
        assert_eq!(sell_limit_price(dec!(0.012)), dec!(0.01));
    }

    #[test]
    fn flat_token_buys_at_or_below_threshold() {
        let (buy, sell) = (dec!(0.80), dec!(0.90));
        assert_eq!(
            decide(input(dec!(0.78), dec!(0.76), false, false), buy, sell),
            Action::Buy { limit: dec!(0.785), reference: dec!(0.78) }
        );
        assert!(matches!(
            decide(input(dec!(0.80), dec!(0.79), false, false), buy, sell),
            Action::Buy { .. }
        ));
        assert_eq!(decide(input(dec!(0.85), dec!(0.84), false, false), buy, sell), Action::Hold);
    }

    #[test]
    fn consumed_guard_blocks_buy() {
        assert_eq!(
            decide(input(dec!(0.50), dec!(0.49), false, true), dec!(0.80), dec!(0.90)),
            Action::Hold
        );
    }

    #[test]
    fn held_token_only_sells() {
        let (buy, sell) = (dec!(0.80), dec!(0.90));
        assert_eq!(
            decide(input(dec!(0.93), dec!(0.92), true, true), buy, sell),
            Action::Sell { limit: dec!(0.915), reference: dec!(0.92) }
        );
        // cheap ask on a held token never buys again
        assert_eq!(decide(input(dec!(0.50), dec!(0.49), true, false), buy, sell), Action::Hold);
    }
}
