//! Swing strategy: the buy/sell rule and the state machine that runs it.

pub mod decision;
pub mod machine;

pub use decision::{buy_limit_price, decide, sell_limit_price, Action, DecisionInput};
pub use machine::{BotState, MachineSettings, StatusReport, TradingStateMachine};
