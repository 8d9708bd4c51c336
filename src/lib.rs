//! BTC 15-minute Polymarket swing bot.
//!
//! Each 15-minute BTC up/down market has two outcome tokens. The bot buys a
//! token once its ask falls to `BUY_PRICE`, holds it, and sells once its bid
//! reaches `SELL_PRICE`:
//!
//! ```text
//! BUY_PRICE 0.80   ask 0.78  -> buy 5 @ limit 0.785, entry 0.78
//! SELL_PRICE 0.90  bid 0.92  -> sell 5 @ limit 0.915
//! profit           (0.92 - 0.78) * 5 = 0.70
//! ```
//!
//! Each side gets at most one buy attempt per market. Positions still open
//! when the market rolls over are dropped from bookkeeping, not sold.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`market`]: Market discovery, CLOB client and execution adapters
//! - [`orderbook`]: Order book normalization and best bid/ask
//! - [`trading`]: Orders, order routing and position tracking
//! - [`strategy`]: Buy/sell rule and the trading state machine
//! - [`signing`]: Wallet keys and request signing
//! - [`metrics`]: Prometheus metrics
//! - [`utils`]: Utility functions

pub mod config;
pub mod error;
pub mod market;
pub mod metrics;
pub mod orderbook;
pub mod signing;
pub mod strategy;
pub mod trading;
pub mod utils;

pub use config::Config;
pub use error::{BotError, Result};
