//! Trading module for order placement and position bookkeeping.
//!
//! This module handles:
//! - Order types and argument bundles
//! - Parsing venue order responses
//! - Routing orders across API generations
//! - Positions, the buy guard and running stats

pub mod execution;
pub mod order;
pub mod position;
pub mod router;

pub use execution::{extract_order_id, parse_order_state};
pub use order::{OrderArgs, OrderState, OrderStatus, Side, TimeInForce};
pub use position::{BuyGuard, Position, PositionBook, RunningStats};
pub use router::{OrderRequest, OrderRouter, SubmitStrategy};
