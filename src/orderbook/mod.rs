//! Order book module.
//!
//! This module handles:
//! - Order book types
//! - Best bid/ask extraction from venue book responses

pub mod feed;
pub mod types;

pub use feed::{normalize_book, PriceFeed};
pub use types::{OutcomeBook, PriceLevel, Quote};
