//! Market module for BTC 15-minute up/down markets.
//!
//! This module handles:
//! - Market types and slot math
//! - Market discovery through the Gamma API
//! - The authenticated CLOB transport and its per-generation adapters
//! - Scripted collaborators for tests

pub mod adapter;
pub mod client;
pub mod discovery;
pub mod mock;
pub mod types;

pub use adapter::{connect, Capabilities, ExecutionApi, LegacyClob, SignedOrder, UnifiedClob};
pub use client::PolymarketClient;
pub use discovery::{GammaDirectory, MarketDirectory};
pub use mock::{MockDirectory, MockExchange, MockOrderBookBuilder};
pub use types::{MarketDescriptor, Outcome, OutcomeTokens, SLOT_SECONDS};
