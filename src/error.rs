//! Unified error types for the trading bot.

use rust_decimal::Decimal;
use thiserror::Error;

/// Unified error type for the trading bot.
#[derive(Error, Debug)]
pub enum BotError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Configuration loaded but failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Market-related error.
    #[error("market error: {0}")]
    Market(#[from] MarketError),

    /// Price feed error.
    #[error("price feed error: {0}")]
    Feed(#[from] FeedError),

    /// Trading/order error.
    #[error("trading error: {0}")]
    Trading(#[from] TradingError),

    /// HTTP request error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Market discovery and management errors.
#[derive(Error, Debug)]
pub enum MarketError {
    /// No live or upcoming 15-minute market could be resolved.
    #[error("no live or upcoming 15min market found")]
    MarketUnavailable,

    /// The UP/DOWN token mapping for a market could not be resolved.
    #[error("outcome tokens unavailable for market {instance_id}")]
    ConditionsUnavailable {
        /// Market instance whose tokens were requested.
        instance_id: String,
    },

    /// Failed to fetch market information.
    #[error("failed to fetch {resource}: {reason}")]
    FetchFailed {
        /// The slug, market id or token id that failed.
        resource: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to parse market data.
    #[error("failed to parse market data: {0}")]
    ParseError(String),

    /// HTTP request failed.
    #[error("http request failed: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Order book query failures.
#[derive(Error, Debug)]
pub enum FeedError {
    /// The book could not be fetched.
    #[error("order book unavailable for {token_id}: {reason}")]
    BookUnavailable {
        /// Token whose book was requested.
        token_id: String,
        /// Reason for failure.
        reason: String,
    },

    /// The requested side of the book has no readable level.
    #[error("no {side} levels for {token_id}")]
    EmptySide {
        /// Token whose book was requested.
        token_id: String,
        /// "ask" or "bid".
        side: &'static str,
    },
}

/// Trading and order execution errors.
#[derive(Error, Debug)]
pub enum TradingError {
    /// Order submission failed.
    #[error("order submission failed: {0}")]
    SubmissionFailed(String),

    /// The venue API generation in use does not offer this call.
    #[error("operation not supported by this API generation: {0}")]
    Unsupported(&'static str),

    /// Order rejected by the exchange.
    #[error("order rejected: {reason}")]
    OrderRejected {
        /// Rejection reason from the exchange.
        reason: String,
    },

    /// Every submission strategy failed or was unavailable.
    #[error("all submission strategies failed: {last_error}")]
    StrategiesExhausted {
        /// The last error seen, for logging.
        last_error: String,
    },

    /// Failed to get order status.
    #[error("failed to get order status for {order_id}: {reason}")]
    StatusFailed {
        /// Order ID.
        order_id: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to cancel order.
    #[error("failed to cancel order {order_id}: {reason}")]
    CancelFailed {
        /// Order ID that failed to cancel.
        order_id: String,
        /// Reason for failure.
        reason: String,
    },

    /// Collateral balance could not be read.
    #[error("balance query failed: {0}")]
    BalanceQueryFailed(String),

    /// Balance too low to place the configured order.
    #[error("insufficient balance: need {required}, have {available}")]
    InsufficientBalance {
        /// Required amount.
        required: Decimal,
        /// Available amount.
        available: Decimal,
    },

    /// Invalid order parameters.
    #[error("invalid order parameters: {0}")]
    InvalidParams(String),

    /// Signing error.
    #[error("signing error: {0}")]
    SigningError(String),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BotError>;
