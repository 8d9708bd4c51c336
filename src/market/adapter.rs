//! Execution adapter over the CLOB API.
//!
//! The venue has shipped several API generations whose order entrypoints
//! differ. [`ExecutionApi`] is the one narrow surface the rest of the crate
//! talks to; each generation gets its own implementation and [`connect`]
//! picks one by probing the venue at startup.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::client::PolymarketClient;
use crate::config::Config;
use crate::error::{MarketError, TradingError};
use crate::trading::order::{OrderArgs, OrderState, TimeInForce};

/// First API version that accepts market-style orders.
pub const UNIFIED_API_VERSION: u64 = 2;

/// Which order entrypoints an adapter offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// `create_market_order` is available.
    pub market_orders: bool,
    /// `create_order` is available.
    pub limit_orders: bool,
    /// `post_order` is available.
    pub post_order: bool,
    /// `create_and_post_order` is available.
    pub create_and_post: bool,
}

impl Capabilities {
    /// Everything available.
    pub const ALL: Capabilities = Capabilities {
        market_orders: true,
        limit_orders: true,
        post_order: true,
        create_and_post: true,
    };
}

/// A signed order ready for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedOrder {
    /// Order fields as sent to the venue.
    pub payload: Map<String, Value>,
    /// Hex signature over the payload.
    pub signature: String,
    /// Owner sent with the order.
    pub owner: String,
}

impl SignedOrder {
    /// Request body for `POST /order`.
    pub fn to_body(&self, order_type: Option<TimeInForce>) -> Value {
        let mut order = self.payload.clone();
        order.insert("signature".into(), Value::String(self.signature.clone()));
        let mut body = json!({ "order": order, "owner": self.owner });
        if let Some(tif) = order_type {
            body["orderType"] = Value::String(tif.to_string());
        }
        body
    }
}

/// Balance, book, order and status calls against the venue.
///
/// Order creation methods default to [`TradingError::Unsupported`]; an
/// implementation overrides the ones its generation offers and reports them
/// through [`ExecutionApi::capabilities`].
#[async_trait]
pub trait ExecutionApi: Send + Sync {
    /// Short name of the API generation.
    fn generation(&self) -> &'static str;

    /// Entrypoints this adapter offers.
    fn capabilities(&self) -> Capabilities;

    /// USDC collateral balance.
    async fn balance(&self) -> Result<Decimal, TradingError>;

    /// Raw order book for a token, in whatever shape the venue returns.
    async fn order_book(&self, token_id: &str) -> Result<Value, MarketError>;

    /// Build and sign a market-style order.
    async fn create_market_order(&self, _args: &OrderArgs) -> Result<SignedOrder, TradingError> {
        Err(TradingError::Unsupported("create_market_order"))
    }

    /// Build and sign a limit order.
    async fn create_order(&self, _args: &OrderArgs) -> Result<SignedOrder, TradingError> {
        Err(TradingError::Unsupported("create_order"))
    }

    /// Submit a signed order, optionally with an explicit fill policy.
    async fn post_order(
        &self,
        order: &SignedOrder,
        order_type: Option<TimeInForce>,
    ) -> Result<Value, TradingError>;

    /// Build, sign and submit in one call.
    async fn create_and_post_order(&self, _args: &OrderArgs) -> Result<Value, TradingError> {
        Err(TradingError::Unsupported("create_and_post_order"))
    }

    /// Current order state, or `None` if the venue does not know the order.
    async fn order_status(&self, order_id: &str) -> Result<Option<OrderState>, TradingError>;

    /// Cancel an order; true if the venue confirmed it.
    async fn cancel(&self, order_id: &str) -> Result<bool, TradingError>;
}

async fn sign_args(
    client: &PolymarketClient,
    args: &OrderArgs,
) -> Result<SignedOrder, TradingError> {
    args.validate().map_err(TradingError::InvalidParams)?;

    let mut payload = args.to_map();
    let maker = client.maker_address()?;
    payload.insert("maker".into(), Value::String(maker));
    payload.insert("signer".into(), Value::String(client.get_address()?));
    payload.insert(
        "taker".into(),
        Value::String("0x0000000000000000000000000000000000000000".to_string()),
    );
    payload.insert("signatureType".into(), Value::from(client.signature_type()));
    payload.insert(
        "nonce".into(),
        Value::String(chrono::Utc::now().timestamp_millis().to_string()),
    );
    payload.insert("expiration".into(), Value::String("0".to_string()));
    // 15-minute up/down markets are all neg-risk.
    payload.insert("negRisk".into(), Value::Bool(true));

    let signature = client.sign_payload(&payload).await?;
    Ok(SignedOrder {
        payload,
        signature,
        owner: client.owner()?,
    })
}

/// Current API generation: market orders, explicit fill policy on submit.
#[derive(Debug, Clone)]
pub struct UnifiedClob {
    client: PolymarketClient,
}

impl UnifiedClob {
    /// Wrap a transport.
    pub fn new(client: PolymarketClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExecutionApi for UnifiedClob {
    fn generation(&self) -> &'static str {
        "unified"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    async fn balance(&self) -> Result<Decimal, TradingError> {
        self.client.get_balance().await
    }

    async fn order_book(&self, token_id: &str) -> Result<Value, MarketError> {
        self.client.get_order_book(token_id).await
    }

    async fn create_market_order(&self, args: &OrderArgs) -> Result<SignedOrder, TradingError> {
        if args.amount.is_none() {
            return Err(TradingError::InvalidParams(
                "market order needs an amount".to_string(),
            ));
        }
        sign_args(&self.client, args).await
    }

    async fn create_order(&self, args: &OrderArgs) -> Result<SignedOrder, TradingError> {
        sign_args(&self.client, args).await
    }

    async fn post_order(
        &self,
        order: &SignedOrder,
        order_type: Option<TimeInForce>,
    ) -> Result<Value, TradingError> {
        self.client.post_order_body(&order.to_body(order_type)).await
    }

    async fn create_and_post_order(&self, args: &OrderArgs) -> Result<Value, TradingError> {
        let order = sign_args(&self.client, args).await?;
        self.post_order(&order, Some(args.order_type)).await
    }

    async fn order_status(&self, order_id: &str) -> Result<Option<OrderState>, TradingError> {
        self.client.get_order(order_id).await
    }

    async fn cancel(&self, order_id: &str) -> Result<bool, TradingError> {
        self.client.cancel_order(order_id).await
    }
}

/// Older API generation: limit orders only, fill policy lives in the order
/// payload and the submit call takes no order type.
#[derive(Debug, Clone)]
pub struct LegacyClob {
    client: PolymarketClient,
}

impl LegacyClob {
    /// Wrap a transport.
    pub fn new(client: PolymarketClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExecutionApi for LegacyClob {
    fn generation(&self) -> &'static str {
        "legacy"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            market_orders: false,
            ..Capabilities::ALL
        }
    }

    async fn balance(&self) -> Result<Decimal, TradingError> {
        self.client.get_balance().await
    }

    async fn order_book(&self, token_id: &str) -> Result<Value, MarketError> {
        self.client.get_order_book(token_id).await
    }

    async fn create_order(&self, args: &OrderArgs) -> Result<SignedOrder, TradingError> {
        sign_args(&self.client, args).await
    }

    async fn post_order(
        &self,
        order: &SignedOrder,
        order_type: Option<TimeInForce>,
    ) -> Result<Value, TradingError> {
        if order_type.is_some() {
            return Err(TradingError::InvalidParams(
                "legacy submit does not take an order type".to_string(),
            ));
        }
        self.client.post_order_body(&order.to_body(None)).await
    }

    async fn create_and_post_order(&self, args: &OrderArgs) -> Result<Value, TradingError> {
        let order = sign_args(&self.client, args).await?;
        self.post_order(&order, None).await
    }

    async fn order_status(&self, order_id: &str) -> Result<Option<OrderState>, TradingError> {
        self.client.get_order(order_id).await
    }

    async fn cancel(&self, order_id: &str) -> Result<bool, TradingError> {
        self.client.cancel_order(order_id).await
    }
}

/// Adapter for an advertised API version; `None` means the version check failed.
pub fn adapter_for_version(
    client: PolymarketClient,
    version: Option<u64>,
) -> Arc<dyn ExecutionApi> {
    match version {
        Some(v) if v >= UNIFIED_API_VERSION => Arc::new(UnifiedClob::new(client)),
        _ => Arc::new(LegacyClob::new(client)),
    }
}

/// Build the transport, ask the venue for its version and return the matching adapter.
pub async fn connect(config: &Config) -> Result<Arc<dyn ExecutionApi>, TradingError> {
    let client = PolymarketClient::new(config)?;
    let version = client.api_version().await;
    if version.is_none() {
        warn!(host = %client.clob_url(), "API version check failed, assuming legacy API");
    }
    let api = adapter_for_version(client, version);
    info!(generation = api.generation(), version = ?version, "Execution adapter selected");
    Ok(api)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::order::Side;
    use rust_decimal_macros::dec;

    fn client() -> PolymarketClient {
        let config = Config::from_pairs([(
            "POLYMARKET_PRIVATE_KEY",
            "0x0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef",
        )])
        .unwrap();
        PolymarketClient::new(&config).unwrap()
    }

    #[test]
    fn version_selects_generation() {
        assert_eq!(adapter_for_version(client(), Some(2)).generation(), "unified");
        assert_eq!(adapter_for_version(client(), Some(3)).generation(), "unified");
        assert_eq!(adapter_for_version(client(), Some(1)).generation(), "legacy");
        assert_eq!(adapter_for_version(client(), None).generation(), "legacy");
    }

    #[test]
    fn legacy_lacks_market_orders() {
        let caps = LegacyClob::new(client()).capabilities();
        assert!(!caps.market_orders);
        assert!(caps.limit_orders && caps.post_order && caps.create_and_post);
    }

    #[tokio::test]
    async fn legacy_refuses_order_type_on_submit() {
        let api = LegacyClob::new(client());
        let order = SignedOrder {
            payload: Map::new(),
            signature: "0x".to_string(),
            owner: "owner".to_string(),
        };
        let err = api.post_order(&order, Some(TimeInForce::FOK)).await.unwrap_err();
        assert!(matches!(err, TradingError::InvalidParams(_)));

        let err = api
            .create_market_order(&OrderArgs::market("t", Side::Buy, dec!(0.5), dec!(1), TimeInForce::FOK))
            .await
            .unwrap_err();
        assert!(matches!(err, TradingError::Unsupported("create_market_order")));
    }

    #[tokio::test]
    async fn signed_orders_carry_both_spellings() {
        let api = UnifiedClob::new(client());
        let args = OrderArgs::market("tok", Side::Buy, dec!(0.785), dec!(5), TimeInForce::FOK);
        let order = api.create_market_order(&args).await.unwrap();
        assert!(order.signature.starts_with("0x"));
        assert_eq!(order.payload["fee_rate_bps"], json!(0));
        assert_eq!(order.payload["feeRateBps"], json!(0));
        assert_eq!(order.payload["amount"], json!("3.925"));

        let body = order.to_body(Some(TimeInForce::FOK));
        assert_eq!(body["orderType"], json!("FOK"));
        assert!(body["order"]["signature"].is_string());
        assert!(order.to_body(None).get("orderType").is_none());
    }
}
