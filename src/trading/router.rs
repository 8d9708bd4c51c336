//! Order placement across API generations.
//!
//! [`OrderRouter`] tries an ordered list of [`SubmitStrategy`] objects; the
//! first that yields an order id wins. Retrying a failed placement is the
//! caller's decision.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::execution::{extract_order_id, rejection_reason};
use super::order::{OrderArgs, OrderState, Side, TimeInForce};
use crate::error::TradingError;
use crate::market::{Capabilities, ExecutionApi, SignedOrder};
use crate::metrics;

/// One order placement to route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    /// Token ID to trade.
    pub token_id: String,
    /// Order side.
    pub side: Side,
    /// Limit price.
    pub price: Decimal,
    /// Share count.
    pub size: Decimal,
    /// Fill policy.
    pub fill_policy: TimeInForce,
}

/// Read the order id out of a submission response.
///
/// An explicit venue rejection is an error; a response with no id is `None`.
pub fn order_id_from_response(response: &Value) -> Result<Option<String>, TradingError> {
    if let Some(id) = extract_order_id(response) {
        return Ok(Some(id));
    }
    match rejection_reason(response) {
        Some(reason) => Err(TradingError::OrderRejected { reason }),
        None => Ok(None),
    }
}

/// One way of getting an order onto the book.
#[async_trait]
pub trait SubmitStrategy: Send + Sync {
    /// Name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Whether the adapter offers the entrypoints this strategy needs.
    fn is_available(&self, capabilities: &Capabilities) -> bool;

    /// Try to place `request`; `Ok(None)` means the venue answered without an id.
    async fn attempt_submit(
        &self,
        api: &dyn ExecutionApi,
        request: &OrderRequest,
    ) -> Result<Option<String>, TradingError>;
}

/// Submit a signed order with the explicit fill policy, then without it if
/// the first call errors.
async fn post_with_and_without_policy(
    api: &dyn ExecutionApi,
    order: &SignedOrder,
    fill_policy: TimeInForce,
) -> Result<Option<String>, TradingError> {
    match api.post_order(order, Some(fill_policy)).await {
        Ok(response) => order_id_from_response(&response),
        Err(e) => {
            debug!(error = %e, "Submit with order type failed, retrying without");
            let response = api.post_order(order, None).await?;
            order_id_from_response(&response)
        }
    }
}

/// Market-style order: notional amount, created then posted.
#[derive(Debug, Default)]
pub struct MarketOrderStrategy;

#[async_trait]
impl SubmitStrategy for MarketOrderStrategy {
    fn name(&self) -> &'static str {
        "market"
    }

    fn is_available(&self, capabilities: &Capabilities) -> bool {
        capabilities.market_orders && capabilities.post_order
    }

    async fn attempt_submit(
        &self,
        api: &dyn ExecutionApi,
        request: &OrderRequest,
    ) -> Result<Option<String>, TradingError> {
        let args = OrderArgs::market(
            &request.token_id,
            request.side,
            request.price,
            request.size,
            request.fill_policy,
        );
        let order = api.create_market_order(&args).await?;
        post_with_and_without_policy(api, &order, request.fill_policy).await
    }
}

/// Limit order at the padded price, created then posted.
#[derive(Debug, Default)]
pub struct LimitOrderStrategy;

#[async_trait]
impl SubmitStrategy for LimitOrderStrategy {
    fn name(&self) -> &'static str {
        "limit"
    }

    fn is_available(&self, capabilities: &Capabilities) -> bool {
        capabilities.limit_orders && capabilities.post_order
    }

    async fn attempt_submit(
        &self,
        api: &dyn ExecutionApi,
        request: &OrderRequest,
    ) -> Result<Option<String>, TradingError> {
        let args = OrderArgs::limit(
            &request.token_id,
            request.side,
            request.price,
            request.size,
            request.fill_policy,
        );
        let order = api.create_order(&args).await?;
        post_with_and_without_policy(api, &order, request.fill_policy).await
    }
}

/// Single-call create and submit.
#[derive(Debug, Default)]
pub struct CreateAndPostStrategy;

#[async_trait]
impl SubmitStrategy for CreateAndPostStrategy {
    fn name(&self) -> &'static str {
        "create_and_post"
    }

    fn is_available(&self, capabilities: &Capabilities) -> bool {
        capabilities.create_and_post
    }

    async fn attempt_submit(
        &self,
        api: &dyn ExecutionApi,
        request: &OrderRequest,
    ) -> Result<Option<String>, TradingError> {
        let args = OrderArgs::limit(
            &request.token_id,
            request.side,
            request.price,
            request.size,
            request.fill_policy,
        );
        let response = api.create_and_post_order(&args).await?;
        order_id_from_response(&response)
    }
}

/// The standard fallback order: market, limit, create-and-post.
pub fn default_strategies() -> Vec<Box<dyn SubmitStrategy>> {
    vec![
        Box::new(MarketOrderStrategy),
        Box::new(LimitOrderStrategy),
        Box::new(CreateAndPostStrategy),
    ]
}

/// Places orders through the first working strategy.
pub struct OrderRouter {
    api: Arc<dyn ExecutionApi>,
    strategies: Vec<Box<dyn SubmitStrategy>>,
    dry_run: bool,
    dry_run_counter: AtomicU64,
    fallbacks: AtomicU64,
}

impl OrderRouter {
    /// Router with the default strategies.
    pub fn new(api: Arc<dyn ExecutionApi>, dry_run: bool) -> Self {
        Self::with_strategies(api, default_strategies(), dry_run)
    }

    /// Router with an explicit strategy list, tried in order.
    pub fn with_strategies(
        api: Arc<dyn ExecutionApi>,
        strategies: Vec<Box<dyn SubmitStrategy>>,
        dry_run: bool,
    ) -> Self {
        Self {
            api,
            strategies,
            dry_run,
            dry_run_counter: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
        }
    }

    /// Whether orders are simulated.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Times a failed strategy handed over to a later one.
    pub fn fallbacks(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    /// Place an order and return its id.
    ///
    /// Fails with [`TradingError::StrategiesExhausted`] carrying the last
    /// error when no strategy produced an id.
    #[instrument(skip(self), fields(dry_run = self.dry_run))]
    pub async fn place_order(
        &self,
        token_id: &str,
        side: Side,
        price: Decimal,
        size: Decimal,
        fill_policy: TimeInForce,
    ) -> Result<String, TradingError> {
        let request = OrderRequest {
            token_id: token_id.to_string(),
            side,
            price,
            size,
            fill_policy,
        };

        if self.dry_run {
            let n = self.dry_run_counter.fetch_add(1, Ordering::Relaxed) + 1;
            let order_id = format!("dry-run-{}", n);
            info!(order_id = %order_id, "DRY RUN: order not sent");
            return Ok(order_id);
        }

        let _timer = metrics::timer_order_submit();
        let capabilities = self.api.capabilities();
        let mut last_error: Option<String> = None;

        let available: Vec<&dyn SubmitStrategy> = self
            .strategies
            .iter()
            .map(|s| &**s)
            .filter(|s| {
                let ok = s.is_available(&capabilities);
                if !ok {
                    debug!(strategy = s.name(), "Strategy unavailable");
                }
                ok
            })
            .collect();

        for (i, strategy) in available.iter().enumerate() {
            match strategy.attempt_submit(self.api.as_ref(), &request).await {
                Ok(Some(order_id)) => {
                    info!(
                        order_id = %order_id,
                        strategy = strategy.name(),
                        "Order submitted"
                    );
                    metrics::inc_orders_submitted(side, strategy.name());
                    return Ok(order_id);
                }
                Ok(None) => {
                    warn!(strategy = strategy.name(), "Submission returned no order id");
                    last_error = Some(format!("{}: no order id in response", strategy.name()));
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "Submission strategy failed");
                    last_error = Some(format!("{}: {}", strategy.name(), e));
                }
            }
            if let Some(next) = available.get(i + 1) {
                debug!(from = strategy.name(), to = next.name(), "Falling back");
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
                metrics::inc_strategy_fallback(strategy.name());
            }
        }

        metrics::inc_orders_failed(side);
        Err(TradingError::StrategiesExhausted {
            last_error: last_error.unwrap_or_else(|| "no strategy available".to_string()),
        })
    }

    /// Order state; in dry-run mode every order reports filled at once.
    pub async fn order_status(&self, order_id: &str) -> Result<Option<OrderState>, TradingError> {
        if self.dry_run {
            return Ok(Some(OrderState::synthetic_fill(order_id)));
        }
        self.api.order_status(order_id).await
    }

    /// Cancel an order; a no-op success in dry-run mode.
    pub async fn cancel(&self, order_id: &str) -> Result<bool, TradingError> {
        if self.dry_run {
            info!(order_id = %order_id, "DRY RUN: cancel not sent");
            return Ok(true);
        }
        self.api.cancel(order_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::MockExchange;
    use crate::trading::order::OrderStatus;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn router(exchange: &Arc<MockExchange>) -> OrderRouter {
        OrderRouter::new(exchange.clone(), false)
    }

    async fn buy(router: &OrderRouter) -> Result<String, TradingError> {
        router
            .place_order("tok", Side::Buy, dec!(0.785), dec!(5), TimeInForce::FOK)
            .await
    }

    #[tokio::test]
    async fn market_strategy_wins_when_available() {
        let exchange = Arc::new(MockExchange::new());
        let id = buy(&router(&exchange)).await.unwrap();
        assert_eq!(id, "mock-order-1");

        let submitted = exchange.submissions();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].via, "post_order");
        assert_eq!(submitted[0].order_type, Some(TimeInForce::FOK));
        assert_eq!(submitted[0].price(), Some(dec!(0.785)));
        assert_eq!(submitted[0].payload["amount"], json!("3.925"));
        assert_eq!(submitted[0].payload["feeRateBps"], json!(0));
    }

    #[tokio::test]
    async fn sells_use_raw_size_as_amount() {
        let exchange = Arc::new(MockExchange::new());
        router(&exchange)
            .place_order("tok", Side::Sell, dec!(0.915), dec!(5), TimeInForce::FOK)
            .await
            .unwrap();
        assert_eq!(exchange.submissions()[0].payload["amount"], json!("5"));
        assert_eq!(exchange.submissions()[0].side(), Some("SELL"));
    }

    #[tokio::test]
    async fn falls_back_to_limit_without_market_orders() {
        let exchange = Arc::new(MockExchange::new());
        exchange.set_capabilities(Capabilities {
            market_orders: false,
            ..Capabilities::ALL
        });
        exchange.set_reject_order_type(true);

        let id = buy(&router(&exchange)).await.unwrap();
        assert_eq!(id, "mock-order-1");
        assert_eq!(exchange.attempts(), ["create_order", "post_order", "post_order"]);
        let submitted = exchange.submissions();
        assert_eq!(submitted[0].order_type, None);
        assert!(submitted[0].payload.get("amount").is_none());
    }

    #[tokio::test]
    async fn falls_back_to_create_and_post() {
        let exchange = Arc::new(MockExchange::new());
        exchange.set_fail_create(true);

        let router = router(&exchange);
        let id = buy(&router).await.unwrap();
        assert_eq!(id, "mock-order-1");
        assert_eq!(router.fallbacks(), 2);
        assert_eq!(
            exchange.attempts(),
            ["create_market_order", "create_order", "create_and_post_order"]
        );
        assert_eq!(exchange.submissions()[0].via, "create_and_post_order");
    }

    #[tokio::test]
    async fn exhaustion_surfaces_last_error() {
        let exchange = Arc::new(MockExchange::new());
        exchange.fail_all_orders();

        let router = router(&exchange);
        let err = buy(&router).await.unwrap_err();
        // the last strategy has nothing to fall back to
        assert_eq!(router.fallbacks(), 2);
        match err {
            TradingError::StrategiesExhausted { last_error } => {
                assert!(last_error.starts_with("create_and_post"), "{}", last_error)
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(exchange.submissions().is_empty());
    }

    #[tokio::test]
    async fn rejections_count_as_failures() {
        let exchange = Arc::new(MockExchange::new());
        exchange.set_reject_with(Some("not enough balance"));

        let err = buy(&router(&exchange)).await.unwrap_err();
        assert!(err.to_string().contains("not enough balance"));
    }

    #[tokio::test]
    async fn no_available_strategy_is_exhaustion() {
        let exchange = Arc::new(MockExchange::new());
        exchange.set_capabilities(Capabilities {
            market_orders: false,
            limit_orders: false,
            post_order: false,
            create_and_post: false,
        });
        let err = buy(&router(&exchange)).await.unwrap_err();
        assert!(err.to_string().contains("no strategy available"));
        assert!(exchange.attempts().is_empty());
    }

    #[tokio::test]
    async fn lone_strategy_failure_is_not_a_fallback() {
        let exchange = Arc::new(MockExchange::new());
        exchange.set_capabilities(Capabilities {
            market_orders: false,
            limit_orders: false,
            post_order: false,
            create_and_post: true,
        });
        exchange.fail_all_orders();

        let router = router(&exchange);
        assert!(buy(&router).await.is_err());
        assert_eq!(exchange.attempts(), ["create_and_post_order"]);
        assert_eq!(router.fallbacks(), 0);
    }

    #[tokio::test]
    async fn plain_text_responses_never_become_order_ids() {
        let exchange = Arc::new(MockExchange::new());
        let router = router(&exchange);

        exchange.set_raw_response(Some("<html><body>502 Bad Gateway</body></html>"));
        let err = buy(&router).await.unwrap_err();
        assert!(matches!(err, TradingError::StrategiesExhausted { .. }));
        assert!(err.to_string().contains("unreadable order response"), "{}", err);

        // a JSON string that is not an order hash is just as useless
        exchange.set_raw_response(Some(r#""OK""#));
        let err = buy(&router).await.unwrap_err();
        assert!(err.to_string().contains("no order id"), "{}", err);

        exchange.set_raw_response(Some(r#""0xabc123""#));
        assert_eq!(buy(&router).await.unwrap(), "0xabc123");
    }

    #[tokio::test]
    async fn dry_run_never_touches_the_venue() {
        let exchange = Arc::new(MockExchange::new());
        exchange.fail_all_orders();
        let router = OrderRouter::new(exchange.clone(), true);
        assert!(router.is_dry_run());

        assert_eq!(buy(&router).await.unwrap(), "dry-run-1");
        assert_eq!(buy(&router).await.unwrap(), "dry-run-2");
        let state = router.order_status("dry-run-1").await.unwrap().unwrap();
        assert_eq!(state.status, Some(OrderStatus::Filled));
        assert!(exchange.attempts().is_empty());
    }

    #[test]
    fn response_ids_and_rejections() {
        assert_eq!(order_id_from_response(&json!({"orderID": "a"})).unwrap(), Some("a".to_string()));
        assert_eq!(order_id_from_response(&json!({"status": "ok"})).unwrap(), None);
        assert!(order_id_from_response(&json!({"success": false, "errorMsg": "x"})).is_err());
    }
}
