//! Scripted collaborators for tests.
//!
//! [`MockDirectory`] stands in for market discovery and [`MockExchange`] for
//! the venue. Both are shared behind `Arc` and scripted through `&self`
//! setters while the state machine runs.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};

use super::adapter::{Capabilities, ExecutionApi, SignedOrder};
use super::client::{balance_from_response, order_response_from_text};
use super::discovery::{build_slug, MarketDirectory};
use super::types::{MarketDescriptor, OutcomeTokens};
use crate::error::{MarketError, TradingError};
use crate::trading::order::{OrderArgs, OrderState, OrderStatus, TimeInForce};

/// Default slug prefix used by mock descriptors.
pub const MOCK_SLUG_PREFIX: &str = "btc-updown-15m";

/// Live descriptor for the slot starting at `start`.
pub fn mock_descriptor(start: i64) -> MarketDescriptor {
    MarketDescriptor::for_slot(
        format!("market-{}", start),
        "Bitcoin Up or Down",
        build_slug(MOCK_SLUG_PREFIX, start),
        start,
        start,
    )
}

/// Token pair whose ids embed `start`, so pairs never repeat across slots.
pub fn mock_tokens(start: i64) -> OutcomeTokens {
    OutcomeTokens::new(format!("up-{}", start), format!("down-{}", start))
}

/// Market directory returning whatever it was last told to.
#[derive(Debug, Default)]
pub struct MockDirectory {
    market: Mutex<Option<MarketDescriptor>>,
    tokens: Mutex<HashMap<String, OutcomeTokens>>,
    lookups: AtomicU64,
}

impl MockDirectory {
    /// Empty directory: every lookup returns `None`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory already serving the slot at `start` with its tokens.
    pub fn with_slot(start: i64) -> Self {
        let directory = Self::new();
        directory.set_slot(start);
        directory
    }

    /// Serve `market` from now on.
    pub fn set_market(&self, market: Option<MarketDescriptor>) {
        *self.market.lock().unwrap() = market;
    }

    /// Serve `tokens` for `instance_id`.
    pub fn set_tokens(&self, instance_id: &str, tokens: Option<OutcomeTokens>) {
        let mut map = self.tokens.lock().unwrap();
        match tokens {
            Some(t) => map.insert(instance_id.to_string(), t),
            None => map.remove(instance_id),
        };
    }

    /// Serve the slot at `start` together with its token pair.
    pub fn set_slot(&self, start: i64) {
        let market = mock_descriptor(start);
        self.set_tokens(&market.instance_id, Some(mock_tokens(start)));
        self.set_market(Some(market));
    }

    /// Number of `find_current_market` calls so far.
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDirectory for MockDirectory {
    async fn find_current_market(&self, _now: i64) -> Option<MarketDescriptor> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.market.lock().unwrap().clone()
    }

    async fn outcome_tokens(&self, instance_id: &str) -> Option<OutcomeTokens> {
        self.tokens.lock().unwrap().get(instance_id).cloned()
    }
}

/// One order that reached the mock venue.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedOrder {
    /// Entrypoint that accepted it.
    pub via: &'static str,
    /// Order fields.
    pub payload: Map<String, Value>,
    /// Fill policy passed to the submit call.
    pub order_type: Option<TimeInForce>,
    /// Id handed back.
    pub order_id: String,
}

impl SubmittedOrder {
    fn text(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Token the order was for.
    pub fn token_id(&self) -> Option<&str> {
        self.text("token_id")
    }

    /// "BUY" or "SELL".
    pub fn side(&self) -> Option<&str> {
        self.text("side")
    }

    /// Limit price.
    pub fn price(&self) -> Option<Decimal> {
        self.text("price").and_then(|p| p.parse().ok())
    }

    /// Share count.
    pub fn size(&self) -> Option<Decimal> {
        self.text("size").and_then(|s| s.parse().ok())
    }
}

#[derive(Debug)]
struct ExchangeState {
    capabilities: Capabilities,
    books: HashMap<String, Value>,
    failing_books: HashSet<String>,
    balance: Option<Decimal>,
    balance_body: Option<Value>,
    fail_create: bool,
    fail_post: bool,
    fail_create_and_post: bool,
    reject_order_type: bool,
    reject_with: Option<String>,
    raw_response: Option<String>,
    status: Option<OrderStatus>,
    submissions: Vec<SubmittedOrder>,
    attempts: Vec<&'static str>,
    book_requests: u64,
}

impl Default for ExchangeState {
    fn default() -> Self {
        Self {
            capabilities: Capabilities::ALL,
            books: HashMap::new(),
            failing_books: HashSet::new(),
            balance: Some(Decimal::new(100, 0)),
            balance_body: None,
            fail_create: false,
            fail_post: false,
            fail_create_and_post: false,
            reject_order_type: false,
            reject_with: None,
            raw_response: None,
            status: Some(OrderStatus::Filled),
            submissions: Vec::new(),
            attempts: Vec::new(),
            book_requests: 0,
        }
    }
}

/// In-memory venue.
///
/// Books are stored as raw JSON so tests can feed any response shape.
/// Orders succeed with ids `mock-order-N` unless a failure is scripted.
#[derive(Debug, Default)]
pub struct MockExchange {
    state: Mutex<ExchangeState>,
    next_id: AtomicU64,
}

impl MockExchange {
    /// Venue with every entrypoint, 100 USDC and no books.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the advertised entrypoints.
    pub fn set_capabilities(&self, capabilities: Capabilities) {
        self.state.lock().unwrap().capabilities = capabilities;
    }

    /// Serve `book` for `token_id`.
    pub fn set_book(&self, token_id: &str, book: Value) {
        let mut state = self.state.lock().unwrap();
        state.failing_books.remove(token_id);
        state.books.insert(token_id.to_string(), book);
    }

    /// Serve a one-level book on each side.
    pub fn set_quote(&self, token_id: &str, ask: Decimal, bid: Decimal) {
        let book = MockOrderBookBuilder::new(token_id)
            .ask(ask, Decimal::new(100, 0))
            .bid(bid, Decimal::new(100, 0))
            .build();
        self.set_book(token_id, book);
    }

    /// Make book requests for `token_id` fail.
    pub fn fail_book(&self, token_id: &str) {
        self.state.lock().unwrap().failing_books.insert(token_id.to_string());
    }

    /// Balance to report; `None` makes the query fail.
    pub fn set_balance(&self, balance: Option<Decimal>) {
        let mut state = self.state.lock().unwrap();
        state.balance = balance;
        state.balance_body = None;
    }

    /// Answer balance queries with a raw `/balance-allowance` body, read the
    /// way the live client reads it.
    pub fn set_balance_response(&self, body: Value) {
        self.state.lock().unwrap().balance_body = Some(body);
    }

    /// Fail `create_market_order` and `create_order`.
    pub fn set_fail_create(&self, fail: bool) {
        self.state.lock().unwrap().fail_create = fail;
    }

    /// Fail every `post_order`.
    pub fn set_fail_post(&self, fail: bool) {
        self.state.lock().unwrap().fail_post = fail;
    }

    /// Fail `create_and_post_order`.
    pub fn set_fail_create_and_post(&self, fail: bool) {
        self.state.lock().unwrap().fail_create_and_post = fail;
    }

    /// Make every order-creating call fail.
    pub fn fail_all_orders(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_create = true;
        state.fail_post = true;
        state.fail_create_and_post = true;
    }

    /// Let orders through again.
    pub fn accept_orders(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_create = false;
        state.fail_post = false;
        state.fail_create_and_post = false;
        state.reject_with = None;
        state.raw_response = None;
    }

    /// Reject `post_order` calls that pass an explicit order type.
    pub fn set_reject_order_type(&self, reject: bool) {
        self.state.lock().unwrap().reject_order_type = reject;
    }

    /// Answer submissions with `{"success": false, "errorMsg": reason}`.
    pub fn set_reject_with(&self, reason: Option<&str>) {
        self.state.lock().unwrap().reject_with = reason.map(str::to_string);
    }

    /// Answer submissions with a raw response body, parsed the way the live
    /// client parses it.
    pub fn set_raw_response(&self, body: Option<&str>) {
        self.state.lock().unwrap().raw_response = body.map(str::to_string);
    }

    /// Status reported for every order; `None` means unknown to the venue.
    pub fn set_status(&self, status: Option<OrderStatus>) {
        self.state.lock().unwrap().status = status;
    }

    /// Orders accepted so far.
    pub fn submissions(&self) -> Vec<SubmittedOrder> {
        self.state.lock().unwrap().submissions.clone()
    }

    /// Accepted orders on one token.
    pub fn submissions_for(&self, token_id: &str) -> Vec<SubmittedOrder> {
        self.submissions()
            .into_iter()
            .filter(|s| s.token_id() == Some(token_id))
            .collect()
    }

    /// Every order entrypoint call, in order, including failed ones.
    pub fn attempts(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().attempts.clone()
    }

    /// Number of book requests served or failed.
    pub fn book_requests(&self) -> u64 {
        self.state.lock().unwrap().book_requests
    }

    fn mock_order(&self, args: &OrderArgs) -> Result<SignedOrder, TradingError> {
        args.validate().map_err(TradingError::InvalidParams)?;
        Ok(SignedOrder {
            payload: args.to_map(),
            signature: "0xmock".to_string(),
            owner: "mock-owner".to_string(),
        })
    }

    fn accept(
        &self,
        state: &mut ExchangeState,
        via: &'static str,
        payload: Map<String, Value>,
        order_type: Option<TimeInForce>,
    ) -> Result<Value, TradingError> {
        if let Some(body) = &state.raw_response {
            return order_response_from_text(body);
        }
        if let Some(reason) = &state.reject_with {
            return Ok(json!({ "success": false, "errorMsg": reason }));
        }
        let order_id = format!("mock-order-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        state.submissions.push(SubmittedOrder {
            via,
            payload,
            order_type,
            order_id: order_id.clone(),
        });
        Ok(json!({ "success": true, "orderID": order_id, "status": "matched" }))
    }
}

#[async_trait]
impl ExecutionApi for MockExchange {
    fn generation(&self) -> &'static str {
        "mock"
    }

    fn capabilities(&self) -> Capabilities {
        self.state.lock().unwrap().capabilities
    }

    async fn balance(&self) -> Result<Decimal, TradingError> {
        let state = self.state.lock().unwrap();
        if let Some(body) = &state.balance_body {
            return balance_from_response(body);
        }
        state
            .balance
            .ok_or_else(|| TradingError::BalanceQueryFailed("mock balance failure".to_string()))
    }

    async fn order_book(&self, token_id: &str) -> Result<Value, MarketError> {
        let mut state = self.state.lock().unwrap();
        state.book_requests += 1;
        if state.failing_books.contains(token_id) {
            return Err(MarketError::FetchFailed {
                resource: token_id.to_string(),
                reason: "mock order book failure".to_string(),
            });
        }
        Ok(state
            .books
            .get(token_id)
            .cloned()
            .unwrap_or_else(|| json!({ "asks": [], "bids": [] })))
    }

    async fn create_market_order(&self, args: &OrderArgs) -> Result<SignedOrder, TradingError> {
        let mut state = self.state.lock().unwrap();
        state.attempts.push("create_market_order");
        if !state.capabilities.market_orders {
            return Err(TradingError::Unsupported("create_market_order"));
        }
        if state.fail_create {
            return Err(TradingError::SubmissionFailed("mock create failure".to_string()));
        }
        self.mock_order(args)
    }

    async fn create_order(&self, args: &OrderArgs) -> Result<SignedOrder, TradingError> {
        let mut state = self.state.lock().unwrap();
        state.attempts.push("create_order");
        if !state.capabilities.limit_orders {
            return Err(TradingError::Unsupported("create_order"));
        }
        if state.fail_create {
            return Err(TradingError::SubmissionFailed("mock create failure".to_string()));
        }
        self.mock_order(args)
    }

    async fn post_order(
        &self,
        order: &SignedOrder,
        order_type: Option<TimeInForce>,
    ) -> Result<Value, TradingError> {
        let mut state = self.state.lock().unwrap();
        state.attempts.push("post_order");
        if !state.capabilities.post_order {
            return Err(TradingError::Unsupported("post_order"));
        }
        if state.reject_order_type && order_type.is_some() {
            return Err(TradingError::InvalidParams(
                "unexpected keyword argument 'orderType'".to_string(),
            ));
        }
        if state.fail_post {
            return Err(TradingError::SubmissionFailed("mock post failure".to_string()));
        }
        self.accept(&mut state, "post_order", order.payload.clone(), order_type)
    }

    async fn create_and_post_order(&self, args: &OrderArgs) -> Result<Value, TradingError> {
        let mut state = self.state.lock().unwrap();
        state.attempts.push("create_and_post_order");
        if !state.capabilities.create_and_post {
            return Err(TradingError::Unsupported("create_and_post_order"));
        }
        if state.fail_create_and_post {
            return Err(TradingError::SubmissionFailed(
                "mock create_and_post failure".to_string(),
            ));
        }
        args.validate().map_err(TradingError::InvalidParams)?;
        self.accept(&mut state, "create_and_post_order", args.to_map(), Some(args.order_type))
    }

    async fn order_status(&self, order_id: &str) -> Result<Option<OrderState>, TradingError> {
        let status = self.state.lock().unwrap().status;
        Ok(status.map(|status| OrderState {
            order_id: order_id.to_string(),
            status: Some(status),
            ..Default::default()
        }))
    }

    async fn cancel(&self, order_id: &str) -> Result<bool, TradingError> {
        let state = self.state.lock().unwrap();
        Ok(state.submissions.iter().any(|s| s.order_id == order_id))
    }
}

/// Builder for JSON order books in the venue's usual shape.
pub struct MockOrderBookBuilder {
    token_id: String,
    bids: Vec<(Decimal, Decimal)>,
    asks: Vec<(Decimal, Decimal)>,
}

impl MockOrderBookBuilder {
    /// Create a new builder for the given token.
    pub fn new(token_id: impl Into<String>) -> Self {
        Self {
            token_id: token_id.into(),
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }

    /// Add a bid level.
    pub fn bid(mut self, price: Decimal, size: Decimal) -> Self {
        self.bids.push((price, size));
        self
    }

    /// Add an ask level.
    pub fn ask(mut self, price: Decimal, size: Decimal) -> Self {
        self.asks.push((price, size));
        self
    }

    /// Two levels each side around the given top of book.
    pub fn with_spread(mut self, best_bid: Decimal, best_ask: Decimal, depth: Decimal) -> Self {
        let tick = Decimal::new(1, 2);
        self.bids = vec![(best_bid, depth), (best_bid - tick, depth * Decimal::TWO)];
        self.asks = vec![(best_ask, depth), (best_ask + tick, depth * Decimal::TWO)];
        self
    }

    /// Render as `{"asset_id", "bids", "asks"}` with string levels. The venue
    /// lists bids ascending and asks descending, so the best level is last.
    pub fn build(mut self) -> Value {
        self.bids.sort_by(|a, b| a.0.cmp(&b.0));
        self.asks.sort_by(|a, b| b.0.cmp(&a.0));
        let render = |levels: &[(Decimal, Decimal)]| -> Vec<Value> {
            levels
                .iter()
                .map(|(price, size)| json!({ "price": price.to_string(), "size": size.to_string() }))
                .collect()
        };
        json!({
            "asset_id": self.token_id,
            "bids": render(&self.bids),
            "asks": render(&self.asks),
        })
    }
}
