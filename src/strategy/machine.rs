//! The trading state machine.
//!
//! One owner holds the market, token mapping, positions, buy guard and stats;
//! every mutation happens inside `&mut self` methods driven by a single
//! polling loop, so the guard-then-order sequence can never interleave.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use strum::Display;
use tracing::{debug, error, info, instrument, warn};

use super::decision::{decide, Action, DecisionInput};
use crate::config::Config;
use crate::error::{BotError, MarketError, TradingError};
use crate::market::{ExecutionApi, MarketDescriptor, MarketDirectory, Outcome, OutcomeTokens};
use crate::metrics;
use crate::orderbook::PriceFeed;
use crate::trading::{
    BuyGuard, OrderRouter, Position, PositionBook, RunningStats, Side, TimeInForce,
};

/// Lifecycle of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BotState {
    /// Nothing resolved yet.
    Uninitialized,
    /// Looking up the first market.
    Discovering,
    /// Market and tokens resolved, loop not started.
    Active,
    /// Evaluating tokens.
    Scanning,
    /// Checking for, or switching to, a new market.
    Rolling,
    /// Loop exited on shutdown.
    Stopped,
}

/// Tunables for the machine, usually taken from [`Config`].
#[derive(Debug, Clone)]
pub struct MachineSettings {
    /// Buy when best ask is at or below this.
    pub buy_price: Decimal,
    /// Sell when best bid is at or above this.
    pub sell_price: Decimal,
    /// Shares per buy.
    pub order_size: Decimal,
    /// Fill policy for every order.
    pub fill_policy: TimeInForce,
    /// Simulate orders.
    pub dry_run: bool,
    /// Pause between iterations.
    pub scan_interval: Duration,
    /// Minimum time between rollover checks.
    pub rollover_check_interval: Duration,
    /// Status report every this many iterations.
    pub status_every: u64,
    /// Consecutive feed failures that force re-discovery.
    pub max_feed_failures: u32,
    /// Pause between order acceptance and the status read.
    pub settle_delay: Duration,
}

impl MachineSettings {
    /// Settings from validated configuration.
    pub fn from_config(config: &Config) -> Result<Self, BotError> {
        Ok(Self {
            buy_price: config.buy_price,
            sell_price: config.sell_price,
            order_size: config.order_size,
            fill_policy: config.time_in_force().map_err(BotError::InvalidConfig)?,
            dry_run: config.dry_run,
            scan_interval: Duration::from_millis(config.scan_interval_ms),
            rollover_check_interval: Duration::from_secs(config.rollover_check_secs),
            status_every: config.status_every.max(1),
            max_feed_failures: config.max_feed_failures.max(1),
            settle_delay: Duration::from_millis(config.settle_delay_ms),
        })
    }

    /// Cash needed for one buy at the threshold.
    pub fn min_required_balance(&self) -> Decimal {
        self.order_size * self.buy_price
    }
}

/// Snapshot for operator status output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Machine state.
    pub state: BotState,
    /// Current slot, if resolved.
    pub slot_id: Option<String>,
    /// Time left in the current slot.
    pub time_remaining: Option<String>,
    /// Iterations run.
    pub iterations: u64,
    /// Open positions.
    pub open_positions: usize,
    /// Cost basis of open positions.
    pub open_cost: Decimal,
    /// Current consecutive feed failures.
    pub feed_failures: u32,
    /// Running totals.
    pub stats: RunningStats,
}

/// Market lifecycle, positions and the scan/decide/act loop.
pub struct TradingStateMachine {
    settings: MachineSettings,
    directory: Arc<dyn MarketDirectory>,
    api: Arc<dyn ExecutionApi>,
    feed: PriceFeed,
    router: OrderRouter,
    state: BotState,
    market: Option<MarketDescriptor>,
    tokens: Option<OutcomeTokens>,
    positions: PositionBook,
    guard: BuyGuard,
    stats: RunningStats,
    feed_failures: u32,
    last_rollover_check: Option<Instant>,
    iterations: u64,
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl TradingStateMachine {
    /// Machine over the given collaborators with the default order router.
    pub fn new(
        settings: MachineSettings,
        directory: Arc<dyn MarketDirectory>,
        api: Arc<dyn ExecutionApi>,
    ) -> Self {
        let router = OrderRouter::new(api.clone(), settings.dry_run);
        Self::with_router(settings, directory, api, router)
    }

    /// Machine with a custom order router.
    pub fn with_router(
        settings: MachineSettings,
        directory: Arc<dyn MarketDirectory>,
        api: Arc<dyn ExecutionApi>,
        router: OrderRouter,
    ) -> Self {
        Self {
            feed: PriceFeed::new(api.clone()),
            settings,
            directory,
            api,
            router,
            state: BotState::Uninitialized,
            market: None,
            tokens: None,
            positions: PositionBook::new(),
            guard: BuyGuard::new(),
            stats: RunningStats::default(),
            feed_failures: 0,
            last_rollover_check: None,
            iterations: 0,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BotState {
        self.state
    }

    /// Current market.
    pub fn market(&self) -> Option<&MarketDescriptor> {
        self.market.as_ref()
    }

    /// Token mapping for the current market.
    pub fn tokens(&self) -> Option<&OutcomeTokens> {
        self.tokens.as_ref()
    }

    /// Open positions.
    pub fn positions(&self) -> &PositionBook {
        &self.positions
    }

    /// Buy guard.
    pub fn guard(&self) -> &BuyGuard {
        &self.guard
    }

    /// Running totals.
    pub fn stats(&self) -> &RunningStats {
        &self.stats
    }

    /// Consecutive price feed failures.
    pub fn feed_failures(&self) -> u32 {
        self.feed_failures
    }

    /// Settings in use.
    pub fn settings(&self) -> &MachineSettings {
        &self.settings
    }

    /// Resolve the first market and its tokens.
    ///
    /// Either lookup failing aborts startup; there is no retry here.
    #[instrument(skip(self))]
    pub async fn initialize(&mut self) -> Result<(), MarketError> {
        self.state = BotState::Discovering;
        let now = unix_now();

        let market = self
            .directory
            .find_current_market(now)
            .await
            .ok_or(MarketError::MarketUnavailable)?;
        let tokens = self
            .directory
            .outcome_tokens(&market.instance_id)
            .await
            .ok_or_else(|| MarketError::ConditionsUnavailable {
                instance_id: market.instance_id.clone(),
            })?;

        info!(
            slot = %market.slot_id,
            label = %market.label,
            live = market.is_live,
            remaining = %market.time_remaining_str(now),
            up = %tokens.up,
            down = %tokens.down,
            "Market found"
        );

        self.market = Some(market);
        self.tokens = Some(tokens);
        self.last_rollover_check = Some(Instant::now());
        self.state = BotState::Active;
        Ok(())
    }

    /// Read the collateral balance.
    ///
    /// A failed query is logged and reported as zero. In live mode a balance
    /// that was read and is below one order's cost is an error.
    pub async fn ensure_balance(&self) -> Result<Decimal, TradingError> {
        let required = self.settings.min_required_balance();
        match self.api.balance().await {
            Err(e) => {
                warn!(error = %e, "Balance query failed, treating as 0");
                Ok(Decimal::ZERO)
            }
            Ok(available) if !self.settings.dry_run && available < required => {
                Err(TradingError::InsufficientBalance {
                    required,
                    available,
                })
            }
            Ok(available) => {
                info!(balance = %available, required = %required, "USDC balance");
                Ok(available)
            }
        }
    }

    /// Switch to a new market if the slot changed.
    ///
    /// Rate-limited to one directory query per check interval unless the
    /// price feed has failed `max_feed_failures` times in a row. Returns
    /// whether a switch happened.
    pub async fn check_rollover(&mut self) -> bool {
        let forced = self.feed_failures >= self.settings.max_feed_failures;
        if !forced {
            if let Some(last) = self.last_rollover_check {
                if last.elapsed() < self.settings.rollover_check_interval {
                    return false;
                }
            }
        }
        self.last_rollover_check = Some(Instant::now());

        if forced {
            warn!(failures = self.feed_failures, "Price feed failing, forcing market re-discovery");
            self.feed_failures = 0;
        }

        let previous = self.state;
        self.state = BotState::Rolling;
        let switched = self.switch_if_new_slot().await;
        self.state = match previous {
            BotState::Rolling => BotState::Scanning,
            other => other,
        };
        switched
    }

    async fn switch_if_new_slot(&mut self) -> bool {
        let Some(latest) = self.directory.find_current_market(unix_now()).await else {
            debug!("No market from directory, keeping current");
            return false;
        };
        if self.market.as_ref().map(|m| m.slot_id.as_str()) == Some(latest.slot_id.as_str()) {
            return false;
        }

        let Some(tokens) = self.directory.outcome_tokens(&latest.instance_id).await else {
            warn!(slot = %latest.slot_id, "New market has no tokens yet, staying on current");
            return false;
        };

        let abandoned = self.positions.clear();
        for position in &abandoned {
            warn!(
                token_id = %position.token_id,
                outcome = %position.outcome,
                size = %position.size,
                entry = %position.entry_price,
                slot = %position.slot_id,
                "Abandoning unsold position at rollover"
            );
        }
        if !abandoned.is_empty() {
            self.stats.abandoned_positions += abandoned.len() as u64;
            metrics::inc_abandoned_positions(abandoned.len() as u64);
        }

        info!(
            from = self.market.as_ref().map(|m| m.slot_id.as_str()).unwrap_or("-"),
            to = %latest.slot_id,
            up = %tokens.up,
            down = %tokens.down,
            "Market rollover"
        );
        metrics::inc_rollovers();

        self.market = Some(latest);
        self.tokens = Some(tokens);
        self.feed_failures = 0;
        true
    }

    /// Evaluate UP then DOWN once.
    pub async fn scan_once(&mut self) {
        let Some(tokens) = self.tokens.clone() else {
            return;
        };
        for (outcome, token_id) in tokens.pairs() {
            self.decide_and_act(token_id, outcome).await;
        }
    }

    /// Fetch a fresh quote for one token and apply the buy/sell rule.
    pub async fn decide_and_act(&mut self, token_id: &str, outcome: Outcome) -> Action {
        let quote = match self.feed.quote(token_id).await {
            Ok(quote) => {
                self.feed_failures = 0;
                quote
            }
            Err(e) => {
                self.feed_failures += 1;
                metrics::inc_feed_failures();
                debug!(outcome = %outcome, error = %e, failures = self.feed_failures, "No quote");
                return Action::Hold;
            }
        };

        let Some(slot_id) = self.market.as_ref().map(|m| m.slot_id.clone()) else {
            return Action::Hold;
        };

        debug!(outcome = %outcome, ask = %quote.ask, bid = %quote.bid, "Quote");

        let action = decide(
            DecisionInput {
                best_ask: quote.ask,
                best_bid: quote.bid,
                holding: self.positions.contains(token_id),
                guard_consumed: self.guard.is_consumed(&slot_id, outcome),
            },
            self.settings.buy_price,
            self.settings.sell_price,
        );

        match action {
            Action::Hold => {}
            Action::Buy { limit, reference } => {
                self.buy(token_id, outcome, &slot_id, limit, reference).await;
            }
            Action::Sell { limit, reference } => {
                self.sell(token_id, limit, reference).await;
            }
        }
        action
    }

    async fn buy(
        &mut self,
        token_id: &str,
        outcome: Outcome,
        slot_id: &str,
        limit: Decimal,
        ask: Decimal,
    ) {
        // Consumed before the order goes out, whatever the result.
        if !self.guard.try_consume(slot_id, outcome) {
            return;
        }

        info!(outcome = %outcome, ask = %ask, limit = %limit, size = %self.settings.order_size, "BUY signal");
        let result = self
            .router
            .place_order(
                token_id,
                Side::Buy,
                limit,
                self.settings.order_size,
                self.settings.fill_policy,
            )
            .await;

        let Some(order_id) = self.confirm(result).await else {
            self.stats.failed_buys += 1;
            error!(outcome = %outcome, slot = %slot_id, "Buy failed, no retry this slot");
            return;
        };

        let position = Position {
            token_id: token_id.to_string(),
            outcome,
            entry_price: ask,
            size: self.settings.order_size,
            order_id,
            slot_id: slot_id.to_string(),
        };
        let cost = position.cost_basis();
        match self.positions.open(position) {
            Ok(()) => {
                if let Some(position) = self.positions.get(token_id) {
                    self.stats.record_buy(position);
                }
                info!(outcome = %outcome, entry = %ask, cost = %cost, "Position opened");
            }
            Err(rejected) => {
                error!(token_id = %rejected.token_id, "Position already open, buy not recorded");
            }
        }
    }

    async fn sell(&mut self, token_id: &str, limit: Decimal, bid: Decimal) {
        let Some(position) = self.positions.get(token_id).cloned() else {
            return;
        };

        info!(outcome = %position.outcome, bid = %bid, limit = %limit, entry = %position.entry_price, "SELL signal");
        let result = self
            .router
            .place_order(
                token_id,
                Side::Sell,
                limit,
                position.size,
                self.settings.fill_policy,
            )
            .await;

        if self.confirm(result).await.is_none() {
            self.stats.failed_sells += 1;
            warn!(outcome = %position.outcome, "Sell failed, keeping position for retry");
            return;
        }

        self.positions.close(token_id);
        let profit = self.stats.record_sell(&position, bid);
        info!(
            outcome = %position.outcome,
            entry = %position.entry_price,
            exit = %bid,
            profit = %profit,
            total_profit = %self.stats.total_profit,
            "Position closed"
        );
    }

    /// Turn a placement result into an order id, waiting the settle delay
    /// and dropping orders the venue reports as killed.
    async fn confirm(&self, result: Result<String, TradingError>) -> Option<String> {
        let order_id = match result {
            Ok(order_id) => order_id,
            Err(e) => {
                error!(error = %e, "Order placement failed");
                return None;
            }
        };

        tokio::time::sleep(self.settings.settle_delay).await;

        match self.router.order_status(&order_id).await {
            Ok(Some(state)) if state.is_dead() => {
                warn!(order_id = %order_id, status = ?state.status, "Order not filled");
                None
            }
            Ok(state) => {
                debug!(order_id = %order_id, status = ?state.and_then(|s| s.status), "Order status");
                Some(order_id)
            }
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "Order status unavailable, assuming submitted");
                Some(order_id)
            }
        }
    }

    /// One loop iteration: rollover check, scan, periodic status.
    pub async fn iterate(&mut self) {
        self.iterations += 1;
        self.check_rollover().await;
        self.state = BotState::Scanning;
        self.scan_once().await;
        if self.iterations % self.settings.status_every == 0 {
            self.log_status();
        }
    }

    /// Run until `shutdown` resolves.
    ///
    /// Shutdown is observed between iterations, so an iteration in progress
    /// always completes. A final status report is logged on exit.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<(), MarketError>
    where
        F: Future<Output = ()>,
    {
        if self.state == BotState::Uninitialized {
            self.initialize().await?;
        }

        info!(
            buy_price = %self.settings.buy_price,
            sell_price = %self.settings.sell_price,
            size = %self.settings.order_size,
            fill_policy = %self.settings.fill_policy,
            dry_run = self.settings.dry_run,
            "Trading loop started"
        );

        tokio::pin!(shutdown);
        loop {
            self.iterate().await;

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = tokio::time::sleep(self.settings.scan_interval) => {}
            }
        }

        self.state = BotState::Stopped;
        self.log_status();
        Ok(())
    }

    /// Current status snapshot.
    pub fn status_report(&self) -> StatusReport {
        let now = unix_now();
        StatusReport {
            state: self.state,
            slot_id: self.market.as_ref().map(|m| m.slot_id.clone()),
            time_remaining: self.market.as_ref().map(|m| m.time_remaining_str(now)),
            iterations: self.iterations,
            open_positions: self.positions.len(),
            open_cost: self.positions.total_cost_basis(),
            feed_failures: self.feed_failures,
            stats: self.stats.clone(),
        }
    }

    /// Log the status snapshot and each open position.
    pub fn log_status(&self) {
        let report = self.status_report();
        info!(
            state = %report.state,
            slot = report.slot_id.as_deref().unwrap_or("-"),
            remaining = report.time_remaining.as_deref().unwrap_or("-"),
            iterations = report.iterations,
            open_positions = report.open_positions,
            buys = report.stats.total_buys,
            sells = report.stats.total_sells,
            failed_buys = report.stats.failed_buys,
            failed_sells = report.stats.failed_sells,
            abandoned = report.stats.abandoned_positions,
            invested = %report.stats.total_invested,
            profit = %report.stats.total_profit,
            "Status"
        );
        for position in self.positions.iter() {
            info!(
                outcome = %position.outcome,
                entry = %position.entry_price,
                size = %position.size,
                order_id = %position.order_id,
                "Open position"
            );
        }
    }
}
