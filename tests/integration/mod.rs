//! Integration tests for the Polymarket swing bot.
//!
//! Most tests drive the state machine against the in-memory venue and market
//! directory. Tests marked `#[ignore]` talk to the real Polymarket APIs and
//! need a valid POLYMARKET_PRIVATE_KEY environment variable.
//! Run those with: cargo test --test integration -- --ignored

use std::sync::Arc;
use std::time::Duration;

use polymarket_swing::config::Config;
use polymarket_swing::market::mock::{mock_descriptor, mock_tokens};
use polymarket_swing::market::{
    connect, Capabilities, ExecutionApi, GammaDirectory, MarketDirectory, MockDirectory,
    MockExchange, Outcome,
};
use polymarket_swing::strategy::{BotState, MachineSettings, TradingStateMachine};
use polymarket_swing::trading::{OrderRouter, Side, TimeInForce};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const SLOT: i64 = 1_765_301_400;
const TEST_KEY: &str = "0x0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

fn settings(dry_run: bool) -> MachineSettings {
    MachineSettings {
        buy_price: dec!(0.80),
        sell_price: dec!(0.90),
        order_size: dec!(5),
        fill_policy: TimeInForce::FOK,
        dry_run,
        scan_interval: Duration::ZERO,
        rollover_check_interval: Duration::ZERO,
        status_every: 5,
        max_feed_failures: 8,
        settle_delay: Duration::ZERO,
    }
}

async fn started(
    dry_run: bool,
) -> (Arc<MockDirectory>, Arc<MockExchange>, TradingStateMachine) {
    let directory = Arc::new(MockDirectory::with_slot(SLOT));
    let exchange = Arc::new(MockExchange::new());
    let mut machine =
        TradingStateMachine::new(settings(dry_run), directory.clone(), exchange.clone());
    machine.initialize().await.unwrap();
    (directory, exchange, machine)
}

/// Get a live config from environment.
fn live_config() -> Option<Config> {
    dotenvy::dotenv().ok();

    let private_key = std::env::var("POLYMARKET_PRIVATE_KEY").ok()?;

    // Skip if using placeholder key
    if private_key.starts_with("0x1234") || private_key.len() < 64 {
        return None;
    }

    let mut config = Config::load().ok()?;
    config.dry_run = true;
    Some(config)
}

#[tokio::test]
async fn cheap_ask_buys_once_per_slot() {
    let (_, exchange, mut machine) = started(false).await;
    let tokens = mock_tokens(SLOT);
    exchange.set_quote(&tokens.up, dec!(0.78), dec!(0.76));
    exchange.set_quote(&tokens.down, dec!(0.85), dec!(0.84));

    for _ in 0..20 {
        machine.iterate().await;
    }

    let up_orders = exchange.submissions_for(&tokens.up);
    assert_eq!(up_orders.len(), 1);
    assert_eq!(up_orders[0].side(), Some("BUY"));
    assert_eq!(up_orders[0].price(), Some(dec!(0.785)));
    assert!(exchange.submissions_for(&tokens.down).is_empty());
    assert_eq!(machine.positions().len(), 1);
    assert_eq!(machine.stats().total_buys, 1);
}

#[tokio::test]
async fn failed_buy_is_never_retried_in_the_same_slot() {
    let (_, exchange, mut machine) = started(false).await;
    let tokens = mock_tokens(SLOT);
    exchange.fail_all_orders();
    exchange.set_quote(&tokens.up, dec!(0.70), dec!(0.69));

    machine.iterate().await;
    let attempts_after_first = exchange.attempts().len();
    assert!(attempts_after_first > 0);

    exchange.accept_orders();
    for _ in 0..10 {
        machine.iterate().await;
    }

    assert_eq!(exchange.attempts().len(), attempts_after_first);
    assert!(exchange.submissions().is_empty());
    assert_eq!(machine.stats().failed_buys, 1);
}

#[tokio::test]
async fn swing_round_trip_books_profit() {
    let (_, exchange, mut machine) = started(false).await;
    let up = mock_tokens(SLOT).up;

    exchange.set_quote(&up, dec!(0.78), dec!(0.76));
    machine.iterate().await;
    assert_eq!(machine.positions().get(&up).map(|p| p.entry_price), Some(dec!(0.78)));

    // bid below the sell threshold holds
    exchange.set_quote(&up, dec!(0.89), dec!(0.88));
    machine.iterate().await;
    assert_eq!(machine.positions().len(), 1);

    exchange.set_quote(&up, dec!(0.93), dec!(0.92));
    machine.iterate().await;
    assert!(machine.positions().is_empty());

    let sells: Vec<_> = exchange
        .submissions_for(&up)
        .into_iter()
        .filter(|s| s.side() == Some("SELL"))
        .collect();
    assert_eq!(sells.len(), 1);
    assert_eq!(sells[0].price(), Some(dec!(0.915)));
    assert_eq!(sells[0].size(), Some(dec!(5)));

    // the slot's buy is spent even after the position closed
    exchange.set_quote(&up, dec!(0.78), dec!(0.76));
    machine.iterate().await;
    assert_eq!(exchange.submissions_for(&up).len(), 2);

    let stats = machine.stats();
    assert_eq!(stats.total_profit, dec!(0.70));
    assert_eq!(stats.total_invested, dec!(3.90));
}

#[tokio::test]
async fn rollover_abandons_positions_and_trades_the_new_slot() {
    let (directory, exchange, mut machine) = started(false).await;
    let old = mock_tokens(SLOT);
    exchange.set_quote(&old.up, dec!(0.70), dec!(0.69));
    machine.iterate().await;
    assert_eq!(machine.positions().len(), 1);

    let next = SLOT + 900;
    let new = mock_tokens(next);
    directory.set_slot(next);
    exchange.set_quote(&new.up, dec!(0.75), dec!(0.74));
    machine.iterate().await;

    assert_eq!(machine.market().map(|m| m.slot_id.clone()), Some(mock_descriptor(next).slot_id));
    assert_eq!(machine.stats().abandoned_positions, 1);
    assert!(!machine.positions().contains(&old.up));
    assert!(machine.positions().contains(&new.up));
    // no sell was sent for the abandoned position
    assert!(exchange
        .submissions()
        .iter()
        .all(|s| s.side() == Some("BUY")));
}

#[tokio::test]
async fn legacy_venue_retries_without_order_type() {
    let exchange = Arc::new(MockExchange::new());
    exchange.set_capabilities(Capabilities {
        market_orders: false,
        ..Capabilities::ALL
    });
    exchange.set_reject_order_type(true);
    let router = OrderRouter::new(exchange.clone(), false);

    let order_id = router
        .place_order("up-1", Side::Buy, dec!(0.785), dec!(5), TimeInForce::FOK)
        .await
        .unwrap();

    assert_eq!(order_id, "mock-order-1");
    assert_eq!(exchange.attempts(), vec!["create_order", "post_order", "post_order"]);
    assert_eq!(exchange.submissions()[0].order_type, None);
}

#[tokio::test]
async fn broken_post_falls_through_to_create_and_post() {
    let exchange = Arc::new(MockExchange::new());
    exchange.set_fail_post(true);
    let router = OrderRouter::new(exchange.clone(), false);

    router
        .place_order("down-1", Side::Sell, dec!(0.915), dec!(5), TimeInForce::FAK)
        .await
        .unwrap();

    assert_eq!(
        exchange.attempts(),
        vec![
            "create_market_order",
            "post_order",
            "post_order",
            "create_order",
            "post_order",
            "post_order",
            "create_and_post_order",
        ]
    );
    assert_eq!(exchange.submissions()[0].via, "create_and_post_order");
}

#[tokio::test]
async fn venue_rejection_counts_as_failed_buy() {
    let (_, exchange, mut machine) = started(false).await;
    let up = mock_tokens(SLOT).up;
    exchange.set_reject_with(Some("not enough balance / allowance"));
    exchange.set_quote(&up, dec!(0.70), dec!(0.69));

    machine.iterate().await;

    assert!(machine.positions().is_empty());
    assert_eq!(machine.stats().failed_buys, 1);
    assert_eq!(machine.stats().total_buys, 0);
}

#[tokio::test]
async fn dry_run_tracks_positions_without_sending_orders() {
    let directory = Arc::new(MockDirectory::with_slot(SLOT));
    let exchange = Arc::new(MockExchange::new());
    let up = mock_tokens(SLOT).up;
    exchange.set_quote(&up, dec!(0.78), dec!(0.76));
    exchange.set_balance(Some(Decimal::ZERO));

    let mut machine = TradingStateMachine::new(settings(true), directory, exchange.clone());
    machine.initialize().await.unwrap();
    // an empty wallet is fine when simulating
    assert_eq!(machine.ensure_balance().await.unwrap(), Decimal::ZERO);

    machine.run(std::future::ready(())).await.unwrap();

    assert_eq!(machine.state(), BotState::Stopped);
    assert!(exchange.attempts().is_empty());
    let position = machine.positions().get(&up).unwrap();
    assert!(position.order_id.starts_with("dry-run-"));
    assert_eq!(position.outcome, Outcome::Up);
}

#[tokio::test]
async fn run_without_market_fails_startup() {
    let directory = Arc::new(MockDirectory::new());
    let exchange = Arc::new(MockExchange::new());
    let mut machine = TradingStateMachine::new(settings(true), directory, exchange);

    assert!(machine.run(std::future::pending::<()>()).await.is_err());
    assert_eq!(machine.state(), BotState::Discovering);
}

#[tokio::test]
async fn dry_run_cancel_never_reaches_the_venue() {
    let exchange = Arc::new(MockExchange::new());
    let router = OrderRouter::new(exchange.clone(), true);
    assert!(router.cancel("unknown").await.unwrap());

    let live = OrderRouter::new(exchange, false);
    assert!(!live.cancel("unknown").await.unwrap());
}

#[test]
fn settings_follow_configuration() {
    let config = Config::from_pairs([
        ("POLYMARKET_PRIVATE_KEY", TEST_KEY),
        ("BUY_PRICE", "0.75"),
        ("SELL_PRICE", "0.95"),
        ("ORDER_SIZE", "10"),
        ("ORDER_TYPE", "gtc"),
        ("SCAN_INTERVAL_MS", "250"),
    ])
    .unwrap();
    config.validate().unwrap();

    let settings = MachineSettings::from_config(&config).unwrap();
    assert_eq!(settings.buy_price, dec!(0.75));
    assert_eq!(settings.sell_price, dec!(0.95));
    assert_eq!(settings.fill_policy, TimeInForce::GTC);
    assert_eq!(settings.scan_interval, Duration::from_millis(250));
    assert_eq!(settings.min_required_balance(), dec!(7.50));
}

/// Test that we can connect and query the balance.
#[tokio::test]
#[ignore = "requires POLYMARKET_PRIVATE_KEY"]
async fn test_connect_and_balance() {
    let config = match live_config() {
        Some(c) => c,
        None => {
            println!("Skipping: POLYMARKET_PRIVATE_KEY not set or invalid");
            return;
        }
    };

    let api = connect(&config).await.unwrap();
    println!("API generation: {}", api.generation());

    let balance = api.balance().await;
    assert!(balance.is_ok(), "Failed to get balance: {:?}", balance.err());
    assert!(balance.unwrap() >= Decimal::ZERO);
}

/// Test market discovery against the Gamma API.
#[tokio::test]
#[ignore = "requires network access"]
async fn test_market_discovery() {
    let directory = GammaDirectory::with_endpoint(
        polymarket_swing::config::DEFAULT_GAMMA_URL,
        polymarket_swing::config::DEFAULT_SLUG_PREFIX,
        Duration::from_secs(30),
    )
    .unwrap();

    let now = chrono::Utc::now().timestamp();
    match directory.find_current_market(now).await {
        Some(market) => {
            println!("Found market: {} live={}", market.slot_id, market.is_live);
            let tokens = directory.outcome_tokens(&market.instance_id).await;
            println!("Tokens: {:?}", tokens);
        }
        None => println!("No live or upcoming market found"),
    }
}
