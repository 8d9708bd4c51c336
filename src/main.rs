//! BTC 15-minute Polymarket swing bot entry point.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use polymarket_swing::config::{Config, DEFAULT_GAMMA_URL, DEFAULT_SLUG_PREFIX};
use polymarket_swing::market::{
    connect, ExecutionApi, GammaDirectory, MarketDirectory, Outcome, PolymarketClient,
};
use polymarket_swing::metrics;
use polymarket_swing::orderbook::PriceFeed;
use polymarket_swing::signing::wallet_info;
use polymarket_swing::strategy::{MachineSettings, TradingStateMachine};
use polymarket_swing::trading::OrderRouter;
use polymarket_swing::utils::{short_id, shutdown_signal};

const RULE: &str = "======================================================================";
const THIN_RULE: &str = "----------------------------------------------------------------------";

/// BTC 15-minute Polymarket swing bot.
#[derive(Parser, Debug)]
#[command(name = "polymarket-swing")]
#[command(about = "Buy-low / sell-high bot for BTC 15-minute markets on Polymarket")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true, env = "VERBOSE")]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,

    /// Run in dry-run mode (no real orders).
    #[arg(long)]
    dry_run: Option<bool>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the trading loop (default).
    Run {
        /// Run in dry-run mode (no real orders).
        #[arg(long)]
        dry_run: Option<bool>,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Check wallet balance and API generation.
    CheckBalance,

    /// Create (or derive) L2 API credentials for the configured wallet.
    GenerateApiKey,

    /// Discover the current BTC 15min market.
    DiscoverMarket,

    /// Show the top of an outcome token's order book.
    Book {
        /// Outcome token id.
        token_id: String,

        /// Levels per side.
        #[arg(long, default_value = "5")]
        depth: usize,
    },

    /// Cancel an order by id.
    Cancel {
        /// Venue order id.
        order_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG may live in .env
    dotenvy::dotenv().ok();

    let filter = if args.verbose {
        EnvFilter::new("polymarket_swing=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config().await,
        Some(Command::CheckBalance) => cmd_check_balance().await,
        Some(Command::GenerateApiKey) => cmd_generate_api_key().await,
        Some(Command::DiscoverMarket) => cmd_discover_market().await,
        Some(Command::Book { token_id, depth }) => cmd_book(&token_id, depth).await,
        Some(Command::Cancel { order_id }) => cmd_cancel(&order_id).await,
        Some(Command::Run { dry_run }) => cmd_run(dry_run.or(args.dry_run)).await,
        None => cmd_run(args.dry_run).await,
    }
}

fn load_validated() -> anyhow::Result<Config> {
    let config = Config::load()?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;
    Ok(config)
}

/// Check configuration validity.
async fn cmd_check_config() -> anyhow::Result<()> {
    println!("{RULE}");
    println!("BTC 15M SWING BOT - CONFIGURATION CHECK");
    println!("{RULE}");

    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    print!("Checking private key... ");
    let wallet = match wallet_info(&config) {
        Ok(w) => {
            println!("OK");
            w
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Private key invalid"));
        }
    };

    println!("{THIN_RULE}");
    println!("Configuration Summary:");
    println!("  Signer Address: {}", wallet.signer);
    println!(
        "  Signature Type: {} ({})",
        config.polymarket_signature_type, wallet.label
    );
    if config.is_magic_link() && config.polymarket_funder.is_none() {
        println!("  WARNING: Magic.link requires POLYMARKET_FUNDER to be set!");
    } else {
        println!("  Funder Address: {}", wallet.funder);
    }
    println!(
        "  API Credentials: {}",
        if config.has_api_creds() { "provided (L2 HMAC)" } else { "not set (L1 wallet signatures)" }
    );
    println!("  CLOB Host: {}", config.polymarket_host);
    println!("  Gamma Host: {}", config.gamma_api_url);
    println!("  Market Series: {}", config.market_slug_prefix);
    println!("  Buy Price: <= ${}", config.buy_price);
    println!("  Sell Price: >= ${}", config.sell_price);
    println!("  Order Size: {} shares", config.order_size);
    println!("  Order Type: {}", config.order_type);
    println!("  Min Balance: ${}", config.min_required_balance());
    println!("  Dry Run: {}", config.dry_run);
    println!("  Scan Interval: {}ms", config.scan_interval_ms);
    println!("  Rollover Check: {}s", config.rollover_check_secs);
    println!("  Log Level: {}", config.rust_log);
    match config.metrics_port {
        Some(port) => println!("  Metrics: :{}", port),
        None => println!("  Metrics: Disabled"),
    }
    println!("{RULE}");
    println!("CONFIGURATION CHECK PASSED");
    println!("{RULE}");

    Ok(())
}

/// Check wallet balance and API generation.
async fn cmd_check_balance() -> anyhow::Result<()> {
    println!("{RULE}");
    println!("BTC 15M SWING BOT - BALANCE CHECK");
    println!("{RULE}");

    let config = load_validated()?;
    let wallet = wallet_info(&config)?;

    println!("Host: {}", config.polymarket_host);
    println!("Signature Type: {} ({})", config.polymarket_signature_type, wallet.label);
    println!("Signer: {}", wallet.signer);
    println!("Funder: {}", wallet.funder);
    println!("{RULE}");

    print!("\n1. Connecting to CLOB... ");
    let api = connect(&config).await?;
    println!("OK");
    println!("   API generation: {}", api.generation());

    print!("\n2. Getting USDC balance... ");
    match api.balance().await {
        Ok(balance) => {
            println!("OK");
            println!("   USDC Balance: ${:.6}", balance);
            let required = config.min_required_balance();
            if balance < required {
                println!("   WARNING: below ${} needed for one order", required);
            }
        }
        Err(e) => {
            println!("FAILED");
            println!("   Error: {}", e);
        }
    }

    println!("\n{RULE}");
    println!("BALANCE CHECK COMPLETED");
    println!("{RULE}");

    Ok(())
}

/// Create or derive L2 API credentials and print them as .env lines.
async fn cmd_generate_api_key() -> anyhow::Result<()> {
    println!("{RULE}");
    println!("BTC 15M SWING BOT - API KEY GENERATION");
    println!("{RULE}");

    let config = load_validated()?;
    let wallet = wallet_info(&config)?;
    println!("Signer: {}", wallet.signer);

    print!("\nRequesting API credentials... ");
    let client = PolymarketClient::new(&config)?;
    let creds = match client.create_api_key().await {
        Ok(creds) => {
            println!("OK");
            creds
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("API key generation failed"));
        }
    };

    println!("\nAdd these to your .env:");
    println!("{THIN_RULE}");
    println!("POLYMARKET_API_KEY={}", creds.api_key);
    println!("POLYMARKET_API_SECRET={}", creds.secret);
    println!("POLYMARKET_API_PASSPHRASE={}", creds.passphrase);
    println!("{RULE}");

    Ok(())
}

/// Discover the current BTC 15min market.
async fn cmd_discover_market() -> anyhow::Result<()> {
    println!("{RULE}");
    println!("BTC 15M SWING BOT - MARKET DISCOVERY");
    println!("{RULE}");

    // Discovery needs no wallet, so a missing key falls back to defaults.
    let directory = match Config::load() {
        Ok(config) => GammaDirectory::new(&config)?,
        Err(_) => GammaDirectory::with_endpoint(
            DEFAULT_GAMMA_URL,
            DEFAULT_SLUG_PREFIX,
            Duration::from_secs(30),
        )?,
    };

    println!("\nSearching for current BTC 15min market...\n");

    let now = chrono::Utc::now().timestamp();
    let Some(market) = directory.find_current_market(now).await else {
        println!("NO LIVE OR UPCOMING MARKET FOUND");
        println!("\nMarkets open every 15 minutes. Try again shortly.");
        println!("{RULE}");
        return Ok(());
    };

    println!("MARKET FOUND");
    println!("{THIN_RULE}");
    println!("  Slot: {}", market.slot_id);
    println!("  ID: {}", market.instance_id);
    println!("  Label: {}", market.label);
    println!("  Status: {}", if market.is_live { "LIVE" } else { "UPCOMING" });
    println!("  Time Remaining: {}", market.time_remaining_str(now));

    match directory.outcome_tokens(&market.instance_id).await {
        Some(tokens) => {
            println!("  {} Token: {}", Outcome::Up, tokens.up);
            println!("  {} Token: {}", Outcome::Down, tokens.down);
        }
        None => println!("  Tokens: not published yet"),
    }
    println!("{RULE}");

    Ok(())
}

/// Show the top of one order book.
async fn cmd_book(token_id: &str, depth: usize) -> anyhow::Result<()> {
    println!("{RULE}");
    println!("BTC 15M SWING BOT - ORDER BOOK");
    println!("{RULE}");

    let config = load_validated()?;
    let api = connect(&config).await?;
    let feed = PriceFeed::new(api);

    let book = feed.top_levels(token_id, depth).await?;
    let (bids, asks) = (&book.bids, &book.asks);

    println!("Token: {}", short_id(token_id, 20));
    println!("{THIN_RULE}");
    println!("  {:>10} {:>12}   {:>10} {:>12}", "BID", "SIZE", "ASK", "SIZE");
    for i in 0..bids.len().max(asks.len()) {
        let bid = bids.get(i);
        let ask = asks.get(i);
        println!(
            "  {:>10} {:>12}   {:>10} {:>12}",
            bid.map(|l| l.price.to_string()).unwrap_or_default(),
            bid.map(|l| l.size.to_string()).unwrap_or_default(),
            ask.map(|l| l.price.to_string()).unwrap_or_default(),
            ask.map(|l| l.size.to_string()).unwrap_or_default(),
        );
    }
    if let Some(spread) = book.spread() {
        println!("{THIN_RULE}");
        println!("  Spread: {}", spread);
    }
    println!("{RULE}");

    Ok(())
}

/// Cancel one order.
async fn cmd_cancel(order_id: &str) -> anyhow::Result<()> {
    let config = load_validated()?;
    let api = connect(&config).await?;
    let router = OrderRouter::new(api, config.dry_run);
    if router.is_dry_run() {
        println!("DRY RUN: nothing is sent to the venue");
    }

    if router.cancel(order_id).await? {
        println!("Canceled {}", order_id);
    } else {
        println!("Order {} was not canceled", order_id);
    }
    Ok(())
}

/// Run the trading loop until Ctrl+C or SIGTERM.
async fn cmd_run(dry_run_override: Option<bool>) -> anyhow::Result<()> {
    info!("Loading configuration...");
    let mut config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Some(dry_run) = dry_run_override {
        config.dry_run = dry_run;
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    if let Some(port) = config.metrics_port {
        metrics::install_exporter(port)?;
    }

    let api = connect(&config).await?;
    let directory = Arc::new(GammaDirectory::new(&config)?);
    let settings = MachineSettings::from_config(&config)?;

    info!("========================================");
    info!("BTC 15MIN SWING BOT STARTED");
    info!("========================================");
    info!("Mode: {}", if config.dry_run { "SIMULATION" } else { "LIVE TRADING" });
    info!("Buy at ask <= ${}", config.buy_price);
    info!("Sell at bid >= ${}", config.sell_price);
    info!("Order size: {} shares ({})", config.order_size, settings.fill_policy);
    info!("API generation: {}", api.generation());
    info!("========================================");

    let mut machine = TradingStateMachine::new(settings, directory, api);
    machine.initialize().await?;
    machine.ensure_balance().await?;
    machine.run(shutdown_signal()).await?;

    info!("Bot stopped");
    Ok(())
}
