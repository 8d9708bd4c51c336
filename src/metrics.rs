//! Prometheus metrics for order flow, price feed health and market rollover.
//!
//! Metrics go through the `metrics` facade and are no-ops until
//! [`install_exporter`] registers a recorder.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use tracing::{debug, info};

use crate::trading::order::Side;

// === Metric Name Constants ===

/// Order submission latency metric name.
pub const METRIC_ORDER_SUBMIT_LATENCY: &str = "order_submit_latency_ms";
/// Order book fetch latency metric name.
pub const METRIC_ORDERBOOK_FETCH_LATENCY: &str = "orderbook_fetch_latency_ms";
/// Orders submitted counter metric name.
pub const METRIC_ORDERS_SUBMITTED: &str = "orders_submitted_total";
/// Orders failed counter metric name.
pub const METRIC_ORDERS_FAILED: &str = "orders_failed_total";
/// Submission strategy failures that fell through to the next strategy.
pub const METRIC_STRATEGY_FALLBACKS: &str = "order_strategy_fallbacks_total";
/// Price feed failures counter metric name.
pub const METRIC_FEED_FAILURES: &str = "price_feed_failures_total";
/// Market rollovers counter metric name.
pub const METRIC_ROLLOVERS: &str = "market_rollovers_total";
/// Positions dropped at rollover counter metric name.
pub const METRIC_ABANDONED_POSITIONS: &str = "abandoned_positions_total";

/// Register metric descriptions. Call once at startup.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_ORDER_SUBMIT_LATENCY,
        "Order placement latency across all strategies in milliseconds"
    );
    describe_histogram!(
        METRIC_ORDERBOOK_FETCH_LATENCY,
        "Order book fetch latency in milliseconds"
    );
    describe_counter!(METRIC_ORDERS_SUBMITTED, "Orders that returned an order id");
    describe_counter!(METRIC_ORDERS_FAILED, "Orders for which every strategy failed");
    describe_counter!(
        METRIC_STRATEGY_FALLBACKS,
        "Submission strategies that failed before a later one was tried"
    );
    describe_counter!(METRIC_FEED_FAILURES, "Scans where a token had no usable quote");
    describe_counter!(METRIC_ROLLOVERS, "Switches to a new 15-minute market");
    describe_counter!(
        METRIC_ABANDONED_POSITIONS,
        "Open positions dropped from bookkeeping at rollover"
    );

    debug!("Metrics initialized");
}

/// Serve `/metrics` on `0.0.0.0:port`.
pub fn install_exporter(port: u16) -> Result<(), BuildError> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    init_metrics();
    info!(%addr, "Prometheus exporter listening");
    Ok(())
}

fn side_label(side: Side) -> &'static str {
    match side {
        Side::Buy => "buy",
        Side::Sell => "sell",
    }
}

/// Record order book fetch latency.
pub fn record_book_fetch(elapsed: Duration) {
    histogram!(METRIC_ORDERBOOK_FETCH_LATENCY).record(elapsed.as_secs_f64() * 1000.0);
}

/// Count an order that returned an id.
pub fn inc_orders_submitted(side: Side, strategy: &'static str) {
    counter!(METRIC_ORDERS_SUBMITTED, "side" => side_label(side), "strategy" => strategy)
        .increment(1);
}

/// Count an order that exhausted every strategy.
pub fn inc_orders_failed(side: Side) {
    counter!(METRIC_ORDERS_FAILED, "side" => side_label(side)).increment(1);
}

/// Count a strategy failure.
pub fn inc_strategy_fallback(strategy: &'static str) {
    counter!(METRIC_STRATEGY_FALLBACKS, "strategy" => strategy).increment(1);
}

/// Count a scan with no usable quote.
pub fn inc_feed_failures() {
    counter!(METRIC_FEED_FAILURES).increment(1);
}

/// Count a market switch.
pub fn inc_rollovers() {
    counter!(METRIC_ROLLOVERS).increment(1);
}

/// Count positions dropped at rollover.
pub fn inc_abandoned_positions(count: u64) {
    counter!(METRIC_ABANDONED_POSITIONS).increment(count);
}

/// RAII guard for timing operations.
/// Records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!(self.metric_name).record(self.elapsed_ms());
    }
}

/// Create a latency timer for order submission.
pub fn timer_order_submit() -> LatencyTimer {
    LatencyTimer::new(METRIC_ORDER_SUBMIT_LATENCY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn latency_timer_measures_time() {
        let timer = timer_order_submit();
        sleep(Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 9.0);
    }

    #[test]
    fn recording_without_recorder_is_a_noop() {
        inc_orders_submitted(Side::Buy, "market");
        inc_orders_failed(Side::Sell);
        inc_abandoned_positions(2);
        record_book_fetch(Duration::from_millis(3));
    }
}
