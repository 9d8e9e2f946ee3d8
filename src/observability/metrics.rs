//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Expose a Prometheus-compatible metrics endpoint
//! - Describe the relay's metrics so the scrape output carries help text
//!
//! # Metrics
//! - `relay_events_published_total` (counter): events accepted from producers
//! - `relay_events_delivered_total` (counter): per-subscriber deliveries
//! - `relay_events_replayed_total` (counter): events served from the journal
//! - `relay_subscriber_lag_skips_total` (counter): events skipped by slow subscribers
//! - `relay_clients_rejected_total` (counter): connections refused at the client cap
//! - `relay_journal_failures_total` (counter): journal writes that failed
//! - `relay_sse_clients` (gauge): currently connected SSE clients
//! - `relay_topics` (gauge): topics with a live channel
//! - `relay_active_bans` (gauge): subjects currently banned
//! - `relay_db_healthy` (gauge): 1=healthy, 0=unhealthy
//!
//! # Design Decisions
//! - Metric updates are atomic increments on the hot path; exposition
//!   runs on its own listener so scrapes never touch the relay port

use std::net::SocketAddr;

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

pub fn init_metrics(addr: SocketAddr) {
    describe_counter!(
        "relay_events_published_total",
        "Events accepted from producers"
    );
    describe_counter!(
        "relay_events_delivered_total",
        "Event deliveries to individual subscribers"
    );
    describe_counter!(
        "relay_events_replayed_total",
        "Events served from the journal on reconnect"
    );
    describe_counter!(
        "relay_subscriber_lag_skips_total",
        "Events skipped because a subscriber fell behind"
    );
    describe_counter!(
        "relay_clients_rejected_total",
        "Connections refused at the client cap"
    );
    describe_counter!(
        "relay_journal_failures_total",
        "Journal writes that failed; affected events were live only"
    );
    describe_gauge!("relay_sse_clients", "Currently connected SSE clients");
    describe_gauge!("relay_topics", "Topics with a live channel");
    describe_gauge!("relay_active_bans", "Subjects currently banned");
    describe_gauge!("relay_db_healthy", "Database probe state (1 healthy, 0 unhealthy)");

    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to start metrics endpoint"),
    }
}
