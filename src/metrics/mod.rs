//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Quote fetch outcomes and latency
//! - Intent lifecycle counts
//! - Leg confirmation outcomes and submission attempts

use crate::error::{EngineError, EngineResult};

use axum::{routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Quote metrics
    pub static ref QUOTES_FETCHED: CounterVec = register_counter_vec!(
        "placer_quotes_fetched_total",
        "Total quote fetches by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref QUOTE_LATENCY: HistogramVec = register_histogram_vec!(
        "placer_quote_latency_seconds",
        "Quote fetch latency",
        &[],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    // Intent metrics
    pub static ref INTENTS: CounterVec = register_counter_vec!(
        "placer_intents_total",
        "Total intents by terminal outcome",
        &["outcome"]
    ).unwrap();

    // Leg metrics
    pub static ref LEGS_SETTLED: CounterVec = register_counter_vec!(
        "placer_legs_settled_total",
        "Total transaction legs by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref SUBMISSION_ATTEMPTS: CounterVec = register_counter_vec!(
        "placer_submission_attempts_total",
        "Total transaction submission attempts",
        &[]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> EngineResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| EngineError::Config(format!("metrics listener: {}", e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| EngineError::Internal(format!("metrics server: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

// Helper functions to record metrics

pub fn record_quote_outcome(outcome: &str) {
    QUOTES_FETCHED.with_label_values(&[outcome]).inc();
}

pub fn record_quote_latency(latency_secs: f64) {
    QUOTE_LATENCY.with_label_values(&[]).observe(latency_secs);
}

pub fn record_intent_created() {
    INTENTS.with_label_values(&["created"]).inc();
}

pub fn record_intent_completed() {
    INTENTS.with_label_values(&["completed"]).inc();
}

pub fn record_intent_create_failed() {
    INTENTS.with_label_values(&["create_failed"]).inc();
}

pub fn record_leg_confirmed() {
    LEGS_SETTLED.with_label_values(&["confirmed"]).inc();
}

pub fn record_leg_failed() {
    LEGS_SETTLED.with_label_values(&["failed"]).inc();
}

pub fn record_submission_attempt() {
    SUBMISSION_ATTEMPTS.with_label_values(&[]).inc();
}
