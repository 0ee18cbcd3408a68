//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Chain connection status
//! - Step transitions of the active transaction
//! - Submissions, reverts and cross-chain deliveries
//! - Oracle and build failures

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::state::{StepId, StepStatus};
use crate::transaction::BridgeProtocol;

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Chain metrics
    pub static ref CHAIN_CONNECTED: GaugeVec = register_gauge_vec!(
        "swap_orchestrator_chain_connected",
        "Chain connection status (1=connected, 0=disconnected)",
        &["chain_id"]
    ).unwrap();

    // Step metrics
    pub static ref STEP_TRANSITIONS: CounterVec = register_counter_vec!(
        "swap_orchestrator_step_transitions_total",
        "Step status transitions",
        &["step", "status"]
    ).unwrap();

    // Transaction metrics
    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "swap_orchestrator_transactions_submitted_total",
        "Total transactions submitted",
        &["chain_id"]
    ).unwrap();

    pub static ref TX_REVERTED: CounterVec = register_counter_vec!(
        "swap_orchestrator_transactions_reverted_total",
        "Total transactions reverted",
        &["chain_id"]
    ).unwrap();

    pub static ref BUILD_FAILURES: CounterVec = register_counter_vec!(
        "swap_orchestrator_build_failures_total",
        "Calls that could not be built, by transaction type",
        &["transaction_type"]
    ).unwrap();

    // Cross-chain metrics
    pub static ref MESSAGES_EXTRACTED: CounterVec = register_counter_vec!(
        "swap_orchestrator_messages_extracted_total",
        "Cross-chain message ids extracted from origin receipts",
        &["protocol"]
    ).unwrap();

    pub static ref MESSAGES_DELIVERED: CounterVec = register_counter_vec!(
        "swap_orchestrator_messages_delivered_total",
        "Cross-chain messages confirmed on the destination chain",
        &["protocol"]
    ).unwrap();

    pub static ref DELIVERY_LATENCY: HistogramVec = register_histogram_vec!(
        "swap_orchestrator_delivery_latency_seconds",
        "Time from tracking start to confirmed delivery",
        &["protocol"],
        vec![5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]
    ).unwrap();

    pub static ref ORACLE_ERRORS: CounterVec = register_counter_vec!(
        "swap_orchestrator_oracle_errors_total",
        "Failed delivery-oracle queries",
        &["protocol"]
    ).unwrap();

    // Session metrics
    pub static ref NOTIFICATIONS: CounterVec = register_counter_vec!(
        "swap_orchestrator_notifications_total",
        "User-visible notifications by level",
        &["level"]
    ).unwrap();

    pub static ref HEALTH_CHECKS: CounterVec = register_counter_vec!(
        "swap_orchestrator_health_checks_total",
        "Readiness checks by outcome",
        &["outcome"]
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

    pub async fn run(&self) -> OrchestratorResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| OrchestratorError::Internal(format!("Metrics bind failed: {}", e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| OrchestratorError::Internal(format!("Metrics server failed: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

// Helper functions to record metrics

pub fn record_chain_health(chain_id: u64, healthy: bool) {
    CHAIN_CONNECTED
        .with_label_values(&[&chain_id.to_string()])
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_step_transition(step: StepId, status: StepStatus) {
    STEP_TRANSITIONS
        .with_label_values(&[step.name(), status.name()])
        .inc();
}

pub fn record_tx_submitted(chain_id: u64) {
    TX_SUBMITTED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_tx_reverted(chain_id: u64) {
    TX_REVERTED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_build_failure(transaction_type: &str) {
    BUILD_FAILURES.with_label_values(&[transaction_type]).inc();
}

pub fn record_messages_extracted(protocol: BridgeProtocol, count: usize) {
    MESSAGES_EXTRACTED
        .with_label_values(&[protocol.name()])
        .inc_by(count as f64);
}

pub fn record_message_delivered(protocol: BridgeProtocol, latency_secs: f64) {
    MESSAGES_DELIVERED
        .with_label_values(&[protocol.name()])
        .inc();
    DELIVERY_LATENCY
        .with_label_values(&[protocol.name()])
        .observe(latency_secs);
}

pub fn record_oracle_error(protocol: BridgeProtocol) {
    ORACLE_ERRORS.with_label_values(&[protocol.name()]).inc();
}

pub fn record_notification(level: &str) {
    NOTIFICATIONS.with_label_values(&[level]).inc();
}

pub fn record_health_check(ready: bool) {
    HEALTH_CHECKS
        .with_label_values(&[if ready { "ready" } else { "not_ready" }])
        .inc();
}
