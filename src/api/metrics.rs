//! Prometheus metrics endpoint and HTTP request tracking middleware.
//!
//! This module provides:
//! - A `/metrics` endpoint that returns Prometheus-formatted metrics
//! - Middleware for tracking HTTP request counts and durations
//! - Helper functions to record lead, push and session outcomes

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::AppState;

// Metric names as constants for consistency
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const LEADS_FORWARDED_TOTAL: &str = "leads_forwarded_total";
pub const PUSH_DELIVERIES_TOTAL: &str = "push_deliveries_total";
pub const PUSH_SUBSCRIPTIONS_PRUNED_TOTAL: &str = "push_subscriptions_pruned_total";
pub const SESSIONS_RESOLVED_TOTAL: &str = "sessions_resolved_total";

/// Install the Prometheus recorder and return a handle for rendering.
///
/// Call once during startup. Fails if another recorder is already installed.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(
        HTTP_REQUESTS_TOTAL,
        "Total number of HTTP requests received"
    );
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(
        LEADS_FORWARDED_TOTAL,
        "Leads mailed to the CRM by status (sent/failed)"
    );
    describe_counter!(
        PUSH_DELIVERIES_TOTAL,
        "Web push deliveries by outcome (sent/failed/gone)"
    );
    describe_counter!(
        PUSH_SUBSCRIPTIONS_PRUNED_TOTAL,
        "Expired push subscriptions removed"
    );
    describe_counter!(
        SESSIONS_RESOLVED_TOTAL,
        "Page sessions resolved by auth mode (modern/legacy)"
    );

    Ok(handle)
}

/// GET /metrics - Returns Prometheus-formatted metrics.
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics_handle.as_ref() {
        Some(h) => (StatusCode::OK, h.render()),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Metrics not initialized".to_string(),
        ),
    }
}

/// Middleware to track HTTP request metrics.
///
/// Records:
/// - `http_requests_total` counter with method, path, and status labels
/// - `http_request_duration_seconds` histogram with method and path labels
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

pub fn record_lead_forwarded(status: &'static str) {
    counter!(LEADS_FORWARDED_TOTAL, "status" => status).increment(1);
}

pub fn record_push_delivery(outcome: &'static str) {
    counter!(PUSH_DELIVERIES_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_subscription_pruned() {
    counter!(PUSH_SUBSCRIPTIONS_PRUNED_TOTAL).increment(1);
}

pub fn record_session_resolved(mode: &'static str) {
    counter!(SESSIONS_RESOLVED_TOTAL, "mode" => mode).increment(1);
}
