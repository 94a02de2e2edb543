//! Health endpoints for the coffee machine controller.
//!
//! - `GET /health` - Liveness probe (is the process running?)
//! - `GET /ready` - Readiness probe (can we accept commands?)
//!
//! The `/metrics` endpoint is merged in by `main` from the Prometheus handle.
//!
//! # Health State
//!
//! Readiness needs two things: both channel services handed out a bearer
//! token, and the MQTT broker acknowledged our connection. The bus flag
//! drops again whenever the connection is lost.

use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Health state for the coffee machine controller.
#[derive(Debug)]
pub struct HealthState {
    /// Always true after startup.
    live: AtomicBool,
    /// Both channel services authenticated.
    channels_authenticated: AtomicBool,
    /// MQTT `ConnAck` received and connection not lost since.
    bus_connected: AtomicBool,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (live, not ready).
    #[must_use]
    pub fn new() -> Self {
        Self {
            live: AtomicBool::new(true),
            channels_authenticated: AtomicBool::new(false),
            bus_connected: AtomicBool::new(false),
        }
    }

    /// Mark both channel services as authenticated.
    pub fn set_channels_authenticated(&self) {
        self.channels_authenticated.store(true, Ordering::SeqCst);
    }

    /// Track the MQTT connection.
    pub fn set_bus_connected(&self, connected: bool) {
        self.bus_connected.store(connected, Ordering::SeqCst);
    }

    /// Mark the service as not ready (during shutdown).
    pub fn set_not_ready(&self) {
        self.channels_authenticated.store(false, Ordering::SeqCst);
        self.bus_connected.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.channels_authenticated.load(Ordering::SeqCst)
            && self.bus_connected.load(Ordering::SeqCst)
    }
}

/// Create the health router with liveness and readiness endpoints.
pub fn health_router(health_state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(liveness_handler))
        .route("/ready", get(readiness_handler))
        .with_state(health_state)
}

async fn liveness_handler(State(state): State<Arc<HealthState>>) -> StatusCode {
    if state.is_live() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn readiness_handler(State(state): State<Arc<HealthState>>) -> StatusCode {
    if state.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
