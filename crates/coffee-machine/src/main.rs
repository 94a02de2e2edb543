//! Coffee Machine
//!
//! Flash channel lifecycle controller for a pay-per-cup coffee machine.
//!
//! # Servers
//!
//! - MQTT client for commands and retained state (default broker: localhost:1883)
//! - HTTP server for health endpoints and metrics (default: 0.0.0.0:8081)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Start health HTTP server (liveness, readiness, metrics)
//! 4. Authenticate against both channel services (fatal on failure)
//! 5. Create MQTT client, controller and dispatcher
//! 6. Publish `UNINITIALISED`
//! 7. Spawn the command ingress loop
//! 8. Wait for shutdown signal

#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)] // main.rs orchestrates startup, naturally longer

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use coffee_machine::channel::{ChannelClient, ChannelRegistry};
use coffee_machine::config::Config;
use coffee_machine::ingress::{mqtt_options, run_command_ingress, CommandDispatcher, REQUEST_QUEUE_CAPACITY};
use coffee_machine::lifecycle::LifecycleController;
use coffee_machine::observability::{health_router, init_metrics_recorder, HealthState};
use coffee_machine::publisher::{MqttSink, StatePublisher};
use common::types::PartyIndex;
use rumqttc::AsyncClient;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Time given to the ingress loop to flush pending publishes on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coffee_machine=debug,common=debug,coffee=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Coffee Machine");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        coffee_service = %config.coffee_service.url,
        provider_service = %config.provider_service.url,
        mqtt_host = %config.mqtt.host,
        mqtt_port = config.mqtt.port,
        mqtt_client_id = %config.mqtt.client_id,
        topic_prefix = %config.topic_prefix,
        balance = config.protocol.balance,
        coffee_price = config.protocol.coffee_price,
        health_bind_address = %config.health_bind_address,
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    info!("Initializing Prometheus metrics recorder...");
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    let health_state = Arc::new(HealthState::new());
    let shutdown_token = CancellationToken::new();

    // Start health HTTP server (MUST succeed - fail startup if it doesn't)
    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );
    let app = health_router(Arc::clone(&health_state)).merge(metrics_router);

    // Bind listener BEFORE spawning to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;

    let health_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        info!(addr = %health_addr, "Health server starting");
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });
    info!(addr = %health_addr, "Health server started");

    // Authenticate against both channel services
    info!("Authenticating channel services...");
    let local = ChannelClient::connect(PartyIndex::LOCAL, &config.coffee_service, config.http_timeout)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to authenticate coffee machine channel service");
            e
        })?;
    let provider = ChannelClient::connect(
        PartyIndex::PROVIDER,
        &config.provider_service,
        config.http_timeout,
    )
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to authenticate provider channel service");
        e
    })?;
    let registry = ChannelRegistry::new(Arc::new(local), Arc::new(provider))?;
    health_state.set_channels_authenticated();
    info!("Channel services authenticated");

    // MQTT client; the event loop is driven by the ingress task
    let (mqtt_client, event_loop) =
        AsyncClient::new(mqtt_options(&config.mqtt), REQUEST_QUEUE_CAPACITY);
    let publisher = StatePublisher::new(
        Arc::new(MqttSink::new(mqtt_client.clone())),
        config.topic_prefix.clone(),
    );

    let controller = LifecycleController::new(
        registry,
        publisher,
        config.protocol.clone(),
        config.terminal_state_delay,
    );
    controller.publish_current_state().await;
    let dispatcher = CommandDispatcher::new(controller);

    let ingress_token = shutdown_token.child_token();
    let ingress_health = Arc::clone(&health_state);
    let ingress_client = mqtt_client.clone();
    let ingress_prefix = config.topic_prefix.clone();
    let ingress_task = tokio::spawn(async move {
        run_command_ingress(
            event_loop,
            ingress_client,
            ingress_prefix,
            dispatcher,
            ingress_health,
            ingress_token,
        )
        .await;
    });
    info!("Command ingress started");

    info!("Coffee Machine running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");
    health_state.set_not_ready();

    if let Err(e) = mqtt_client.try_disconnect() {
        error!(error = %e, "Failed to queue MQTT disconnect");
    }
    // Let the ingress loop flush the disconnect before cancelling it
    tokio::time::sleep(SHUTDOWN_GRACE).await;
    shutdown_token.cancel();

    if let Err(e) = ingress_task.await {
        error!(error = %e, "Command ingress task failed");
    }

    info!("Coffee Machine shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is acceptable because
/// without signal handlers, we cannot gracefully shut down the service.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
