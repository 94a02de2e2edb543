//! MQTT event loop driving command intake.
//!
//! The loop owns the `rumqttc` event loop, so it also flushes everything the
//! publisher enqueues. It (re)subscribes to the command topics on every
//! `ConnAck`; with a clean session the broker forgets subscriptions when the
//! connection drops.

use super::command::{command_topics, Command};
use super::dispatcher::{CommandDispatcher, DispatchOutcome};
use crate::config::MqttConfig;
use crate::observability::HealthState;
use common::secret::ExposeSecret;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Wait before polling again after a connection error.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Capacity of the client request queue.
pub const REQUEST_QUEUE_CAPACITY: usize = 64;

/// Build broker options from configuration.
#[must_use]
pub fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_seconds));
    if let Some(username) = &config.username {
        let password = config
            .password
            .as_ref()
            .map(|p| p.expose_secret().to_string())
            .unwrap_or_default();
        options.set_credentials(username.clone(), password);
    }
    options
}

/// Route one bus message to the dispatcher.
///
/// Returns `None` when the topic is not a command.
pub fn handle_message(
    prefix: &str,
    dispatcher: &CommandDispatcher,
    topic: &str,
    payload: &[u8],
) -> Option<DispatchOutcome> {
    let Some(command) = Command::from_message(prefix, topic, payload) else {
        debug!(target: "coffee.ingress", topic = %topic, "Ignoring message on non-command topic");
        return None;
    };
    Some(dispatcher.dispatch(command))
}

/// Poll the MQTT event loop until cancelled.
pub async fn run_command_ingress(
    mut event_loop: EventLoop,
    client: AsyncClient,
    prefix: String,
    dispatcher: CommandDispatcher,
    health_state: Arc<HealthState>,
    cancel_token: CancellationToken,
) {
    info!(target: "coffee.ingress", prefix = %prefix, "Command ingress starting");

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!(target: "coffee.ingress", "Command ingress shutting down");
                break;
            }
            event = event_loop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!(target: "coffee.ingress", code = ?ack.code, "Connected to broker");
                    health_state.set_bus_connected(true);
                    for topic in command_topics(&prefix) {
                        if let Err(e) = client.try_subscribe(topic.clone(), QoS::AtLeastOnce) {
                            warn!(target: "coffee.ingress", topic = %topic, error = %e, "Subscribe failed");
                        }
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    handle_message(&prefix, &dispatcher, &publish.topic, &publish.payload);
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    warn!(target: "coffee.ingress", "Broker sent disconnect");
                    health_state.set_bus_connected(false);
                }
                Ok(_) => {}
                Err(e) => {
                    health_state.set_bus_connected(false);
                    warn!(target: "coffee.ingress", error = %e, "MQTT connection error, retrying");
                    tokio::select! {
                        () = cancel_token.cancelled() => {}
                        () = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                    }
                }
            }
        }
    }

    info!(target: "coffee.ingress", "Command ingress stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::channel::mock::{CallLog, MockChannelService};
    use crate::channel::ChannelRegistry;
    use crate::config::ProtocolConfig;
    use crate::lifecycle::LifecycleController;
    use crate::publisher::mock::RecordingSink;
    use crate::publisher::StatePublisher;
    use common::secret::SecretString;
    use common::types::PartyIndex;

    fn dispatcher() -> CommandDispatcher {
        let log = CallLog::new();
        let registry = ChannelRegistry::new(
            Arc::new(MockChannelService::new(PartyIndex::LOCAL, log.clone())),
            Arc::new(MockChannelService::new(PartyIndex::PROVIDER, log)),
        )
        .unwrap();
        CommandDispatcher::new(LifecycleController::new(
            registry,
            StatePublisher::new(Arc::new(RecordingSink::new()), "coffee"),
            ProtocolConfig {
                security: 2,
                tree_depth: 4,
                balance: 100,
                deposit: vec![50, 50],
                coffee_price: 10,
            },
            Duration::from_millis(1),
        ))
    }

    #[test]
    fn test_mqtt_options_from_config() {
        let config = MqttConfig {
            host: "broker".to_string(),
            port: 1884,
            username: Some("machine".to_string()),
            password: Some(SecretString::from("pw")),
            client_id: "coffeemachine-1".to_string(),
            keep_alive_seconds: 600,
        };

        let options = mqtt_options(&config);

        assert_eq!(options.broker_address(), ("broker".to_string(), 1884));
        assert_eq!(options.client_id(), "coffeemachine-1");
        assert_eq!(options.keep_alive(), Duration::from_secs(600));
        assert_eq!(
            options.credentials(),
            Some(("machine".to_string(), "pw".to_string()))
        );
    }

    #[tokio::test]
    async fn test_handle_message_ignores_non_commands() {
        let dispatcher = dispatcher();
        assert!(handle_message("coffee", &dispatcher, "coffee/state", b"{}").is_none());
    }

    #[tokio::test]
    async fn test_handle_message_dispatches_commands() {
        let dispatcher = dispatcher();

        let outcome = handle_message("coffee", &dispatcher, "coffee/init", b"").unwrap();
        assert!(outcome.is_accepted());
        if let DispatchOutcome::Accepted(handle) = outcome {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_ingress_stops_on_cancel() {
        // Nothing listens on this port; the loop only ever sees errors.
        let options = MqttOptions::new("test", "127.0.0.1", 1);
        let (client, event_loop) = AsyncClient::new(options, REQUEST_QUEUE_CAPACITY);
        let health = Arc::new(HealthState::new());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_command_ingress(
            event_loop,
            client,
            "coffee".to_string(),
            dispatcher(),
            Arc::clone(&health),
            cancel.clone(),
        ));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("ingress should stop after cancel")
            .unwrap();
        assert!(!health.is_ready());
    }
}
