//! MQTT sink over a `rumqttc` client.

use super::MessageSink;
use crate::errors::ControllerError;
use rumqttc::{AsyncClient, QoS};

/// Publishes retained, at-least-once messages.
///
/// The client only enqueues requests; the ingress loop drives the event loop
/// that actually writes them to the broker.
#[derive(Clone)]
pub struct MqttSink {
    client: AsyncClient,
}

impl MqttSink {
    #[must_use]
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl MessageSink for MqttSink {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), ControllerError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, true, payload)
            .await
            .map_err(|e| ControllerError::Bus(e.to_string()))
    }
}
