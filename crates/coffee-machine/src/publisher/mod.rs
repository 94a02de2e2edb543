//! Retained state publication.
//!
//! The publisher is write-only: the controller never reads back what it
//! published. Every message is retained so late subscribers (dashboards,
//! home automation) see the last known value. A failed publish is logged and
//! dropped; it never fails a lifecycle operation.

pub mod mock;
pub mod mqtt;

use crate::channel::ChannelObject;
use crate::errors::ControllerError;
use crate::lifecycle::LifecycleState;
use common::types::ChannelId;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

pub use mqtt::MqttSink;

pub const TOPIC_STATE: &str = "state";
pub const TOPIC_FLASH: &str = "flash";
pub const TOPIC_CHANNEL_IDS: &str = "channel_ids";
pub const TOPIC_TRANSACTIONS: &str = "transactions";

/// Destination for retained messages (enables mocking).
#[async_trait::async_trait]
pub trait MessageSink: Send + Sync {
    /// Publish `payload` to `topic` with retain set.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), ControllerError>;
}

#[derive(Serialize)]
struct StateMessage<'a> {
    state: &'a str,
}

#[derive(Serialize)]
struct FlashMessage<'a> {
    flash: [Option<&'a ChannelObject>; 2],
}

#[derive(Serialize)]
struct ChannelIdsMessage<'a> {
    channel_ids: &'a [Option<ChannelId>],
}

#[derive(Serialize)]
struct TransactionsMessage<'a> {
    bundle_hashes: &'a [String],
    reason: &'a str,
}

/// Formats lifecycle artifacts and publishes them under a topic prefix.
#[derive(Clone)]
pub struct StatePublisher {
    sink: Arc<dyn MessageSink>,
    prefix: String,
}

impl StatePublisher {
    pub fn new(sink: Arc<dyn MessageSink>, prefix: impl Into<String>) -> Self {
        Self {
            sink,
            prefix: prefix.into(),
        }
    }

    /// Full topic name for a suffix, e.g. `coffee/state`.
    #[must_use]
    pub fn topic(&self, suffix: &str) -> String {
        format!("{}/{suffix}", self.prefix)
    }

    pub async fn publish_state(&self, state: LifecycleState) {
        self.send(
            TOPIC_STATE,
            &StateMessage {
                state: state.as_str(),
            },
        )
        .await;
    }

    pub async fn publish_channel_objects(&self, objects: [Option<&ChannelObject>; 2]) {
        self.send(TOPIC_FLASH, &FlashMessage { flash: objects }).await;
    }

    pub async fn publish_channel_ids(&self, channel_ids: &[Option<ChannelId>]) {
        self.send(TOPIC_CHANNEL_IDS, &ChannelIdsMessage { channel_ids })
            .await;
    }

    pub async fn publish_transactions(&self, bundle_hashes: &[String], reason: &str) {
        self.send(
            TOPIC_TRANSACTIONS,
            &TransactionsMessage {
                bundle_hashes,
                reason,
            },
        )
        .await;
    }

    async fn send<T: Serialize + Sync>(&self, suffix: &str, message: &T) {
        let topic = self.topic(suffix);

        let payload = match serde_json::to_vec(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(target: "coffee.publisher", topic = %topic, error = %e, "Failed to encode message");
                return;
            }
        };

        match self.sink.publish(&topic, payload).await {
            Ok(()) => debug!(target: "coffee.publisher", topic = %topic, "Published"),
            Err(e) => warn!(target: "coffee.publisher", topic = %topic, error = %e, "Publish failed"),
        }
    }
}
