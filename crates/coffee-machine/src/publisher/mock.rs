//! Recording message sink for testing.

use super::MessageSink;
use crate::errors::ControllerError;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Records every published message as `(topic, json)`.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<(String, Value)>>,
    attempts: AtomicUsize,
    fail: bool,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every publish fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Number of publish calls, successful or not.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn messages(&self) -> Vec<(String, Value)> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Payloads published to `topic`, in order.
    #[must_use]
    pub fn on_topic(&self, topic: &str) -> Vec<Value> {
        self.messages()
            .into_iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload)
            .collect()
    }

    /// The retained value an observer of `topic` would see.
    #[must_use]
    pub fn last_on(&self, topic: &str) -> Option<Value> {
        self.on_topic(topic).pop()
    }

    /// State names published to any `*/state` topic, in order.
    #[must_use]
    pub fn states(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|(t, _)| t.ends_with("/state"))
            .filter_map(|(_, payload)| payload.get("state")?.as_str().map(str::to_string))
            .collect()
    }
}

#[async_trait::async_trait]
impl MessageSink for RecordingSink {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), ControllerError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ControllerError::Bus("mock sink failure".to_string()));
        }

        let value = serde_json::from_slice(&payload).map_err(|e| ControllerError::Bus(e.to_string()))?;
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((topic.to_string(), value));
        Ok(())
    }
}
