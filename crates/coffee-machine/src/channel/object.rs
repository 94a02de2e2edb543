//! Channel objects returned by the channel services.
//!
//! The document is server-defined and published verbatim. Only a small
//! envelope is typed: the party's index inside the channel, its remaining
//! digest pool, and the per-party deposits.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Per-party protocol state document.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelObject {
    raw: Value,
    envelope: Envelope,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(default)]
    user_index: Option<usize>,
    #[serde(default)]
    partial_digests: Vec<Value>,
    #[serde(default)]
    flash: FlashState,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
struct FlashState {
    #[serde(default)]
    deposit: Vec<u64>,
}

impl ChannelObject {
    /// Wrap a raw document, extracting the typed envelope.
    ///
    /// # Errors
    ///
    /// Fails if one of the inspected fields has the wrong type (for example a
    /// non-integer deposit). Unknown and missing fields are accepted.
    pub fn from_value(raw: Value) -> Result<Self, serde_json::Error> {
        let envelope = Envelope::deserialize(&raw)?;
        Ok(Self { raw, envelope })
    }

    /// Remaining balance of the party owning this object
    /// (`flash.deposit[userIndex]`, 0 when absent).
    #[must_use]
    pub fn remaining_balance(&self) -> u64 {
        self.envelope
            .user_index
            .and_then(|idx| self.envelope.flash.deposit.get(idx).copied())
            .unwrap_or(0)
    }

    /// Number of one-time multisignature addresses left.
    #[must_use]
    pub fn digest_pool_size(&self) -> usize {
        self.envelope.partial_digests.len()
    }

    /// The party's partial digests, as handed to the multisignature exchange.
    #[must_use]
    pub fn partial_digests(&self) -> &[Value] {
        &self.envelope.partial_digests
    }

    /// The document exactly as the service returned it.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.raw
    }
}

impl Serialize for ChannelObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ChannelObject {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        ChannelObject::from_value(raw).map_err(serde::de::Error::custom)
    }
}
