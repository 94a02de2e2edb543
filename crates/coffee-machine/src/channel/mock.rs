//! Mock channel service for testing.
//!
//! `MockChannelService` records every call into a `CallLog` that can be
//! shared between both parties, so tests can assert on the global call order.
//! `sign` appends the signing party's index to a `signedBy` array on every
//! transaction, which makes the signature chain visible in `apply` calls.

use super::client::{
    Bundles, ChannelService, InitParams, Transfer, VERB_APPLY, VERB_CLOSE, VERB_FINALIZE,
    VERB_FUND, VERB_INIT, VERB_MULTISIGNATURE, VERB_SETTLEMENT, VERB_SETTLEMENT_ADDRESS,
    VERB_SIGN, VERB_TRANSFER,
};
use super::object::ChannelObject;
use crate::errors::ControllerError;
use common::types::{ChannelId, PartyIndex};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub party: PartyIndex,
    pub verb: &'static str,
    pub body: Value,
}

/// Call log shared between mocks.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<RecordedCall>>>);

impl CallLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, party: PartyIndex, verb: &'static str, body: Value) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall { party, verb, body });
    }

    /// Snapshot of all calls so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// `(party, verb)` pairs in call order.
    #[must_use]
    pub fn sequence(&self) -> Vec<(usize, &'static str)> {
        self.calls().iter().map(|c| (c.party.0, c.verb)).collect()
    }

    /// Number of calls of a verb across all parties.
    #[must_use]
    pub fn count(&self, verb: &str) -> usize {
        self.calls().iter().filter(|c| c.verb == verb).count()
    }

    /// Calls of a verb, in order.
    #[must_use]
    pub fn calls_of(&self, verb: &str) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|c| c.verb == verb).collect()
    }
}

/// A channel object with the given balance and digest pool for `party`.
#[must_use]
pub fn channel_object_value(party: PartyIndex, balance: u64, digests: usize) -> Value {
    let mut deposit = vec![0_u64; 2];
    if let Some(slot) = deposit.get_mut(party.0) {
        *slot = balance;
    }
    let partial_digests: Vec<Value> = (0..digests)
        .map(|i| json!({ "digest": format!("P{}D{i}", party.0) }))
        .collect();

    json!({
        "userIndex": party.0,
        "partialDigests": partial_digests,
        "flash": { "deposit": deposit }
    })
}

/// Mock channel service for unit testing.
pub struct MockChannelService {
    party: PartyIndex,
    log: CallLog,
    channel_object: Value,
    settlement_address: String,
    failing_verb: Option<&'static str>,
    successes_before_failure: usize,
    delay: Option<Duration>,
    channel_id: Mutex<Option<ChannelId>>,
}

impl MockChannelService {
    /// A healthy party with a 10,000,000 balance and 8 digests.
    #[must_use]
    pub fn new(party: PartyIndex, log: CallLog) -> Self {
        Self {
            party,
            log,
            channel_object: channel_object_value(party, 10_000_000, 8),
            settlement_address: format!("SETTLEMENT9PARTY{}", party.0),
            failing_verb: None,
            successes_before_failure: 0,
            delay: None,
            channel_id: Mutex::new(None),
        }
    }

    /// Document returned by `init`, `settlement` and `apply`.
    #[must_use]
    pub fn with_channel_object(mut self, value: Value) -> Self {
        self.channel_object = value;
        self
    }

    /// Fail every call of `verb` with a 500.
    #[must_use]
    pub fn failing_on(mut self, verb: &'static str) -> Self {
        self.failing_verb = Some(verb);
        self
    }

    /// Answer the first `successes` calls of `verb`, then fail with a 500.
    #[must_use]
    pub fn failing_on_after(mut self, verb: &'static str, successes: usize) -> Self {
        self.failing_verb = Some(verb);
        self.successes_before_failure = successes;
        self
    }

    /// Sleep before answering each call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn call(&self, verb: &'static str, body: Value) -> Result<(), ControllerError> {
        self.log.record(self.party, verb, body);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let attempts = self
            .log
            .calls()
            .iter()
            .filter(|c| c.party == self.party && c.verb == verb)
            .count();
        if self.failing_verb == Some(verb) && attempts > self.successes_before_failure {
            return Err(ControllerError::RemoteCallFailed {
                party: self.party,
                verb,
                status_code: 500,
                body: "mock failure".to_string(),
            });
        }
        Ok(())
    }

    fn object(&self) -> Result<ChannelObject, ControllerError> {
        ChannelObject::from_value(self.channel_object.clone()).map_err(|e| {
            ControllerError::InvalidResponse {
                party: self.party,
                verb: "mock",
                message: e.to_string(),
            }
        })
    }
}

fn add_signature(bundles: &Bundles, party: PartyIndex) -> Bundles {
    let mut signed = bundles.clone();
    if let Some(bundles) = signed.as_array_mut() {
        for tx in bundles.iter_mut().filter_map(Value::as_array_mut).flatten() {
            if let Some(tx) = tx.as_object_mut() {
                let signers = tx.entry("signedBy").or_insert_with(|| json!([]));
                if let Some(signers) = signers.as_array_mut() {
                    signers.push(json!(party.0));
                }
            }
        }
    }
    signed
}

#[async_trait::async_trait]
impl ChannelService for MockChannelService {
    fn party(&self) -> PartyIndex {
        self.party
    }

    async fn channel_id(&self) -> Option<ChannelId> {
        self.channel_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn init(&self, params: &InitParams) -> Result<ChannelObject, ControllerError> {
        let body = serde_json::to_value(params).unwrap_or(Value::Null);
        self.call(VERB_INIT, body).await?;
        *self.channel_id.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(ChannelId::from(format!("channel-{}", self.party.0)));
        self.object()
    }

    async fn multisignature(&self, all_digests: &[Vec<Value>]) -> Result<Value, ControllerError> {
        self.call(VERB_MULTISIGNATURE, json!({ "allDigests": all_digests }))
            .await?;
        Ok(json!({}))
    }

    async fn settlement_address(&self) -> Result<String, ControllerError> {
        self.call(VERB_SETTLEMENT_ADDRESS, json!({})).await?;
        Ok(self.settlement_address.clone())
    }

    async fn settlement(&self, addresses: &[String]) -> Result<ChannelObject, ControllerError> {
        self.call(VERB_SETTLEMENT, json!({ "settlementAddresses": addresses }))
            .await?;
        self.object()
    }

    async fn transfer(&self, transfers: &[Transfer]) -> Result<Bundles, ControllerError> {
        self.call(VERB_TRANSFER, json!({ "transfers": transfers }))
            .await?;
        let value: u64 = transfers.iter().map(|t| t.value).sum();
        Ok(json!([[
            { "bundle": "TRANSFER9BUNDLE", "value": value },
            { "bundle": "TRANSFER9BUNDLE", "value": 0 }
        ]]))
    }

    async fn sign(&self, bundles: &Bundles) -> Result<Bundles, ControllerError> {
        self.call(VERB_SIGN, json!({ "bundles": bundles })).await?;
        Ok(add_signature(bundles, self.party))
    }

    async fn apply(&self, signed_bundles: &Bundles) -> Result<ChannelObject, ControllerError> {
        self.call(VERB_APPLY, json!({ "signedBundles": signed_bundles }))
            .await?;
        self.object()
    }

    async fn fund(&self) -> Result<String, ControllerError> {
        self.call(VERB_FUND, json!({})).await?;
        Ok(format!("FUND9HASH{}", self.party.0))
    }

    async fn close(&self) -> Result<Bundles, ControllerError> {
        self.call(VERB_CLOSE, json!({})).await?;
        Ok(json!([[{ "bundle": "CLOSE9BUNDLE" }]]))
    }

    async fn finalize(&self) -> Result<Value, ControllerError> {
        self.call(VERB_FINALIZE, json!({})).await?;
        Ok(json!({}))
    }
}
