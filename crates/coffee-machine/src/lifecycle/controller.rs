//! The channel lifecycle state machine.
//!
//! Each operation is a fixed choreography of channel service calls across
//! both parties, always in party-index order (coffee machine first, then
//! provider):
//!
//! ```text
//! initialize: init* -> multisignature* -> settlement_address* -> settlement*
//! fund:       fund*
//! pay:        transfer(local) -> apply_and_sign
//! close:      close(local)    -> apply_and_sign
//! apply_and_sign: sign* (chained) -> apply*
//! ```
//!
//! The controller assumes it is the only operation in flight; the command
//! dispatcher guarantees that by holding the controller's lock for the whole
//! operation. A remote failure aborts the operation and is returned to the
//! dispatcher, which calls [`LifecycleController::fail`].

use super::payment::{bundle_hashes, CoffeeMode, PaymentOutcome};
use super::state::LifecycleState;
use crate::channel::registry::into_pair;
use crate::channel::{Bundles, ChannelRegistry, InitParams, Transfer};
use crate::config::{ProtocolConfig, PARTY_COUNT};
use crate::errors::ControllerError;
use crate::observability::metrics;
use crate::publisher::StatePublisher;
use common::types::PartyIndex;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

/// Reason attached to funding transactions.
pub const FUNDING_REASON: &str = "Funding";

/// Reason attached to the closing bundle.
pub const CLOSING_REASON: &str = "Closing";

/// Multisig address index the channel starts at.
const START_INDEX: u32 = 0;

/// Owns the channel registry and the lifecycle state.
pub struct LifecycleController {
    registry: ChannelRegistry,
    publisher: StatePublisher,
    protocol: ProtocolConfig,
    terminal_state_delay: Duration,
    state: LifecycleState,
    settlement_addresses: Vec<String>,
}

impl LifecycleController {
    #[must_use]
    pub fn new(
        registry: ChannelRegistry,
        publisher: StatePublisher,
        protocol: ProtocolConfig,
        terminal_state_delay: Duration,
    ) -> Self {
        Self {
            registry,
            publisher,
            protocol,
            terminal_state_delay,
            state: LifecycleState::Uninitialised,
            settlement_addresses: Vec::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    #[must_use]
    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Settlement addresses agreed during initialize, in party order.
    #[must_use]
    pub fn settlement_addresses(&self) -> &[String] {
        &self.settlement_addresses
    }

    /// Publish the current state, used once at startup.
    pub async fn publish_current_state(&self) {
        self.publisher.publish_state(self.state).await;
    }

    /// Open the channel on both parties and agree on settlement addresses.
    ///
    /// # Errors
    ///
    /// Any channel service failure aborts the sequence. Updates that already
    /// completed (published channel ids, advanced channel objects) stay.
    #[instrument(skip_all, name = "lifecycle.initialize")]
    pub async fn initialize(&mut self) -> Result<(), ControllerError> {
        let start = Instant::now();
        let result = self.run_initialize().await;
        metrics::record_operation("initialize", status_label(&result), start.elapsed());
        result
    }

    async fn run_initialize(&mut self) -> Result<(), ControllerError> {
        self.set_state(LifecycleState::Initialising).await;
        // Addresses of a previous channel must not outlive a failed re-init.
        self.settlement_addresses.clear();

        let mut opened = Vec::with_capacity(PARTY_COUNT);
        for party in self.registry.parties() {
            let params = InitParams {
                user_index: party.index().0,
                index: START_INDEX,
                security: self.protocol.security,
                depth: self.protocol.tree_depth,
                signers_count: PARTY_COUNT,
                balance: self.protocol.balance,
                deposit: self.protocol.deposit.clone(),
            };
            opened.push(party.service().init(&params).await?);
        }
        self.registry.advance(into_pair(opened)?);
        self.publisher
            .publish_channel_ids(&self.registry.channel_ids().await)
            .await;

        info!(target: "coffee.lifecycle", "Generating multisignature addresses");
        let all_digests: Vec<Vec<Value>> = self
            .registry
            .parties()
            .map(|party| {
                party
                    .require_channel_object()
                    .map(|object| object.partial_digests().to_vec())
            })
            .collect::<Result<_, _>>()?;
        for party in self.registry.parties() {
            party.service().multisignature(&all_digests).await?;
        }

        info!(target: "coffee.lifecycle", "Exchanging settlement addresses");
        let mut addresses = Vec::with_capacity(PARTY_COUNT);
        for party in self.registry.parties() {
            addresses.push(party.service().settlement_address().await?);
        }

        let mut settled = Vec::with_capacity(PARTY_COUNT);
        for party in self.registry.parties() {
            settled.push(party.service().settlement(&addresses).await?);
        }
        self.registry.advance(into_pair(settled)?);
        self.settlement_addresses = addresses;

        self.set_state(LifecycleState::Initialised).await;
        self.publisher
            .publish_channel_objects(self.registry.channel_objects())
            .await;
        self.publisher
            .publish_channel_ids(&self.registry.channel_ids().await)
            .await;
        Ok(())
    }

    /// Fund the channel deposit on both parties.
    ///
    /// A party whose `fund` call fails is logged and skipped; the state
    /// advances to `FUNDED` regardless.
    ///
    /// # Errors
    ///
    /// Never fails today; the `Result` keeps the operation signatures uniform.
    #[instrument(skip_all, name = "lifecycle.fund")]
    pub async fn fund(&mut self) -> Result<(), ControllerError> {
        let start = Instant::now();
        self.set_state(LifecycleState::Funding).await;

        let mut transaction_refs = Vec::new();
        for party in self.registry.parties() {
            match party.service().fund().await {
                Ok(bundle_hash) => transaction_refs.push(bundle_hash),
                Err(e) => {
                    warn!(
                        target: "coffee.lifecycle",
                        party = %party.index(),
                        error = %e,
                        "Funding failed for party, continuing"
                    );
                }
            }
        }
        self.publisher
            .publish_transactions(&transaction_refs, FUNDING_REASON)
            .await;

        self.set_state(LifecycleState::Funded).await;
        metrics::record_operation("fund", "success", start.elapsed());
        Ok(())
    }

    /// Pay for a coffee from the coffee machine's side of the channel.
    ///
    /// Preconditions are checked against the local party's channel object
    /// only. When they do not hold, the matching terminal state is set after
    /// the terminal-state delay and no transfer is made.
    ///
    /// # Errors
    ///
    /// - `ControllerError::ChannelNotInitialised` - no channel yet
    /// - any channel service failure from transfer, sign or apply
    #[instrument(skip_all, name = "lifecycle.pay", fields(mode = %mode))]
    pub async fn pay(&mut self, mode: CoffeeMode) -> Result<PaymentOutcome, ControllerError> {
        let start = Instant::now();
        let result = self.run_pay(mode).await;
        metrics::record_operation("pay", status_label(&result), start.elapsed());
        result
    }

    async fn run_pay(&mut self, mode: CoffeeMode) -> Result<PaymentOutcome, ControllerError> {
        let value = self.protocol.coffee_price.saturating_mul(mode.cups());
        let (balance, digest_pool_size) = {
            let local = self.registry.local().require_channel_object()?;
            (local.remaining_balance(), local.digest_pool_size())
        };

        if value > balance {
            info!(
                target: "coffee.lifecycle",
                value = value,
                balance = balance,
                "Not enough funds left in channel"
            );
            self.set_terminal_state(LifecycleState::NoFunds).await;
            return Ok(PaymentOutcome::NoFunds { value, balance });
        }

        // One address stays reserved for the closing bundle.
        if digest_pool_size <= 1 {
            info!(
                target: "coffee.lifecycle",
                digest_pool_size = digest_pool_size,
                "No multisignature addresses left"
            );
            self.set_terminal_state(LifecycleState::NoAddressesLeft).await;
            return Ok(PaymentOutcome::NoAddressesLeft { digest_pool_size });
        }

        let address = self
            .settlement_addresses
            .get(PartyIndex::PROVIDER.0)
            .cloned()
            .ok_or(ControllerError::ChannelNotInitialised(PartyIndex::PROVIDER))?;

        info!(target: "coffee.lifecycle", value = value, mode = %mode, "Paying for coffee");
        let bundles = self
            .registry
            .local()
            .service()
            .transfer(&[Transfer { value, address }])
            .await?;

        let reason = format!("Paid {value} for {mode} coffee");
        let bundle_hashes = self.apply_and_sign(bundles, &reason).await?;

        Ok(PaymentOutcome::Paid {
            value,
            bundle_hashes,
        })
    }

    /// Sign `bundles` on every party in order, then apply the fully signed
    /// bundles on every party.
    ///
    /// Publishes the new channel objects, then the bundle hashes tagged with
    /// `reason`. Returns the hashes.
    ///
    /// # Errors
    ///
    /// Any sign or apply failure. If one party applied and the other did
    /// not, the parties have diverged; nothing here repairs that.
    #[instrument(skip_all, fields(reason = %reason))]
    pub async fn apply_and_sign(
        &mut self,
        bundles: Bundles,
        reason: &str,
    ) -> Result<Vec<String>, ControllerError> {
        info!(target: "coffee.lifecycle", "Signing bundles");
        let mut signed = bundles;
        for party in self.registry.parties() {
            signed = party.service().sign(&signed).await?;
        }

        info!(target: "coffee.lifecycle", "Applying bundles");
        let mut applied = Vec::with_capacity(PARTY_COUNT);
        for party in self.registry.parties() {
            applied.push(party.service().apply(&signed).await?);
        }
        self.registry.advance(into_pair(applied)?);

        self.publisher
            .publish_channel_objects(self.registry.channel_objects())
            .await;

        let hashes = bundle_hashes(&signed);
        self.publisher.publish_transactions(&hashes, reason).await;
        Ok(hashes)
    }

    /// Close the channel with the coffee machine's closing bundle.
    ///
    /// `finalize` is not called; attaching the settlement to the ledger is
    /// left to the channel services' operators.
    ///
    /// # Errors
    ///
    /// Any close, sign or apply failure.
    #[instrument(skip_all, name = "lifecycle.close")]
    pub async fn close(&mut self) -> Result<(), ControllerError> {
        let start = Instant::now();
        let result = self.run_close().await;
        metrics::record_operation("close", status_label(&result), start.elapsed());
        result
    }

    async fn run_close(&mut self) -> Result<(), ControllerError> {
        info!(target: "coffee.lifecycle", "Closing channel");
        let bundles = self.registry.local().service().close().await?;
        self.apply_and_sign(bundles, CLOSING_REASON).await?;
        self.set_state(LifecycleState::Closed).await;
        Ok(())
    }

    /// Record a failed operation: log it, wait, then set `ERROR`.
    pub async fn fail(&mut self, error: &ControllerError) {
        error!(
            target: "coffee.lifecycle",
            error = %error,
            kind = error.kind(),
            party = ?error.party(),
            state = %self.state,
            "Lifecycle operation failed"
        );
        self.set_terminal_state(LifecycleState::Error).await;
    }

    async fn set_state(&mut self, state: LifecycleState) {
        info!(target: "coffee.lifecycle", from = %self.state, to = %state, "Setting state");
        self.state = state;
        metrics::record_state_transition(state.as_str());
        self.publisher.publish_state(state).await;
    }

    /// Failure states are delayed so slow subscribers see them before the
    /// next command can be accepted.
    async fn set_terminal_state(&mut self, state: LifecycleState) {
        tokio::time::sleep(self.terminal_state_delay).await;
        self.set_state(state).await;
    }
}

fn status_label<T>(result: &Result<T, ControllerError>) -> &'static str {
    if result.is_ok() {
        "success"
    } else {
        "error"
    }
}
