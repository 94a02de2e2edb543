//! Single-flight command dispatch.
//!
//! Admission is a non-blocking `try_lock_owned` on the controller, taken
//! before the handler task is spawned. The task owns the guard, so the lock
//! is released when the handler finishes, fails or panics, and at most one
//! handler task exists at any time. Commands arriving while the lock is held
//! are dropped and logged, never queued.

use super::command::Command;
use crate::lifecycle::{LifecycleController, PaymentOutcome};
use crate::observability::metrics;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What happened to a dispatched command.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// A handler task was spawned for the command.
    Accepted(JoinHandle<()>),
    /// Another operation was in flight; the command was discarded.
    Dropped,
}

impl DispatchOutcome {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, DispatchOutcome::Accepted(_))
    }
}

/// Hands commands to the controller, one at a time.
#[derive(Clone)]
pub struct CommandDispatcher {
    controller: Arc<Mutex<LifecycleController>>,
}

impl CommandDispatcher {
    #[must_use]
    pub fn new(controller: LifecycleController) -> Self {
        Self {
            controller: Arc::new(Mutex::new(controller)),
        }
    }

    /// Shared controller, for inspection once no command is in flight.
    #[must_use]
    pub fn controller(&self) -> Arc<Mutex<LifecycleController>> {
        Arc::clone(&self.controller)
    }

    /// Start `command` unless another one is running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn dispatch(&self, command: Command) -> DispatchOutcome {
        let Ok(guard) = Arc::clone(&self.controller).try_lock_owned() else {
            warn!(
                target: "coffee.ingress",
                command = command.name(),
                "Operation in flight, dropping command"
            );
            metrics::record_command(command.name(), "dropped");
            return DispatchOutcome::Dropped;
        };

        info!(target: "coffee.ingress", command = ?command, "Command accepted");
        metrics::record_command(command.name(), "accepted");
        DispatchOutcome::Accepted(tokio::spawn(run_command(guard, command)))
    }
}

/// Run one command to completion while holding the controller lock.
async fn run_command(mut controller: OwnedMutexGuard<LifecycleController>, command: Command) {
    let result = match command {
        Command::Init => controller.initialize().await,
        Command::Fund => controller.fund().await,
        Command::Close => controller.close().await,
        Command::Make(mode) => controller.pay(mode).await.map(|outcome| match outcome {
            PaymentOutcome::Paid {
                value,
                bundle_hashes,
            } => {
                info!(target: "coffee.ingress", value = value, bundles = bundle_hashes.len(), "Coffee paid");
            }
            other => debug!(target: "coffee.ingress", outcome = ?other, "Coffee not paid"),
        }),
    };

    match result {
        Ok(()) => metrics::record_command(command.name(), "succeeded"),
        Err(e) => {
            metrics::record_command(command.name(), "failed");
            controller.fail(&e).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::channel::client::{VERB_FUND, VERB_INIT, VERB_TRANSFER};
    use crate::channel::mock::{CallLog, MockChannelService};
    use crate::channel::ChannelRegistry;
    use crate::config::ProtocolConfig;
    use crate::lifecycle::{CoffeeMode, LifecycleState};
    use crate::publisher::mock::RecordingSink;
    use crate::publisher::StatePublisher;
    use common::types::PartyIndex;
    use std::time::Duration;

    fn dispatcher(
        configure: impl Fn(MockChannelService) -> MockChannelService,
    ) -> (CommandDispatcher, CallLog, Arc<RecordingSink>) {
        let log = CallLog::new();
        let registry = ChannelRegistry::new(
            Arc::new(configure(MockChannelService::new(PartyIndex::LOCAL, log.clone()))),
            Arc::new(configure(MockChannelService::new(
                PartyIndex::PROVIDER,
                log.clone(),
            ))),
        )
        .unwrap();
        let sink = Arc::new(RecordingSink::new());
        let controller = LifecycleController::new(
            registry,
            StatePublisher::new(sink.clone(), "coffee"),
            ProtocolConfig {
                security: 2,
                tree_depth: 4,
                balance: 20_000_000,
                deposit: vec![10_000_000, 10_000_000],
                coffee_price: 300_000,
            },
            Duration::from_secs(1),
        );
        (CommandDispatcher::new(controller), log, sink)
    }

    async fn finish(outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Accepted(handle) => handle.await.unwrap(),
            DispatchOutcome::Dropped => {}
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_while_in_flight_are_dropped() {
        let (dispatcher, log, _sink) =
            dispatcher(|m| m.with_delay(Duration::from_millis(500)));

        let first = dispatcher.dispatch(Command::Init);
        let second = dispatcher.dispatch(Command::Fund);
        let third = dispatcher.dispatch(Command::Init);

        assert!(first.is_accepted());
        assert!(matches!(second, DispatchOutcome::Dropped));
        assert!(matches!(third, DispatchOutcome::Dropped));

        finish(first).await;

        // One initialize ran (one init per party); the fund was never queued.
        assert_eq!(log.count(VERB_INIT), 2);
        assert_eq!(log.count(VERB_FUND), 0);
        let state = dispatcher.controller().lock().await.state();
        assert_eq!(state, LifecycleState::Initialised);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_released_after_completion() {
        let (dispatcher, log, _sink) = dispatcher(|m| m);

        finish(dispatcher.dispatch(Command::Init)).await;
        let fund = dispatcher.dispatch(Command::Fund);
        assert!(fund.is_accepted());
        finish(fund).await;

        assert_eq!(log.count(VERB_FUND), 2);
        let state = dispatcher.controller().lock().await.state();
        assert_eq!(state, LifecycleState::Funded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_sets_error_and_releases_lock() {
        let (dispatcher, log, sink) = dispatcher(|m| m.failing_on(VERB_INIT));

        let first = dispatcher.dispatch(Command::Init);
        // Still held during the terminal-state delay
        assert!(matches!(
            dispatcher.dispatch(Command::Init),
            DispatchOutcome::Dropped
        ));
        finish(first).await;

        assert_eq!(sink.states(), vec!["INITIALISING", "ERROR"]);
        assert_eq!(log.count(VERB_INIT), 1);

        // The next command may retry
        let retry = dispatcher.dispatch(Command::Init);
        assert!(retry.is_accepted());
        finish(retry).await;
        assert_eq!(log.count(VERB_INIT), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_make_before_init_ends_in_error() {
        let (dispatcher, log, sink) = dispatcher(|m| m);

        finish(dispatcher.dispatch(Command::Make(CoffeeMode::Single))).await;

        assert_eq!(log.count(VERB_TRANSFER), 0);
        assert_eq!(sink.states(), vec!["ERROR"]);
    }
}
