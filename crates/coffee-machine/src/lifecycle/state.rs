//! Lifecycle states of the channel.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Process-wide channel lifecycle state, published by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Uninitialised,
    Initialising,
    Initialised,
    Funding,
    Funded,
    Closing,
    Closed,
    NoFunds,
    NoAddressesLeft,
    Error,
}

impl LifecycleState {
    /// Published name, also used as the metric label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Uninitialised => "UNINITIALISED",
            LifecycleState::Initialising => "INITIALISING",
            LifecycleState::Initialised => "INITIALISED",
            LifecycleState::Funding => "FUNDING",
            LifecycleState::Funded => "FUNDED",
            LifecycleState::Closing => "CLOSING",
            LifecycleState::Closed => "CLOSED",
            LifecycleState::NoFunds => "NO_FUNDS",
            LifecycleState::NoAddressesLeft => "NO_ADDRESSES_LEFT",
            LifecycleState::Error => "ERROR",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
