//! Identifier types for Flash channel parties.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a party inside a two-party Flash channel.
///
/// Index 0 is always the local device, index 1 the external provider. The
/// same ordering is used for digest exchange, settlement addresses and
/// signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyIndex(pub usize);

impl PartyIndex {
    /// The coffee machine itself.
    pub const LOCAL: PartyIndex = PartyIndex(0);

    /// The provider operating the coffee machine.
    pub const PROVIDER: PartyIndex = PartyIndex(1);

    /// Human-readable role, used as a bounded metric/log label.
    #[must_use]
    pub fn role(self) -> &'static str {
        match self.0 {
            0 => "local",
            1 => "provider",
            _ => "other",
        }
    }
}

impl fmt::Display for PartyIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.role())
    }
}

/// Channel identifier assigned by a party's channel service on init.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub String);

impl ChannelId {
    /// Borrow the identifier as a path segment.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ChannelId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
