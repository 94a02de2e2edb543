//! Coffee sizes, payment outcomes and bundle hash extraction.

use crate::channel::Bundles;
use serde_json::Value;
use std::fmt;

/// Requested coffee size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoffeeMode {
    Single,
    Double,
}

impl CoffeeMode {
    /// `"single"` is a single; any other payload is a double.
    #[must_use]
    pub fn parse(payload: &str) -> Self {
        if payload == "single" {
            CoffeeMode::Single
        } else {
            CoffeeMode::Double
        }
    }

    /// Number of unit prices charged.
    #[must_use]
    pub fn cups(self) -> u64 {
        match self {
            CoffeeMode::Single => 1,
            CoffeeMode::Double => 2,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CoffeeMode::Single => "single",
            CoffeeMode::Double => "double",
        }
    }
}

impl fmt::Display for CoffeeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a payment attempt that did not fail outright.
///
/// The precondition failures are deliberate terminal states, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Transfer signed and applied by both parties.
    Paid { value: u64, bundle_hashes: Vec<String> },
    /// Local balance below the requested value.
    NoFunds { value: u64, balance: u64 },
    /// Only the address reserved for closing is left.
    NoAddressesLeft { digest_pool_size: usize },
}

/// Hash of every bundle: the `bundle` field of its first transaction.
///
/// Bundles that are not a non-empty array of objects carrying a string
/// `bundle` field contribute nothing.
#[must_use]
pub fn bundle_hashes(bundles: &Bundles) -> Vec<String> {
    bundles
        .as_array()
        .map(|bundles| {
            bundles
                .iter()
                .filter_map(|bundle| bundle.as_array()?.first()?.get("bundle").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
