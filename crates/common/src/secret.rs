//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used across the workspace. Channel
//! service passwords, bearer tokens and broker credentials are all held as
//! [`SecretString`], so any struct deriving `Debug` around them prints
//! `[REDACTED]` instead of the value.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct BrokerLogin {
//!     username: String,
//!     password: SecretString,
//! }
//!
//! let login = BrokerLogin {
//!     username: "coffeemachine".to_string(),
//!     password: SecretString::from("espresso"),
//! };
//!
//! assert!(!format!("{login:?}").contains("espresso"));
//! assert_eq!(login.password.expose_secret(), "espresso");
//! ```

pub use secrecy::{ExposeSecret, SecretString};
