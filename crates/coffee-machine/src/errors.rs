//! Coffee machine controller error types.
//!
//! Every error raised inside a lifecycle operation surfaces at the command
//! dispatch boundary, where it is logged and turned into the `ERROR` state.
//! Observers never see these values directly, only the state name.

use common::auth::TokenError;
use common::types::PartyIndex;
use thiserror::Error;

/// Controller error type.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Channel service answered with an HTTP status >= 400.
    #[error("Remote call {verb} to party {party} failed with status {status_code}: {body}")]
    RemoteCallFailed {
        party: PartyIndex,
        verb: &'static str,
        status_code: u16,
        body: String,
    },

    /// Channel service could not be reached (connect error, timeout).
    #[error("Transport error calling {verb} on party {party}: {message}")]
    Transport {
        party: PartyIndex,
        verb: &'static str,
        message: String,
    },

    /// Channel service answered 2xx with a body we cannot interpret.
    #[error("Invalid {verb} response from party {party}: {message}")]
    InvalidResponse {
        party: PartyIndex,
        verb: &'static str,
        message: String,
    },

    /// A channel-scoped call was made before `init` assigned a channel id,
    /// or a party has no channel object yet.
    #[error("Channel not initialised for party {0}")]
    ChannelNotInitialised(PartyIndex),

    /// Bearer token acquisition failed at startup.
    #[error("Authentication failed: {0}")]
    Authentication(#[from] TokenError),

    /// Message bus failure.
    #[error("Message bus error: {0}")]
    Bus(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ControllerError {
    /// Bounded label for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ControllerError::RemoteCallFailed { .. } => "remote_call_failed",
            ControllerError::Transport { .. } => "transport",
            ControllerError::InvalidResponse { .. } => "invalid_response",
            ControllerError::ChannelNotInitialised(_) => "not_initialised",
            ControllerError::Authentication(_) => "authentication",
            ControllerError::Bus(_) => "bus",
            ControllerError::Config(_) => "config",
            ControllerError::Internal(_) => "internal",
        }
    }

    /// The party whose service produced this error, if any.
    #[must_use]
    pub fn party(&self) -> Option<PartyIndex> {
        match self {
            ControllerError::RemoteCallFailed { party, .. }
            | ControllerError::Transport { party, .. }
            | ControllerError::InvalidResponse { party, .. }
            | ControllerError::ChannelNotInitialised(party) => Some(*party),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formatting() {
        let err = ControllerError::RemoteCallFailed {
            party: PartyIndex::PROVIDER,
            verb: "apply",
            status_code: 409,
            body: "bundle rejected".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Remote call apply to party 1 (provider) failed with status 409: bundle rejected"
        );

        assert_eq!(
            ControllerError::ChannelNotInitialised(PartyIndex::LOCAL).to_string(),
            "Channel not initialised for party 0 (local)"
        );
    }

    #[test]
    fn test_token_error_conversion() {
        let err: ControllerError = TokenError::AuthenticationRejected("Status 401".into()).into();
        assert!(matches!(err, ControllerError::Authentication(_)));
        assert_eq!(err.kind(), "authentication");
        assert_eq!(err.party(), None);
    }

    #[test]
    fn test_party_extraction() {
        let err = ControllerError::Transport {
            party: PartyIndex::LOCAL,
            verb: "sign",
            message: "connection refused".to_string(),
        };
        assert_eq!(err.party(), Some(PartyIndex::LOCAL));
        assert_eq!(err.kind(), "transport");

        assert_eq!(ControllerError::Bus("closed".into()).party(), None);
    }
}
