//! Bearer token acquisition for Flash channel services.
//!
//! Each channel service issues an API token from `POST /token`. The token is
//! requested once at startup, optionally with HTTP basic credentials, and then
//! attached as `Authorization: Bearer <token>` to every channel call.
//!
//! There is no refresh loop: channel service tokens live as long as the
//! service process, and a failed acquisition is fatal to startup.
//!
//! # Example
//!
//! ```rust,ignore
//! use common::auth::{acquire_token, BasicCredentials};
//! use common::secret::{ExposeSecret, SecretString};
//!
//! let http = reqwest::Client::new();
//! let credentials = BasicCredentials::new("coffee".to_string(), SecretString::from("pw"));
//! let token = acquire_token(&http, "http://localhost:3000", Some(&credentials)).await?;
//! let header = format!("Bearer {}", token.expose_secret());
//! ```

use crate::secret::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

/// Path of the token endpoint, relative to the service base URL.
pub const TOKEN_PATH: &str = "/token";

/// Errors that can occur while acquiring a bearer token.
#[derive(Error, Debug, Clone)]
pub enum TokenError {
    /// Token acquisition failed.
    #[error("Token acquisition failed: {0}")]
    AcquisitionFailed(String),

    /// HTTP transport error or unexpected status.
    #[error("HTTP client error: {0}")]
    HttpError(String),

    /// Credentials rejected by the service (401, 403, 400).
    #[error("Authentication rejected: {0}")]
    AuthenticationRejected(String),

    /// Token response parsing failed.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),
}

/// Optional HTTP basic credentials for the token endpoint.
#[derive(Clone)]
pub struct BasicCredentials {
    /// Basic auth username.
    pub username: String,

    /// Basic auth password (as `SecretString`).
    pub password: SecretString,
}

impl BasicCredentials {
    /// Create credentials from a username and password.
    #[must_use]
    pub fn new(username: String, password: SecretString) -> Self {
        Self { username, password }
    }
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Token response body from a channel service.
#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Acquire a bearer token from a channel service.
///
/// # Errors
///
/// - `TokenError::HttpError` - transport failure or 5xx/unexpected status
/// - `TokenError::AuthenticationRejected` - 400, 401 or 403
/// - `TokenError::InvalidResponse` - body is not `{"token": "..."}`
/// - `TokenError::AcquisitionFailed` - the service returned an empty token
#[instrument(skip_all, fields(base_url = %base_url))]
pub async fn acquire_token(
    http_client: &reqwest::Client,
    base_url: &str,
    credentials: Option<&BasicCredentials>,
) -> Result<SecretString, TokenError> {
    let url = format!("{}{TOKEN_PATH}", base_url.trim_end_matches('/'));

    debug!(
        target: "common.auth",
        url = %url,
        basic_auth = credentials.is_some(),
        "Requesting channel service token"
    );

    let mut request = http_client.post(&url).json(&serde_json::json!({}));
    if let Some(credentials) = credentials {
        request = request.basic_auth(
            &credentials.username,
            Some(credentials.password.expose_secret()),
        );
    }

    let response = request.send().await.map_err(|e| {
        debug!(target: "common.auth", error = %e, "HTTP request failed");
        TokenError::HttpError(e.to_string())
    })?;

    let status = response.status();

    if status.is_success() {
        let body: TokenResponse = response.json().await.map_err(|e| {
            warn!(target: "common.auth", error = %e, "Failed to parse token response");
            TokenError::InvalidResponse(e.to_string())
        })?;

        if body.token.is_empty() {
            return Err(TokenError::AcquisitionFailed(
                "Service returned an empty token".into(),
            ));
        }

        debug!(target: "common.auth", "Token acquired successfully");
        Ok(SecretString::from(body.token))
    } else if matches!(status.as_u16(), 400 | 401 | 403) {
        let body = response.text().await.unwrap_or_else(|e| {
            trace!(target: "common.auth", error = %e, "Failed to read error response body");
            "<failed to read body>".to_string()
        });
        warn!(target: "common.auth", status = %status, "Authentication rejected by channel service");
        // Body may echo credentials; trace level only.
        trace!(target: "common.auth", body = %body, "Authentication rejection response body");
        Err(TokenError::AuthenticationRejected(format!("Status {status}")))
    } else {
        warn!(target: "common.auth", status = %status, "Unexpected token endpoint response");
        Err(TokenError::HttpError(format!("Unexpected status: {status}")))
    }
}
