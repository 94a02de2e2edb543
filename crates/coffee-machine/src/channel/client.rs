//! HTTP client for one party's Flash channel service.
//!
//! Every verb is a `POST` with a JSON body and the bearer token acquired at
//! startup. A status >= 400 is a hard failure for that call and is never
//! retried here; the lifecycle operation that issued it aborts.
//!
//! `init` stores the channel id the service assigns. All channel-scoped verbs
//! use it as the last path segment.

use crate::channel::object::ChannelObject;
use crate::config::ChannelServiceConfig;
use crate::errors::ControllerError;
use crate::observability::metrics;
use common::auth::acquire_token;
use common::secret::{ExposeSecret, SecretString};
use common::types::{ChannelId, PartyIndex};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, instrument, warn};

/// Connect timeout for channel services.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Transaction bundles as produced by `transfer`/`close` and accumulated by
/// `sign`. Opaque to the controller apart from hash extraction.
pub type Bundles = Value;

pub const VERB_INIT: &str = "init";
pub const VERB_MULTISIGNATURE: &str = "multisignature";
pub const VERB_SETTLEMENT_ADDRESS: &str = "settlement_address";
pub const VERB_SETTLEMENT: &str = "settlement";
pub const VERB_TRANSFER: &str = "transfer";
pub const VERB_SIGN: &str = "sign";
pub const VERB_APPLY: &str = "apply";
pub const VERB_FUND: &str = "fund";
pub const VERB_CLOSE: &str = "close";
pub const VERB_FINALIZE: &str = "finalize";

/// Parameters for opening a channel on one party's service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitParams {
    pub user_index: usize,
    pub index: u32,
    pub security: u8,
    pub depth: u8,
    pub signers_count: usize,
    pub balance: u64,
    pub deposit: Vec<u64>,
}

/// A single value transfer inside the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub value: u64,
    pub address: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitResponse {
    channel_id: ChannelId,
    flash: ChannelObject,
}

#[derive(Deserialize)]
struct SettlementAddressResponse {
    address: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FundResponse {
    bundle_hash: String,
}

/// The channel protocol verbs of one party (enables mocking).
#[async_trait::async_trait]
pub trait ChannelService: Send + Sync {
    /// Position of this party in the channel.
    fn party(&self) -> PartyIndex;

    /// Channel id assigned by `init`, if it ran.
    async fn channel_id(&self) -> Option<ChannelId>;

    /// Open the channel and remember the assigned id.
    async fn init(&self, params: &InitParams) -> Result<ChannelObject, ControllerError>;

    /// Hand every party's digests to this party to build multisig addresses.
    async fn multisignature(&self, all_digests: &[Vec<Value>]) -> Result<Value, ControllerError>;

    /// Fetch the ledger address this party settles to.
    async fn settlement_address(&self) -> Result<String, ControllerError>;

    /// Install the agreed settlement addresses (party order).
    async fn settlement(&self, addresses: &[String]) -> Result<ChannelObject, ControllerError>;

    /// Build unsigned bundles for the transfers.
    async fn transfer(&self, transfers: &[Transfer]) -> Result<Bundles, ControllerError>;

    /// Add this party's signatures to the bundles.
    async fn sign(&self, bundles: &Bundles) -> Result<Bundles, ControllerError>;

    /// Apply fully signed bundles.
    async fn apply(&self, signed_bundles: &Bundles) -> Result<ChannelObject, ControllerError>;

    /// Fund the channel deposit on the ledger, returning the bundle hash.
    async fn fund(&self) -> Result<String, ControllerError>;

    /// Build the closing bundles.
    async fn close(&self) -> Result<Bundles, ControllerError>;

    /// Attach the final settlement to the ledger.
    async fn finalize(&self) -> Result<Value, ControllerError>;
}

/// Build the HTTP client shared by token acquisition and channel calls.
///
/// # Errors
///
/// Returns `ControllerError::Internal` if the client cannot be built.
pub fn build_http_client(timeout: Duration) -> Result<Client, ControllerError> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .build()
        .map_err(|e| {
            error!(target: "coffee.channel.client", error = %e, "Failed to build HTTP client");
            ControllerError::Internal(format!("Failed to build HTTP client: {e}"))
        })
}

/// Authenticated client for one party's channel service.
pub struct ChannelClient {
    party: PartyIndex,
    http: Client,
    base_url: String,
    /// Bearer token (protected by `SecretString`).
    token: SecretString,
    channel_id: RwLock<Option<ChannelId>>,
}

impl ChannelClient {
    /// Acquire a token from the service and build the client.
    ///
    /// # Errors
    ///
    /// - `ControllerError::Authentication` - token acquisition failed
    /// - `ControllerError::Internal` - the HTTP client cannot be built
    #[instrument(skip_all, fields(party = %party, url = %config.url))]
    pub async fn connect(
        party: PartyIndex,
        config: &ChannelServiceConfig,
        timeout: Duration,
    ) -> Result<Self, ControllerError> {
        let http = build_http_client(timeout)?;
        let token = acquire_token(&http, &config.url, config.credentials.as_ref()).await?;

        debug!(target: "coffee.channel.client", party = %party, "Channel service authenticated");

        Ok(Self::with_token(party, http, config.url.clone(), token))
    }

    /// Build a client around an existing token.
    #[must_use]
    pub fn with_token(
        party: PartyIndex,
        http: Client,
        base_url: String,
        token: SecretString,
    ) -> Self {
        Self {
            party,
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            channel_id: RwLock::new(None),
        }
    }

    async fn channel_path(&self, verb: &'static str) -> Result<String, ControllerError> {
        match self.channel_id.read().await.as_ref() {
            Some(id) => Ok(format!("/flash/{verb}/{id}")),
            None => {
                warn!(
                    target: "coffee.channel.client",
                    party = %self.party,
                    verb = verb,
                    "Channel call before init"
                );
                Err(ControllerError::ChannelNotInitialised(self.party))
            }
        }
    }

    #[instrument(skip(self, body), fields(party = %self.party))]
    async fn post<B, R>(&self, verb: &'static str, path: &str, body: &B) -> Result<R, ControllerError>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        let start = Instant::now();

        let response = self
            .http
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.token.expose_secret()),
            )
            .json(body)
            .send()
            .await
            .map_err(|e| {
                metrics::record_remote_call(verb, "transport", start.elapsed());
                warn!(target: "coffee.channel.client", error = %e, url = %url, "Channel service request failed");
                ControllerError::Transport {
                    party: self.party,
                    verb,
                    message: e.to_string(),
                }
            })?;

        let result = self.handle_response(verb, response).await;
        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_remote_call(verb, status, start.elapsed());
        result
    }

    /// Map status codes to errors and parse the body.
    async fn handle_response<R: DeserializeOwned>(
        &self,
        verb: &'static str,
        response: reqwest::Response,
    ) -> Result<R, ControllerError> {
        let status = response.status();

        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            warn!(
                target: "coffee.channel.client",
                party = %self.party,
                verb = verb,
                status = %status,
                body = %body,
                "Channel service returned error status"
            );
            return Err(ControllerError::RemoteCallFailed {
                party: self.party,
                verb,
                status_code: status.as_u16(),
                body,
            });
        }

        response.json().await.map_err(|e| {
            warn!(target: "coffee.channel.client", party = %self.party, verb = verb, error = %e, "Failed to parse channel service response");
            ControllerError::InvalidResponse {
                party: self.party,
                verb,
                message: e.to_string(),
            }
        })
    }
}

#[async_trait::async_trait]
impl ChannelService for ChannelClient {
    fn party(&self) -> PartyIndex {
        self.party
    }

    async fn channel_id(&self) -> Option<ChannelId> {
        self.channel_id.read().await.clone()
    }

    async fn init(&self, params: &InitParams) -> Result<ChannelObject, ControllerError> {
        let response: InitResponse = self.post(VERB_INIT, "/flash/init", params).await?;

        debug!(
            target: "coffee.channel.client",
            party = %self.party,
            channel_id = %response.channel_id,
            "Channel opened"
        );
        *self.channel_id.write().await = Some(response.channel_id);
        Ok(response.flash)
    }

    async fn multisignature(&self, all_digests: &[Vec<Value>]) -> Result<Value, ControllerError> {
        let path = self.channel_path(VERB_MULTISIGNATURE).await?;
        self.post(VERB_MULTISIGNATURE, &path, &json!({ "allDigests": all_digests }))
            .await
    }

    async fn settlement_address(&self) -> Result<String, ControllerError> {
        let response: SettlementAddressResponse = self
            .post(VERB_SETTLEMENT_ADDRESS, "/flash/settlement_address", &json!({}))
            .await?;
        Ok(response.address)
    }

    async fn settlement(&self, addresses: &[String]) -> Result<ChannelObject, ControllerError> {
        let path = self.channel_path(VERB_SETTLEMENT).await?;
        self.post(
            VERB_SETTLEMENT,
            &path,
            &json!({ "settlementAddresses": addresses }),
        )
        .await
    }

    async fn transfer(&self, transfers: &[Transfer]) -> Result<Bundles, ControllerError> {
        let path = self.channel_path(VERB_TRANSFER).await?;
        self.post(VERB_TRANSFER, &path, &json!({ "transfers": transfers }))
            .await
    }

    async fn sign(&self, bundles: &Bundles) -> Result<Bundles, ControllerError> {
        let path = self.channel_path(VERB_SIGN).await?;
        self.post(VERB_SIGN, &path, &json!({ "bundles": bundles }))
            .await
    }

    async fn apply(&self, signed_bundles: &Bundles) -> Result<ChannelObject, ControllerError> {
        let path = self.channel_path(VERB_APPLY).await?;
        self.post(VERB_APPLY, &path, &json!({ "signedBundles": signed_bundles }))
            .await
    }

    async fn fund(&self) -> Result<String, ControllerError> {
        let path = self.channel_path(VERB_FUND).await?;
        let response: FundResponse = self.post(VERB_FUND, &path, &json!({})).await?;
        Ok(response.bundle_hash)
    }

    async fn close(&self) -> Result<Bundles, ControllerError> {
        let path = self.channel_path(VERB_CLOSE).await?;
        self.post(VERB_CLOSE, &path, &json!({})).await
    }

    async fn finalize(&self) -> Result<Value, ControllerError> {
        let path = self.channel_path(VERB_FINALIZE).await?;
        self.post(VERB_FINALIZE, &path, &json!({})).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, party: PartyIndex) -> ChannelClient {
        ChannelClient::with_token(
            party,
            build_http_client(Duration::from_secs(5)).unwrap(),
            server.uri(),
            SecretString::from("tok"),
        )
    }

    fn params() -> InitParams {
        InitParams {
            user_index: 0,
            index: 0,
            security: 2,
            depth: 4,
            signers_count: 2,
            balance: 4000,
            deposit: vec![2000, 2000],
        }
    }

    async fn mount_init(server: &MockServer, channel_id: &str) {
        Mock::given(method("POST"))
            .and(path("/flash/init"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "channelId": channel_id,
                "flash": {
                    "userIndex": 0,
                    "partialDigests": [{"digest": "D1"}, {"digest": "D2"}],
                    "flash": {"deposit": [2000, 2000]}
                }
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_init_sends_params_and_stores_channel_id() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/flash/init"))
            .and(header("authorization", "Bearer tok"))
            .and(body_json(json!({
                "userIndex": 0,
                "index": 0,
                "security": 2,
                "depth": 4,
                "signersCount": 2,
                "balance": 4000,
                "deposit": [2000, 2000]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "channelId": "chan-7",
                "flash": {"userIndex": 0, "partialDigests": [1, 2], "flash": {"deposit": [2000, 2000]}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, PartyIndex::LOCAL);
        assert_eq!(client.channel_id().await, None);

        let object = client.init(&params()).await.unwrap();

        assert_eq!(object.remaining_balance(), 2000);
        assert_eq!(object.digest_pool_size(), 2);
        assert_eq!(
            client.channel_id().await,
            Some(ChannelId::from("chan-7".to_string()))
        );
    }

    #[tokio::test]
    async fn test_channel_scoped_call_before_init_fails() {
        let server = MockServer::start().await;
        let client = client_for(&server, PartyIndex::PROVIDER);

        let err = client.sign(&json!([])).await.unwrap_err();
        assert!(matches!(
            err,
            ControllerError::ChannelNotInitialised(PartyIndex::PROVIDER)
        ));
    }

    #[tokio::test]
    async fn test_channel_id_is_used_in_path() {
        let server = MockServer::start().await;
        mount_init(&server, "abc").await;

        Mock::given(method("POST"))
            .and(path("/flash/multisignature/abc"))
            .and(body_json(json!({"allDigests": [["a"], ["b"]]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/flash/apply/abc"))
            .and(body_json(json!({"signedBundles": [[{"bundle": "H"}]]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "userIndex": 0,
                "partialDigests": [],
                "flash": {"deposit": [1700, 2300]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, PartyIndex::LOCAL);
        client.init(&params()).await.unwrap();

        client
            .multisignature(&[vec![json!("a")], vec![json!("b")]])
            .await
            .unwrap();
        let applied = client.apply(&json!([[{"bundle": "H"}]])).await.unwrap();
        assert_eq!(applied.remaining_balance(), 1700);
    }

    #[tokio::test]
    async fn test_settlement_address_and_fund_responses() {
        let server = MockServer::start().await;
        mount_init(&server, "c1").await;

        Mock::given(method("POST"))
            .and(path("/flash/settlement_address"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"address": "ADDRESS9ONE"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/flash/fund/c1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"bundleHash": "HASH9"})))
            .mount(&server)
            .await;

        let client = client_for(&server, PartyIndex::LOCAL);
        assert_eq!(client.settlement_address().await.unwrap(), "ADDRESS9ONE");

        client.init(&params()).await.unwrap();
        assert_eq!(client.fund().await.unwrap(), "HASH9");
    }

    #[tokio::test]
    async fn test_error_status_is_remote_call_failed() {
        let server = MockServer::start().await;
        mount_init(&server, "c2").await;

        Mock::given(method("POST"))
            .and(path("/flash/close/c2"))
            .respond_with(ResponseTemplate::new(409).set_body_string("channel busy"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, PartyIndex::PROVIDER);
        client.init(&params()).await.unwrap();

        let err = client.close().await.unwrap_err();
        assert!(matches!(
            &err,
            ControllerError::RemoteCallFailed {
                party: PartyIndex::PROVIDER,
                verb: VERB_CLOSE,
                status_code: 409,
                body,
            } if body == "channel busy"
        ));
    }

    #[tokio::test]
    async fn test_unparseable_body_is_invalid_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/flash/init"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = client_for(&server, PartyIndex::LOCAL);
        let err = client.init(&params()).await.unwrap_err();

        assert!(matches!(err, ControllerError::InvalidResponse { verb: "init", .. }));
        assert_eq!(client.channel_id().await, None);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        let server = MockServer::start().await;
        let uri = server.uri();
        drop(server);

        let client = ChannelClient::with_token(
            PartyIndex::LOCAL,
            build_http_client(Duration::from_secs(2)).unwrap(),
            uri,
            SecretString::from("tok"),
        );
        let err = client.settlement_address().await.unwrap_err();
        assert!(matches!(err, ControllerError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_connect_acquires_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "fresh"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/flash/settlement_address"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"address": "A"})))
            .expect(1)
            .mount(&server)
            .await;

        let config = ChannelServiceConfig {
            url: server.uri(),
            credentials: None,
        };
        let client = ChannelClient::connect(PartyIndex::LOCAL, &config, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(client.settlement_address().await.unwrap(), "A");
    }

    #[tokio::test]
    async fn test_connect_fails_when_token_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let config = ChannelServiceConfig {
            url: server.uri(),
            credentials: None,
        };
        let result =
            ChannelClient::connect(PartyIndex::PROVIDER, &config, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(ControllerError::Authentication(_))));
    }
}
