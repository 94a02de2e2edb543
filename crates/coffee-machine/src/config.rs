//! Coffee machine configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use common::auth::BasicCredentials;
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default MQTT broker host.
pub const DEFAULT_MQTT_HOST: &str = "localhost";

/// Default MQTT broker port.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default MQTT keep-alive in seconds.
pub const DEFAULT_MQTT_KEEP_ALIVE_SECONDS: u64 = 600;

/// Default MQTT client id prefix.
pub const DEFAULT_MQTT_CLIENT_ID_PREFIX: &str = "coffeemachine";

/// Default topic prefix for commands and state.
pub const DEFAULT_TOPIC_PREFIX: &str = "coffee";

/// Default Flash security level.
pub const DEFAULT_SECURITY: u8 = 2;

/// Default Flash merkle tree depth.
pub const DEFAULT_TREE_DEPTH: u8 = 4;

/// Default total channel balance.
pub const DEFAULT_BALANCE: u64 = 20_000_000;

/// Default price of a single coffee.
pub const DEFAULT_COFFEE_PRICE: u64 = 300_000;

/// Default delay before a terminal failure state is published.
pub const DEFAULT_TERMINAL_STATE_DELAY_MS: u64 = 1000;

/// Default channel service request timeout. Bundle signing on the
/// service side can take a while, so this is generous.
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 120;

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Number of parties in a channel.
pub const PARTY_COUNT: usize = 2;

/// Endpoint of one party's channel service.
#[derive(Clone, Debug)]
pub struct ChannelServiceConfig {
    /// Base URL, e.g. `http://localhost:3000`.
    pub url: String,

    /// Optional basic auth for the token endpoint (password redacted in Debug).
    pub credentials: Option<BasicCredentials>,
}

/// MQTT broker connection settings.
#[derive(Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    /// Protected by `SecretString` to prevent accidental logging.
    pub password: Option<SecretString>,
    pub client_id: String,
    pub keep_alive_seconds: u64,
}

impl fmt::Debug for MqttConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field("keep_alive_seconds", &self.keep_alive_seconds)
            .finish()
    }
}

/// Fixed Flash protocol constants shared by both parties.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Security level of generated addresses.
    pub security: u8,
    /// Depth of the multisignature merkle tree.
    pub tree_depth: u8,
    /// Total channel balance.
    pub balance: u64,
    /// Per-party deposit, in party order. Sums to `balance`.
    pub deposit: Vec<u64>,
    /// Price of a single coffee.
    pub coffee_price: u64,
}

/// Coffee machine configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Channel service of the coffee machine itself (party 0).
    pub coffee_service: ChannelServiceConfig,

    /// Channel service of the provider (party 1).
    pub provider_service: ChannelServiceConfig,

    /// MQTT broker settings.
    pub mqtt: MqttConfig,

    /// Prefix for all command and state topics (default: "coffee").
    pub topic_prefix: String,

    /// Flash protocol constants.
    pub protocol: ProtocolConfig,

    /// Delay before `ERROR`, `NO_FUNDS` and `NO_ADDRESSES_LEFT` are published.
    pub terminal_state_delay: Duration,

    /// Channel service request timeout.
    pub http_timeout: Duration,

    /// Health endpoint bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let coffee_service = channel_service(vars, "FLASH_COFFEE")?;
        let provider_service = channel_service(vars, "FLASH_PROVIDER")?;

        let mqtt = MqttConfig {
            host: vars
                .get("MQTT_HOST")
                .cloned()
                .unwrap_or_else(|| DEFAULT_MQTT_HOST.to_string()),
            port: parse_or(vars, "MQTT_PORT", DEFAULT_MQTT_PORT)?,
            username: vars.get("MQTT_USERNAME").cloned(),
            password: vars.get("MQTT_PASSWORD").cloned().map(SecretString::from),
            client_id: vars.get("MQTT_CLIENT_ID").cloned().unwrap_or_else(|| {
                let uuid_suffix = uuid::Uuid::new_v4().simple().to_string();
                let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
                format!("{DEFAULT_MQTT_CLIENT_ID_PREFIX}-{short_suffix}")
            }),
            keep_alive_seconds: parse_or(
                vars,
                "MQTT_KEEP_ALIVE_SECONDS",
                DEFAULT_MQTT_KEEP_ALIVE_SECONDS,
            )?,
        };

        let topic_prefix = vars
            .get("COFFEE_TOPIC_PREFIX")
            .map(|p| p.trim_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_TOPIC_PREFIX.to_string());
        if topic_prefix.is_empty() {
            return Err(ConfigError::InvalidValue(
                "COFFEE_TOPIC_PREFIX must not be empty".to_string(),
            ));
        }

        let balance: u64 = parse_or(vars, "FLASH_BALANCE", DEFAULT_BALANCE)?;
        let deposit = match vars.get("FLASH_DEPOSIT") {
            Some(raw) => parse_deposit(raw, balance)?,
            None => even_split(balance),
        };

        let protocol = ProtocolConfig {
            security: parse_or(vars, "FLASH_SECURITY", DEFAULT_SECURITY)?,
            tree_depth: parse_or(vars, "FLASH_TREE_DEPTH", DEFAULT_TREE_DEPTH)?,
            balance,
            deposit,
            coffee_price: parse_or(vars, "COFFEE_PRICE", DEFAULT_COFFEE_PRICE)?,
        };
        if protocol.coffee_price == 0 {
            return Err(ConfigError::InvalidValue(
                "COFFEE_PRICE must be greater than zero".to_string(),
            ));
        }

        let terminal_state_delay = Duration::from_millis(parse_or(
            vars,
            "TERMINAL_STATE_DELAY_MS",
            DEFAULT_TERMINAL_STATE_DELAY_MS,
        )?);

        let http_timeout = Duration::from_secs(parse_or(
            vars,
            "FLASH_HTTP_TIMEOUT_SECONDS",
            DEFAULT_HTTP_TIMEOUT_SECONDS,
        )?);

        let health_bind_address = vars
            .get("HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        Ok(Config {
            coffee_service,
            provider_service,
            mqtt,
            topic_prefix,
            protocol,
            terminal_state_delay,
            http_timeout,
            health_bind_address,
        })
    }

    /// Channel service endpoints in party order.
    #[must_use]
    pub fn channel_services(&self) -> [&ChannelServiceConfig; PARTY_COUNT] {
        [&self.coffee_service, &self.provider_service]
    }
}

fn channel_service(
    vars: &HashMap<String, String>,
    prefix: &str,
) -> Result<ChannelServiceConfig, ConfigError> {
    let url_var = format!("{prefix}_URL");
    let url = vars
        .get(&url_var)
        .ok_or_else(|| ConfigError::MissingEnvVar(url_var.clone()))?
        .trim_end_matches('/')
        .to_string();

    let credentials = vars.get(&format!("{prefix}_USERNAME")).map(|username| {
        let password = vars
            .get(&format!("{prefix}_PASSWORD"))
            .cloned()
            .unwrap_or_default();
        BasicCredentials::new(username.clone(), SecretString::from(password))
    });

    Ok(ChannelServiceConfig { url, credentials })
}

fn parse_or<T: FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{key}={raw}"))),
        None => Ok(default),
    }
}

fn even_split(balance: u64) -> Vec<u64> {
    let half = balance / 2;
    vec![balance - half, half]
}

fn parse_deposit(raw: &str, balance: u64) -> Result<Vec<u64>, ConfigError> {
    let deposit = raw
        .split(',')
        .map(|part| part.trim().parse::<u64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ConfigError::InvalidValue(format!("FLASH_DEPOSIT={raw}")))?;

    if deposit.len() != PARTY_COUNT {
        return Err(ConfigError::InvalidValue(format!(
            "FLASH_DEPOSIT needs {PARTY_COUNT} entries, got {}",
            deposit.len()
        )));
    }
    if deposit.iter().sum::<u64>() != balance {
        return Err(ConfigError::InvalidValue(format!(
            "FLASH_DEPOSIT must sum to FLASH_BALANCE ({balance})"
        )));
    }
    Ok(deposit)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            (
                "FLASH_COFFEE_URL".to_string(),
                "http://localhost:3000".to_string(),
            ),
            (
                "FLASH_PROVIDER_URL".to_string(),
                "http://localhost:3001/".to_string(),
            ),
        ])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.coffee_service.url, "http://localhost:3000");
        // Trailing slash stripped
        assert_eq!(config.provider_service.url, "http://localhost:3001");
        assert!(config.coffee_service.credentials.is_none());
        assert_eq!(config.mqtt.host, DEFAULT_MQTT_HOST);
        assert_eq!(config.mqtt.port, DEFAULT_MQTT_PORT);
        assert!(config.mqtt.client_id.starts_with("coffeemachine-"));
        assert_eq!(config.topic_prefix, "coffee");
        assert_eq!(config.protocol.security, DEFAULT_SECURITY);
        assert_eq!(config.protocol.tree_depth, DEFAULT_TREE_DEPTH);
        assert_eq!(config.protocol.balance, 20_000_000);
        assert_eq!(config.protocol.deposit, vec![10_000_000, 10_000_000]);
        assert_eq!(config.protocol.coffee_price, 300_000);
        assert_eq!(config.terminal_state_delay, Duration::from_secs(1));
        assert_eq!(config.http_timeout, Duration::from_secs(120));
        assert_eq!(config.health_bind_address, DEFAULT_HEALTH_BIND_ADDRESS);
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("FLASH_COFFEE_USERNAME".to_string(), "coffee".to_string());
        vars.insert("FLASH_COFFEE_PASSWORD".to_string(), "beans".to_string());
        vars.insert("MQTT_HOST".to_string(), "broker.local".to_string());
        vars.insert("MQTT_PORT".to_string(), "8883".to_string());
        vars.insert("MQTT_USERNAME".to_string(), "machine".to_string());
        vars.insert("MQTT_PASSWORD".to_string(), "mqtt-pw".to_string());
        vars.insert("MQTT_CLIENT_ID".to_string(), "coffeemachine".to_string());
        vars.insert("COFFEE_TOPIC_PREFIX".to_string(), "/kitchen/".to_string());
        vars.insert("FLASH_SECURITY".to_string(), "1".to_string());
        vars.insert("FLASH_TREE_DEPTH".to_string(), "3".to_string());
        vars.insert("FLASH_BALANCE".to_string(), "4000".to_string());
        vars.insert("FLASH_DEPOSIT".to_string(), "4000, 0".to_string());
        vars.insert("COFFEE_PRICE".to_string(), "20".to_string());
        vars.insert("TERMINAL_STATE_DELAY_MS".to_string(), "250".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        let creds = config.coffee_service.credentials.as_ref().unwrap();
        assert_eq!(creds.username, "coffee");
        assert_eq!(creds.password.expose_secret(), "beans");
        assert_eq!(config.mqtt.host, "broker.local");
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.mqtt.client_id, "coffeemachine");
        assert_eq!(config.topic_prefix, "kitchen");
        assert_eq!(
            config.protocol,
            ProtocolConfig {
                security: 1,
                tree_depth: 3,
                balance: 4000,
                deposit: vec![4000, 0],
                coffee_price: 20,
            }
        );
        assert_eq!(config.terminal_state_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_from_vars_missing_provider_url() {
        let mut vars = base_vars();
        vars.remove("FLASH_PROVIDER_URL");

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "FLASH_PROVIDER_URL"));
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let mut vars = base_vars();
        vars.insert("COFFEE_PRICE".to_string(), "a lot".to_string());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_zero_price_is_rejected() {
        let mut vars = base_vars();
        vars.insert("COFFEE_PRICE".to_string(), "0".to_string());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_deposit_must_match_balance_and_party_count() {
        let mut vars = base_vars();
        vars.insert("FLASH_BALANCE".to_string(), "100".to_string());

        vars.insert("FLASH_DEPOSIT".to_string(), "60,30".to_string());
        assert!(Config::from_vars(&vars).is_err());

        vars.insert("FLASH_DEPOSIT".to_string(), "50,25,25".to_string());
        assert!(Config::from_vars(&vars).is_err());

        vars.insert("FLASH_DEPOSIT".to_string(), "70,30".to_string());
        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.protocol.deposit, vec![70, 30]);
    }

    #[test]
    fn test_odd_balance_split_keeps_total() {
        assert_eq!(even_split(5), vec![3, 2]);
        assert_eq!(even_split(0), vec![0, 0]);
    }

    #[test]
    fn test_debug_redacts_sensitive_fields() {
        let mut vars = base_vars();
        vars.insert("FLASH_PROVIDER_USERNAME".to_string(), "prov".to_string());
        vars.insert("FLASH_PROVIDER_PASSWORD".to_string(), "prov-secret".to_string());
        vars.insert("MQTT_PASSWORD".to_string(), "mqtt-secret".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");
        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("prov-secret"));
        assert!(!debug_output.contains("mqtt-secret"));
    }
}
