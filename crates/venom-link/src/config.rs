use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::client::StreamConfig;
use crate::command::{CommandChannelConfig, DEFAULT_COMMAND_TIMEOUT_MS};
use crate::endpoint::{
    DEFAULT_DEV_PORT, DEFAULT_SERVICE_PORT, Endpoints, PageOrigin, PortRule, ResolveError, resolve,
};

pub const ENV_ORIGIN: &str = "VENOM_ORIGIN";
pub const ENV_DEV_PORT: &str = "VENOM_DEV_PORT";
pub const ENV_SERVICE_PORT: &str = "VENOM_SERVICE_PORT";
pub const ENV_RECONNECT_DELAY_MS: &str = "VENOM_RECONNECT_DELAY_MS";
pub const ENV_CONNECT_TIMEOUT_MS: &str = "VENOM_CONNECT_TIMEOUT_MS";
pub const ENV_COMMAND_TIMEOUT_MS: &str = "VENOM_COMMAND_TIMEOUT_MS";
pub const ENV_TOKEN: &str = "VENOM_TOKEN";

const DEFAULT_RECONNECT_DELAY_MS: u64 = 2_000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

#[derive(Clone, Debug)]
pub struct LinkConfig {
    pub origin: PageOrigin,
    pub port_rule: PortRule,
    pub reconnect_delay_ms: u64,
    pub connect_timeout_ms: u64,
    pub command_timeout_ms: u64,
    pub bearer_token: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("VENOM_ORIGIN is not set")]
    MissingOrigin,
    #[error("invalid VENOM_ORIGIN: {0}")]
    InvalidOrigin(#[from] ResolveError),
    #[error("invalid VENOM_DEV_PORT: {0}")]
    InvalidDevPort(String),
    #[error("invalid VENOM_SERVICE_PORT: {0}")]
    InvalidServicePort(String),
    #[error("invalid VENOM_RECONNECT_DELAY_MS: {0}")]
    InvalidReconnectDelayMs(String),
    #[error("invalid VENOM_CONNECT_TIMEOUT_MS: {0}")]
    InvalidConnectTimeoutMs(String),
    #[error("invalid VENOM_COMMAND_TIMEOUT_MS: {0}")]
    InvalidCommandTimeoutMs(String),
}

impl LinkConfig {
    /// Defaults for everything but the origin.
    pub fn new(origin: PageOrigin) -> Self {
        Self {
            origin,
            port_rule: PortRule::default(),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            bearer_token: None,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let origin = lookup(ENV_ORIGIN)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::MissingOrigin)?;
        let origin = PageOrigin::parse(&origin)?;

        let dev_port = parse_or(&lookup, ENV_DEV_PORT, DEFAULT_DEV_PORT)
            .map_err(ConfigError::InvalidDevPort)?;
        let service_port = parse_or(&lookup, ENV_SERVICE_PORT, DEFAULT_SERVICE_PORT)
            .map_err(ConfigError::InvalidServicePort)?;
        let reconnect_delay_ms =
            parse_or(&lookup, ENV_RECONNECT_DELAY_MS, DEFAULT_RECONNECT_DELAY_MS)
                .map_err(ConfigError::InvalidReconnectDelayMs)?;
        if reconnect_delay_ms == 0 {
            return Err(ConfigError::InvalidReconnectDelayMs(
                "must be greater than zero".to_string(),
            ));
        }
        let connect_timeout_ms =
            parse_or(&lookup, ENV_CONNECT_TIMEOUT_MS, DEFAULT_CONNECT_TIMEOUT_MS)
                .map_err(ConfigError::InvalidConnectTimeoutMs)?;
        let command_timeout_ms =
            parse_or(&lookup, ENV_COMMAND_TIMEOUT_MS, DEFAULT_COMMAND_TIMEOUT_MS)
                .map_err(ConfigError::InvalidCommandTimeoutMs)?;
        let bearer_token = lookup(ENV_TOKEN)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Ok(Self {
            origin,
            port_rule: PortRule {
                dev_port,
                service_port,
            },
            reconnect_delay_ms,
            connect_timeout_ms,
            command_timeout_ms,
            bearer_token,
        })
    }

    pub fn endpoints(&self) -> Result<Endpoints, ResolveError> {
        resolve(&self.origin, self.port_rule)
    }

    pub fn stream_config(&self, endpoints: &Endpoints) -> StreamConfig {
        StreamConfig::new(endpoints.stream.clone())
            .with_reconnect_delay(Duration::from_millis(self.reconnect_delay_ms))
            .with_connect_timeout(Duration::from_millis(self.connect_timeout_ms))
    }

    pub fn command_config(&self, endpoints: &Endpoints) -> CommandChannelConfig {
        CommandChannelConfig::new(endpoints)
            .with_timeout_ms(self.command_timeout_ms)
            .with_bearer_token(self.bearer_token.clone())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, String>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
    {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|error| format!("{raw}: {error}")),
        None => Ok(default),
    }
}
