use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::endpoint::Endpoints;
use crate::state::SystemState;

pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone)]
pub struct CommandChannelConfig {
    pub command_url: Url,
    pub state_url: Url,
    pub health_url: Url,
    pub timeout_ms: u64,
    pub bearer_token: Option<String>,
}

impl CommandChannelConfig {
    #[must_use]
    pub fn new(endpoints: &Endpoints) -> Self {
        Self {
            command_url: endpoints.command.clone(),
            state_url: endpoints.state.clone(),
            health_url: endpoints.health.clone(),
            timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            bearer_token: None,
        }
    }

    #[must_use]
    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token.and_then(non_empty_string);
        self
    }

    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command_client_build_failed:{message}")]
    Build { message: String },
    #[error("command_request_failed:{message}")]
    Request { message: String },
    #[error("command_read_failed:{message}")]
    Read { message: String },
    #[error("command_http_{status}:{body}")]
    Http { status: StatusCode, body: String },
    #[error("command_json_decode_failed:{message}")]
    Decode { message: String },
}

#[derive(Debug, Serialize)]
struct CommandRequest<'a> {
    text: &'a str,
}

/// Backend acknowledgement. Every field is optional; the body is not part of
/// the contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CommandAck {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub input: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Blank input; nothing was sent.
    Skipped,
    Sent(CommandAck),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub service: Option<String>,
}

/// One-shot HTTP calls to the backend. Independent of the stream connection.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    config: CommandChannelConfig,
    timeout: Duration,
    http: reqwest::Client,
}

impl CommandChannel {
    pub fn new(config: CommandChannelConfig) -> Result<Self, CommandError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|error| CommandError::Build {
                message: error.to_string(),
            })?;
        Ok(Self {
            timeout: Duration::from_millis(config.timeout_ms),
            config,
            http,
        })
    }

    pub fn command_url(&self) -> &Url {
        &self.config.command_url
    }

    /// Submit `text`. Blank input is skipped without a request; any request
    /// failure is returned to the caller and not retried.
    pub async fn send_command(&self, text: &str) -> Result<CommandOutcome, CommandError> {
        if text.trim().is_empty() {
            debug!("skipping blank command");
            return Ok(CommandOutcome::Skipped);
        }

        let request = self
            .authorized(self.http.post(self.config.command_url.as_str()))
            .json(&CommandRequest { text });
        let response = request
            .send()
            .await
            .map_err(|error| CommandError::Request {
                message: error.to_string(),
            })?;
        let (status, bytes) = read_response(response).await?;
        info!("command accepted by {} ({})", self.config.command_url, status);

        // The acknowledgement is informational; a body we cannot parse still
        // means the command was delivered.
        let ack = serde_json::from_slice::<CommandAck>(&bytes).unwrap_or_default();
        Ok(CommandOutcome::Sent(ack))
    }

    /// Fetch the backend's current state snapshot.
    pub async fn fetch_state(&self) -> Result<SystemState, CommandError> {
        self.get_json(&self.config.state_url).await
    }

    /// Probe the backend's health endpoint.
    pub async fn health(&self) -> Result<HealthReport, CommandError> {
        self.get_json(&self.config.health_url).await
    }

    async fn get_json<T>(&self, url: &Url) -> Result<T, CommandError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = self
            .authorized(self.http.get(url.as_str()))
            .send()
            .await
            .map_err(|error| CommandError::Request {
                message: error.to_string(),
            })?;
        let (_, bytes) = read_response(response).await?;
        serde_json::from_slice::<T>(&bytes).map_err(|error| CommandError::Decode {
            message: error.to_string(),
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .header("x-request-id", format!("req_{}", Uuid::new_v4().simple()))
            .timeout(self.timeout);
        match &self.config.bearer_token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }
}

pub fn format_http_error(status: StatusCode, body: &[u8]) -> CommandError {
    let body = non_empty_string(String::from_utf8_lossy(body).to_string())
        .unwrap_or_else(|| "<empty>".to_string());
    CommandError::Http { status, body }
}

async fn read_response(response: reqwest::Response) -> Result<(StatusCode, Vec<u8>), CommandError> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|error| CommandError::Read {
            message: error.to_string(),
        })?;
    if !status.is_success() {
        return Err(format_http_error(status, &bytes));
    }
    Ok((status, bytes.to_vec()))
}

fn non_empty_string(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{PageOrigin, PortRule, resolve};

    fn channel() -> CommandChannel {
        let endpoints = resolve(
            &PageOrigin::new("http", "127.0.0.1", Some(9)),
            PortRule::default(),
        )
        .expect("endpoints");
        CommandChannel::new(CommandChannelConfig::new(&endpoints)).expect("channel")
    }

    #[tokio::test]
    async fn blank_commands_are_skipped() {
        let channel = channel();
        for text in ["", "   ", "\n\t "] {
            let outcome = channel.send_command(text).await.expect("skip is not an error");
            assert_eq!(outcome, CommandOutcome::Skipped, "{text:?} should be skipped");
        }
    }

    #[test]
    fn http_error_mapping_preserves_shape() {
        let error = format_http_error(StatusCode::BAD_GATEWAY, b" core offline ");
        assert_eq!(error.to_string(), "command_http_502 Bad Gateway:core offline");

        let empty_body = format_http_error(StatusCode::SERVICE_UNAVAILABLE, b" ");
        assert_eq!(
            empty_body.to_string(),
            "command_http_503 Service Unavailable:<empty>"
        );
    }

    #[test]
    fn config_follows_resolved_endpoints() {
        let endpoints = resolve(
            &PageOrigin::new("https", "venom.example", None),
            PortRule::default(),
        )
        .expect("endpoints");
        let config = CommandChannelConfig::new(&endpoints)
            .with_bearer_token(Some("  ".to_string()))
            .with_timeout_ms(500);

        assert_eq!(
            config.command_url.as_str(),
            "https://venom.example/api/command"
        );
        assert_eq!(config.state_url.as_str(), "https://venom.example/api/state");
        assert_eq!(config.health_url.as_str(), "https://venom.example/health");
        assert_eq!(config.bearer_token, None);
        assert_eq!(config.timeout_ms, 500);
    }
}
