//! HTTP client for the coordinator server.

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::AgentConfig;
use crate::error::{AgentError, AgentResult};

/// User agent for server requests.
const USER_AGENT_VALUE: &str = concat!("vendo-agent/", env!("CARGO_PKG_VERSION"));

/// Outcome of a delivered heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAck {
    /// First contact: the server auto-registered this unit.
    Registered,
    /// Known unit, heartbeat accepted.
    Accepted,
}

/// Server's view of a card token, as returned by the lookup endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct UserView {
    pub card_id: String,
    #[serde(default)]
    pub allowed: bool,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub today: i64,
    #[serde(default)]
    pub total: i64,
}

/// Client for the unit-facing server API.
#[derive(Debug, Clone)]
pub struct ServerClient {
    client: reqwest::Client,
    base_url: String,
    config: AgentConfig,
}

impl ServerClient {
    /// Create a new client.
    pub fn new(config: AgentConfig) -> AgentResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| AgentError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        let base_url = config.server_url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    /// Probe the server's health endpoint.
    pub async fn check_health(&self) -> AgentResult<()> {
        let url = format!("{}/api/health", self.base_url);
        debug!(url = %url, "health probe");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(AgentError::Server {
                status: response.status().as_u16(),
            });
        }

        let body: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| AgentError::InvalidResponse {
                    message: format!("failed to parse health response: {}", e),
                })?;
        if body.get("status").and_then(|s| s.as_str()) != Some("ok") {
            return Err(AgentError::InvalidResponse {
                message: format!("unexpected health payload: {}", body),
            });
        }
        Ok(())
    }

    /// Deliver one heartbeat carrying this unit's name and credential.
    pub async fn heartbeat(&self) -> AgentResult<HeartbeatAck> {
        let url = format!("{}/api/unit/heartbeat", self.base_url);
        let payload = json!({
            "name": self.config.unit_name,
            "password": self.config.unit_password,
        });

        let response = self.client.post(&url).json(&payload).send().await?;
        match response.status() {
            StatusCode::CREATED => Ok(HeartbeatAck::Registered),
            StatusCode::OK => Ok(HeartbeatAck::Accepted),
            StatusCode::UNAUTHORIZED => Err(AgentError::Unauthorized {
                unit: self.config.unit_name.clone(),
            }),
            status => Err(AgentError::Server {
                status: status.as_u16(),
            }),
        }
    }

    /// Look up a card token; the eligibility check before a dispense.
    pub async fn fetch_user(&self, card_id: &str) -> AgentResult<UserView> {
        let url = format!("{}/api/users/{}", self.base_url, card_id);
        debug!(url = %url, "card lookup");

        let response = self.client.get(&url).send().await?;
        match response.status() {
            StatusCode::OK => response
                .json()
                .await
                .map_err(|e| AgentError::InvalidResponse {
                    message: format!("failed to parse user response: {}", e),
                }),
            StatusCode::NOT_FOUND => Err(AgentError::NotFound {
                card_id: card_id.to_string(),
            }),
            status => Err(AgentError::Server {
                status: status.as_u16(),
            }),
        }
    }

    /// Record one usage for a card token.
    pub async fn record_usage(&self, card_id: &str) -> AgentResult<()> {
        let url = format!("{}/api/record_usage", self.base_url);
        let payload = json!({ "card_id": card_id });

        let response = self.client.post(&url).json(&payload).send().await?;
        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => Err(AgentError::NotFound {
                card_id: card_id.to_string(),
            }),
            // The server answers 400 when the allotment is spent, including
            // when a concurrent usage won the last unit of stock
            StatusCode::BAD_REQUEST => Err(AgentError::NoStock {
                card_id: card_id.to_string(),
            }),
            status => Err(AgentError::Server {
                status: status.as_u16(),
            }),
        }
    }

    /// Forward a log line to the server's audit trail. Best effort: callers
    /// treat failures as non-fatal.
    pub async fn send_log(&self, message: &str) -> AgentResult<()> {
        let url = format!("{}/api/log", self.base_url);
        let payload = json!({
            "unit_name": self.config.unit_name,
            "message": message,
        });

        let response = self.client.post(&url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(AgentError::Server {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}
