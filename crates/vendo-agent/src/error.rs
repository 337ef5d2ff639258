//! Error types for the unit agent.

/// Agent errors.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Server unreachable, timed out, or the connection dropped.
    #[error("network error: {message}")]
    Network { message: String },

    /// Server answered with an unexpected status.
    #[error("server error: HTTP {status}")]
    Server { status: u16 },

    /// Heartbeat rejected: credential does not match the provisioned one.
    #[error("unauthorized: credential rejected for unit {unit}")]
    Unauthorized { unit: String },

    /// Card token has no record on the server.
    #[error("card not registered: {card_id}")]
    NotFound { card_id: String },

    /// Card has no stock remaining.
    #[error("no stock remaining: {card_id}")]
    NoStock { card_id: String },

    /// Response body could not be decoded.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Card reader failure.
    #[error("card reader error: {message}")]
    Reader { message: String },
}

impl AgentError {
    /// Transient errors are logged and retried on the next natural cycle
    /// (next heartbeat tick, next card presentation).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Server { .. })
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        AgentError::Network {
            message: e.to_string(),
        }
    }
}

/// Result alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;
