//! Agent configuration.

use std::time::Duration;

/// Heartbeat period. The server's expiry timeout (65 s) allows one missed
/// beat at this interval.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Timeout for scan-path requests (eligibility, usage recording).
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for the startup health probe and log forwarding.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Unit agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Coordinator base URL, e.g. `http://192.168.1.10:5000`.
    pub server_url: String,

    /// Name identifying this unit to the server.
    pub unit_name: String,

    /// Shared secret; established server-side on first heartbeat.
    pub unit_password: String,

    /// Per-request timeout.
    pub request_timeout: Duration,

    /// Heartbeat period.
    pub heartbeat_interval: Duration,
}

impl AgentConfig {
    pub fn new(
        server_url: impl Into<String>,
        unit_name: impl Into<String>,
        unit_password: impl Into<String>,
    ) -> Self {
        Self {
            // Trailing slash would double up when joining paths
            server_url: server_url.into().trim_end_matches('/').to_string(),
            unit_name: unit_name.into(),
            unit_password: unit_password.into(),
            request_timeout: REQUEST_TIMEOUT,
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }
}
