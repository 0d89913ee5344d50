//! Client configuration.

use std::time::Duration;

use bland_core::reconnect::ReconnectionPolicy;

/// Server the client dials when none is configured.
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:5000";

/// Cadence of the countdown tick.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// How long a single connection attempt may take before it counts as failed.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    /// Codename to join with.
    pub codename: Option<String>,
    /// Join the lobby with `codename` as soon as the first connection opens.
    pub auto_join: bool,
    pub tick_period: Duration,
    pub connect_timeout: Duration,
    pub policy: ReconnectionPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_URL)
    }
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            codename: None,
            auto_join: false,
            tick_period: TICK_PERIOD,
            connect_timeout: CONNECT_TIMEOUT,
            policy: ReconnectionPolicy::default(),
        }
    }

    /// The WebSocket endpoint (`/ws` appended if the user didn't already).
    pub fn ws_url(&self) -> String {
        let url = self.server_url.trim();
        if url.ends_with("/ws") {
            url.to_string()
        } else {
            format!("{}/ws", url.trim_end_matches('/'))
        }
    }
}
