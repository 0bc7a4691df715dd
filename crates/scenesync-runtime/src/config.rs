//! Client configuration

use std::time::Duration;

use scenesync_core::{SyncError, SyncResult};
use scenesync_state::FadeConfig;
use scenesync_transport::{BackoffPolicy, SessionConfig};

pub const ENV_SERVER_URL: &str = "SCENESYNC_SERVER_URL";
pub const ENV_FADE_DURATION: &str = "SCENESYNC_FADE_DURATION";
pub const ENV_HEARTBEAT: &str = "SCENESYNC_HEARTBEAT";
pub const ENV_RECONNECT: &str = "SCENESYNC_RECONNECT";
pub const ENV_LOG_JSON: &str = "SCENESYNC_LOG_JSON";

/// Logging configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogConfig {
    /// Default filter directive; `RUST_LOG` overrides it
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Client configuration
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    /// WebSocket endpoint of the scene server
    pub server_url: String,
    pub fade: FadeConfig,
    pub session: SessionConfig,
    pub backoff: BackoffPolicy,
    /// Reconnect after the link drops
    pub reconnect: bool,
    /// Driver tick period; fades and heartbeat advance on each tick
    pub tick_interval: Duration,
    pub log: LogConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            server_url: "ws://127.0.0.1:8080".to_string(),
            fade: FadeConfig::default(),
            session: SessionConfig::default(),
            backoff: BackoffPolicy::default(),
            reconnect: true,
            tick_interval: Duration::from_millis(100),
            log: LogConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Local development server, no reconnect
    pub fn local(server_url: impl Into<String>) -> Self {
        ClientConfig {
            server_url: server_url.into(),
            reconnect: false,
            ..Default::default()
        }
    }

    /// Defaults overridden from `SCENESYNC_*` environment variables
    pub fn from_env() -> SyncResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden through `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SyncResult<Self> {
        let mut config = ClientConfig::default();

        if let Some(url) = lookup(ENV_SERVER_URL) {
            config.server_url = url;
        }
        if let Some(value) = lookup(ENV_FADE_DURATION) {
            config.fade.duration = parse_duration(ENV_FADE_DURATION, &value)?;
        }
        if let Some(value) = lookup(ENV_HEARTBEAT) {
            config.session.heartbeat_interval = parse_duration(ENV_HEARTBEAT, &value)?;
        }
        if let Some(value) = lookup(ENV_RECONNECT) {
            config.reconnect = parse_bool(ENV_RECONNECT, &value)?;
        }
        if let Some(value) = lookup(ENV_LOG_JSON) {
            config.log.json = parse_bool(ENV_LOG_JSON, &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SyncResult<()> {
        self.fade.validate()?;

        if self.server_url.is_empty() {
            return Err(SyncError::InvalidConfig("server_url is empty".into()));
        }
        if self.session.heartbeat_interval.is_zero() {
            return Err(SyncError::InvalidConfig("heartbeat interval is zero".into()));
        }
        if self.tick_interval.is_zero() {
            return Err(SyncError::InvalidConfig("tick interval is zero".into()));
        }
        if self.backoff.initial.is_zero() || self.backoff.multiplier < 1.0 {
            return Err(SyncError::InvalidConfig(
                "backoff must start above zero and never shrink".into(),
            ));
        }
        Ok(())
    }
}

fn parse_duration(key: &str, value: &str) -> SyncResult<Duration> {
    humantime::parse_duration(value.trim())
        .map_err(|e| SyncError::InvalidConfig(format!("{key}: {e}")))
}

fn parse_bool(key: &str, value: &str) -> SyncResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(SyncError::InvalidConfig(format!(
            "{key}: expected a boolean, got {other:?}"
        ))),
    }
}
