//! Application configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no file
//! at all) yields a working configuration for `orderBookL2:XBTUSD`.

use crate::error::{AppError, AppResult};
use bmx_core::Topic;
use bmx_feed::ORDER_BOOK_VIEW_CAP;
use bmx_ws::ConnectionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix for environment overrides, e.g. `BMX_WEBSOCKET__URL`.
pub const ENV_PREFIX: &str = "BMX";

/// WebSocket session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    #[serde(default = "default_ws_url")]
    pub url: String,
    /// Disconnects tolerated before the session fails (0 = infinite).
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// Capacity of the session event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_ws_url() -> String {
    "wss://www.bitmex.com/realtime".to_string()
}

fn default_max_reconnect_attempts() -> u32 {
    3
}

fn default_reconnect_interval_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_interval_ms() -> u64 {
    5_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    10_000
}

fn default_event_buffer() -> usize {
    1024
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: default_ws_url(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl From<WebSocketConfig> for ConnectionConfig {
    fn from(cfg: WebSocketConfig) -> Self {
        Self {
            url: cfg.url,
            max_reconnect_attempts: cfg.max_reconnect_attempts,
            reconnect_interval_ms: cfg.reconnect_interval_ms,
            connect_timeout_ms: cfg.connect_timeout_ms,
            heartbeat_interval_ms: cfg.heartbeat_interval_ms,
            heartbeat_timeout_ms: cfg.heartbeat_timeout_ms,
        }
    }
}

/// Feed selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Active topic as `<table>:<symbol>`.
    #[serde(default = "default_topic")]
    pub topic: String,
}

fn default_topic() -> String {
    "orderBookL2:XBTUSD".to_string()
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
        }
    }
}

/// Headless output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// Levels printed per side (trades printed for the tape).
    #[serde(default = "default_levels")]
    pub levels: usize,
    /// Period of the view summary (0 = only on shutdown).
    #[serde(default = "default_summary_interval_ms")]
    pub summary_interval_ms: u64,
}

fn default_levels() -> usize {
    5
}

fn default_summary_interval_ms() -> u64 {
    5_000
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            levels: default_levels(),
            summary_interval_ms: default_summary_interval_ms(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub viewer: ViewerConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AppError::Config(format!(
                "Failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, layering `BMX_`-prefixed environment variables
    /// over the file. A missing file falls back to the defaults.
    ///
    /// Nested keys use a double underscore: `BMX_FEED__TOPIC=trade:XBTUSD`.
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply command line overrides, then re-validate.
    pub fn with_overrides(mut self, url: Option<String>, topic: Option<String>) -> AppResult<Self> {
        if let Some(url) = url {
            self.websocket.url = url;
        }
        if let Some(topic) = topic {
            self.feed.topic = topic;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> AppResult<()> {
        let url = self.websocket.url.trim();
        if url.is_empty() {
            return Err(AppError::Config("websocket.url must not be empty".to_string()));
        }
        if !url.starts_with("ws://") && !url.starts_with("wss://") {
            return Err(AppError::Config(format!(
                "websocket.url must use ws:// or wss://, got {}",
                url
            )));
        }
        if self.websocket.event_buffer == 0 {
            return Err(AppError::Config(
                "websocket.event_buffer must be positive".to_string(),
            ));
        }
        if self.websocket.heartbeat_interval_ms == 0 || self.websocket.heartbeat_timeout_ms == 0 {
            return Err(AppError::Config(
                "websocket heartbeat settings must be positive".to_string(),
            ));
        }
        if self.viewer.levels == 0 || self.viewer.levels > ORDER_BOOK_VIEW_CAP {
            return Err(AppError::Config(format!(
                "viewer.levels must be in 1..={}, got {}",
                ORDER_BOOK_VIEW_CAP, self.viewer.levels
            )));
        }
        self.topic().map(|_| ())
    }

    /// The configured topic, parsed.
    pub fn topic(&self) -> AppResult<Topic> {
        self.feed
            .topic
            .parse()
            .map_err(|e| AppError::Config(format!("feed.topic: {}", e)))
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        self.websocket.clone().into()
    }
}
