//! Configuration loading and transport assembly.
//!
//! Configuration is layered with figment; later sources override
//! earlier ones:
//!
//! 1. Built-in defaults
//! 2. Programmatic defaults via [`ConfigLoader::merge`]
//! 3. Configuration file (`libonebot.toml` / `config.toml`, or an
//!    explicit path)
//! 4. Environment variables (`LIBONEBOT_*`)
//!
//! Environment variables use the `LIBONEBOT_` prefix with `__` as the
//! section separator:
//!
//! - `LIBONEBOT_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `LIBONEBOT_LOGGING__OUTPUT=stderr` → `logging.output = "stderr"`
//!
//! # Example
//!
//! ```rust,ignore
//! use libonebot_runtime::config::ConfigLoader;
//! use libonebot_core::model::ImplInfo;
//!
//! let config = ConfigLoader::new().file("./my-impl.toml").load()?;
//! let builder = config.builder(ImplInfo::new("my-impl", "0.1.0"))?;
//! ```

use crate::error::{RuntimeError, RuntimeResult};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use libonebot_core::app::{OneBotImpl, OneBotImplBuilder};
use libonebot_core::error::TransportResult;
use libonebot_core::model::{Bot, ImplInfo};
use libonebot_core::transport::Transport;
use libonebot_transport::http::{HttpConfig, HttpServer};
use libonebot_transport::webhook::{HttpWebhook, WebhookConfig};
use libonebot_transport::websocket::reverse::{WsReverse, WsReverseConfig};
use libonebot_transport::websocket::server::{WsServer, WsServerConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

// =============================================================================
// Schema
// =============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// The bot accounts this implementation serves.
    #[serde(default)]
    pub bots: Vec<BotConfig>,

    /// The OneBot Connect connections to run.
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

impl RuntimeConfig {
    /// Starts an [`OneBotImplBuilder`] pre-populated with the bots and
    /// transports of this configuration. The caller adds its actions
    /// and lifecycle hooks before building.
    pub fn builder(&self, info: ImplInfo) -> RuntimeResult<OneBotImplBuilder> {
        let mut builder = OneBotImpl::builder(info);
        for bot in &self.bots {
            builder = builder.bot(bot.build());
        }
        for connection in &self.connections {
            builder = builder.transport_arc(connection.build()?);
        }
        Ok(builder)
    }
}

/// One bot account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub platform: String,
    pub user_id: String,

    /// Extra fields reported by `get_status`, prefixed with the
    /// platform name on the wire.
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl BotConfig {
    pub fn build(&self) -> Bot {
        let bot = Bot::new(&self.platform, &self.user_id);
        if self.extra.is_empty() {
            bot
        } else {
            bot.with_extra(self.extra.clone())
        }
    }
}

/// One OneBot Connect connection, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ConnectionConfig {
    Http(HttpSection),
    HttpWebhook(WebhookSection),
    Ws(WsSection),
    WsReverse(WsReverseSection),
}

impl ConnectionConfig {
    /// Constructs the transport this section describes.
    pub fn build(&self) -> TransportResult<Arc<dyn Transport>> {
        Ok(match self {
            Self::Http(section) => Arc::new(HttpServer::new(HttpConfig {
                host: section.host.clone(),
                port: section.port,
                access_token: section.access_token.clone(),
                event_enabled: section.event_enabled,
                event_buffer_size: section.event_buffer_size,
            })?),
            Self::HttpWebhook(section) => Arc::new(HttpWebhook::new(WebhookConfig {
                url: section.url.clone(),
                access_token: section.access_token.clone(),
                timeout: Duration::from_secs(section.timeout_secs),
            })?),
            Self::Ws(section) => Arc::new(WsServer::new(WsServerConfig {
                host: section.host.clone(),
                port: section.port,
                access_token: section.access_token.clone(),
                enable_heartbeat: section.enable_heartbeat,
                heartbeat_interval: Duration::from_millis(section.heartbeat_interval_ms),
            })?),
            Self::WsReverse(section) => Arc::new(WsReverse::new(WsReverseConfig {
                url: section.url.clone(),
                access_token: section.access_token.clone(),
                reconnect_interval: Duration::from_millis(section.reconnect_interval_ms),
                enable_heartbeat: section.enable_heartbeat,
                heartbeat_interval: Duration::from_millis(section.heartbeat_interval_ms),
            })?),
        })
    }
}

/// `type = "http"` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_true")]
    pub event_enabled: bool,
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            access_token: None,
            event_enabled: true,
            event_buffer_size: default_event_buffer_size(),
        }
    }
}

/// `type = "http-webhook"` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSection {
    pub url: String,
    #[serde(default)]
    pub access_token: Option<String>,
    /// Per-delivery timeout in seconds, 0 disables it.
    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,
}

/// `type = "ws"` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_true")]
    pub enable_heartbeat: bool,
    #[serde(default = "default_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

impl Default for WsSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            access_token: None,
            enable_heartbeat: true,
            heartbeat_interval_ms: default_interval_ms(),
        }
    }
}

/// `type = "ws-reverse"` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsReverseSection {
    pub url: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_interval_ms")]
    pub reconnect_interval_ms: u64,
    #[serde(default = "default_true")]
    pub enable_heartbeat: bool,
    #[serde(default = "default_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_event_buffer_size() -> usize {
    16
}

fn default_webhook_timeout_secs() -> u64 {
    5
}

fn default_interval_ms() -> u64 {
    5000
}

// =============================================================================
// Logging schema
// =============================================================================

/// Logging settings, consumed by [`crate::logging`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Output destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Log file path, required when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Per-module level overrides, e.g. `libonebot_transport = "trace"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::default(),
            output: LogOutput::default(),
            file_path: None,
            filters: HashMap::new(),
        }
    }
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
}

/// Log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

// =============================================================================
// Loader
// =============================================================================

/// Configuration loader with figment-based multi-source support.
///
/// # Example
///
/// ```rust,ignore
/// let config = ConfigLoader::new()
///     .file("libonebot.toml")
///     .load()?;
/// ```
pub struct ConfigLoader {
    figment: Figment,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Sets a specific configuration file to load. The file must exist.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Adds a search path for `libonebot.toml` / `config.toml`.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Disables the `LIBONEBOT_*` environment variable layer.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Lays programmatic defaults over the built-in ones. A
    /// configuration file or environment variable still overrides them.
    pub fn merge(mut self, config: RuntimeConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads and returns the configuration.
    pub fn load(self) -> RuntimeResult<RuntimeConfig> {
        let figment = self.build_figment()?;
        let config: RuntimeConfig = figment
            .extract()
            .map_err(|err| RuntimeError::Config(err.to_string()))?;

        debug!(
            level = %config.logging.level,
            bots = config.bots.len(),
            connections = config.connections.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    fn build_figment(mut self) -> RuntimeResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(RuntimeConfig::default()));

        let user_figment = std::mem::take(&mut self.figment);
        figment = figment.merge(user_figment);

        if let Some(path) = &self.config_file {
            if !path.exists() {
                return Err(RuntimeError::FileNotFound(path.clone()));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = figment.merge(Toml::file(path));
        } else {
            figment = self.search_config_files(figment);
        }

        if self.load_env {
            trace!("Loading environment variables with LIBONEBOT_ prefix");
            figment = figment.merge(Env::prefixed("LIBONEBOT_").split("__"));
        }

        Ok(figment)
    }

    fn search_config_files(&self, mut figment: Figment) -> Figment {
        let search_paths = if self.search_paths.is_empty() {
            std::env::current_dir().into_iter().collect()
        } else {
            self.search_paths.clone()
        };

        for search_path in &search_paths {
            for name in ["libonebot.toml", "config.toml"] {
                let path = search_path.join(name);
                if path.exists() {
                    info!(path = %path.display(), "Loading configuration file");
                    figment = figment.merge(Toml::file(&path));
                    return figment;
                }
            }
        }
        warn!("No configuration file found, using defaults");
        figment
    }
}

// =============================================================================
// Tests
// =============================================================================
