//! Configuration management module
//!
//! Handles loading, validation, and management of application configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::session::SessionMode;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Backend endpoints
    pub server: ServerConfig,

    /// Session deadlines
    pub session: SessionSettings,

    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the request/response endpoints
    pub http_url: String,

    /// Base URL of the streaming endpoints
    pub ws_url: String,

    /// Streaming path used for quiet readings
    pub read_path: String,

    /// Streaming path used for interactive chats
    pub chat_path: String,

    /// WebSocket connect timeout in seconds
    pub connect_timeout_secs: u64,

    /// REST request timeout in seconds
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Deadline for quiet readings in seconds
    pub reading_timeout_secs: u64,

    /// Deadline for interactive chats in seconds; unset means unbounded
    pub chat_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Logging level
    pub level: String,

    /// Optional log file; stderr only when unset
    pub file_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_url: "http://localhost:8000".to_string(),
            ws_url: "ws://localhost:8000".to_string(),
            read_path: "/async_chat".to_string(),
            chat_path: "/async_chat".to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 60,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            reading_timeout_secs: 15,
            chat_timeout_secs: None,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_path: None,
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Load configuration from file with environment variable overrides
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        // READBUDDY_HTTP_URL - REST base URL
        if let Ok(http_url) = env::var("READBUDDY_HTTP_URL") {
            self.server.http_url = http_url;
        }

        // READBUDDY_WS_URL - streaming base URL
        if let Ok(ws_url) = env::var("READBUDDY_WS_URL") {
            self.server.ws_url = ws_url;
        }

        if let Ok(read_path) = env::var("READBUDDY_READ_PATH") {
            self.server.read_path = read_path;
        }

        if let Ok(chat_path) = env::var("READBUDDY_CHAT_PATH") {
            self.server.chat_path = chat_path;
        }

        if let Ok(timeout) = env::var("READBUDDY_CONNECT_TIMEOUT_SECS") {
            if let Ok(value) = timeout.parse::<u64>() {
                self.server.connect_timeout_secs = value;
            }
        }

        if let Ok(timeout) = env::var("READBUDDY_REQUEST_TIMEOUT_SECS") {
            if let Ok(value) = timeout.parse::<u64>() {
                self.server.request_timeout_secs = value;
            }
        }

        // READBUDDY_READING_TIMEOUT_SECS - quiet reading deadline
        if let Ok(timeout) = env::var("READBUDDY_READING_TIMEOUT_SECS") {
            if let Ok(value) = timeout.parse::<u64>() {
                self.session.reading_timeout_secs = value;
            }
        }

        // READBUDDY_CHAT_TIMEOUT_SECS - chat deadline, empty or 0 for unbounded
        if let Ok(timeout) = env::var("READBUDDY_CHAT_TIMEOUT_SECS") {
            self.session.chat_timeout_secs = match timeout.trim().parse::<u64>() {
                Ok(0) | Err(_) => None,
                Ok(value) => Some(value),
            };
        }

        // READBUDDY_LOG_LEVEL - logging level
        if let Ok(level) = env::var("READBUDDY_LOG_LEVEL") {
            self.log.level = level;
        }

        // READBUDDY_LOG_FILE_PATH - logging destination file
        if let Ok(file_path) = env::var("READBUDDY_LOG_FILE_PATH") {
            if !file_path.trim().is_empty() {
                self.log.file_path = Some(file_path);
            }
        }
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::load_from_file(path).unwrap_or_else(|err| {
            tracing::warn!("Failed to load config: {}, using defaults", err);
            let mut config = Self::default();
            config.apply_env_overrides();
            config
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let server = &self.server;

        if !(server.http_url.starts_with("http://") || server.http_url.starts_with("https://")) {
            anyhow::bail!("server.http_url must be an http(s) URL: {}", server.http_url);
        }

        if !(server.ws_url.starts_with("ws://") || server.ws_url.starts_with("wss://")) {
            anyhow::bail!("server.ws_url must be a ws(s) URL: {}", server.ws_url);
        }

        if server.read_path.trim().is_empty() || server.chat_path.trim().is_empty() {
            anyhow::bail!("Streaming paths must not be empty");
        }

        if server.connect_timeout_secs == 0 || server.request_timeout_secs == 0 {
            anyhow::bail!("Server timeouts must be greater than 0");
        }

        if self.session.reading_timeout_secs == 0 {
            anyhow::bail!("session.reading_timeout_secs must be greater than 0");
        }

        if self.session.chat_timeout_secs == Some(0) {
            anyhow::bail!("session.chat_timeout_secs must be greater than 0 when set");
        }

        if !LOG_LEVELS.contains(&self.log.level.to_lowercase().as_str()) {
            anyhow::bail!("Invalid log level: {}", self.log.level);
        }

        Ok(())
    }

    /// Full streaming URL for a session mode
    pub fn endpoint_url(&self, mode: SessionMode) -> String {
        let path = match mode {
            SessionMode::QuietReading => &self.server.read_path,
            SessionMode::InteractiveChat => &self.server.chat_path,
        };
        let base = self.server.ws_url.trim_end_matches('/');

        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    /// Display formatted configuration
    pub fn display(&self) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        println!("Current configuration:");
        println!("{}", content);
        Ok(())
    }

    /// Handle configuration command
    pub fn handle_command(config_file: &str, action: &Option<crate::cli::ConfigAction>) -> Result<()> {
        match action {
            Some(crate::cli::ConfigAction::Show) | None => {
                let config = Config::load_or_default(config_file);
                config.display()?;
            }
            Some(crate::cli::ConfigAction::Reset) => {
                let default_config = Config::default();
                default_config.save_to_file(config_file)?;
                println!("Configuration reset: {}", config_file);
                default_config.display()?;
            }
        }
        Ok(())
    }
}
