//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: Serialization/deserialization between Rust structs and data formats
//! - **derive macros**: Automatically generate code for common traits
//! - **Result<T, E>**: Error handling that forces you to handle potential failures
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (deployment platforms)
//! 2. Environment variables (APP_SERVER__PORT, APP_TUNER__CLIENT_TIMEOUT_SECS, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! ## What is NOT configurable:
//! The capture format (16-bit mono PCM at 44.1kHz) is fixed. Clients are
//! expected to record at that rate; see `audio::decoder::SAMPLE_RATE`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, tuner, performance)
/// keeps each section small and maps directly onto `[section]` tables in TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub tuner: TunerConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Tuner WebSocket settings.
///
/// ## Fields:
/// - `heartbeat_interval_secs`: How often the server pings each client
/// - `client_timeout_secs`: Silence (no ping/pong/data) after which a connection is dropped
/// - `max_frame_bytes`: Largest binary frame accepted; bigger frames are a transport error
///
/// Heartbeats use WebSocket ping/pong frames, so the JSON protocol is unaffected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunerConfig {
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
    pub max_frame_bytes: usize,
}

/// Performance tuning configuration.
///
/// ## Tuning guidelines:
/// Each session costs a few hundred thousand multiply-adds per chunk.
/// A browser client sends about ten 4096-sample chunks per second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_sessions: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(), // Localhost only (safe for development)
                port: 8080,
            },
            tuner: TunerConfig {
                heartbeat_interval_secs: 5,
                client_timeout_secs: 30,
                max_frame_bytes: 64 * 1024, // 32k samples, ~0.75s of audio
            },
            performance: PerformanceConfig {
                max_concurrent_sessions: 100,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST and PORT environment variables
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=0.0.0.0`: Override server host
    /// - `APP_PERFORMANCE__MAX_CONCURRENT_SESSIONS=250`: Override session capacity
    /// - `PORT=3000`: Special case for deployment platforms
    ///
    /// Nested keys are separated by a double underscore because field names
    /// such as `max_concurrent_sessions` already contain single underscores.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - At least one concurrent session is allowed
    /// - Heartbeats are enabled and the timeout outlasts one heartbeat
    /// - A frame can hold at least one 16-bit sample
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        if self.tuner.heartbeat_interval_secs == 0 {
            return Err(anyhow::anyhow!("Heartbeat interval must be greater than 0"));
        }

        if self.tuner.client_timeout_secs <= self.tuner.heartbeat_interval_secs {
            return Err(anyhow::anyhow!(
                "Client timeout ({}s) must be longer than the heartbeat interval ({}s)",
                self.tuner.client_timeout_secs,
                self.tuner.heartbeat_interval_secs
            ));
        }

        if self.tuner.max_frame_bytes < 2 {
            return Err(anyhow::anyhow!("Max frame size must be at least 2 bytes"));
        }

        Ok(())
    }

    /// Update configuration from a JSON string (used for runtime config updates).
    ///
    /// ## Partial updates:
    /// Only the fields present in the JSON change. For example
    /// `{"performance": {"max_concurrent_sessions": 20}}` changes only the session cap.
    /// Tuner settings apply to connections opened after the update.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial_config.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = u16::try_from(port)
                    .map_err(|_| anyhow::anyhow!("Server port {} is out of range", port))?;
            }
        }

        if let Some(tuner) = partial_config.get("tuner") {
            if let Some(interval) = tuner.get("heartbeat_interval_secs").and_then(|v| v.as_u64()) {
                self.tuner.heartbeat_interval_secs = interval;
            }
            if let Some(timeout) = tuner.get("client_timeout_secs").and_then(|v| v.as_u64()) {
                self.tuner.client_timeout_secs = timeout;
            }
            if let Some(frame) = tuner.get("max_frame_bytes").and_then(|v| v.as_u64()) {
                self.tuner.max_frame_bytes = frame as usize;
            }
        }

        if let Some(performance) = partial_config.get("performance") {
            if let Some(sessions) = performance.get("max_concurrent_sessions").and_then(|v| v.as_u64()) {
                self.performance.max_concurrent_sessions = sessions as usize;
            }
        }

        self.validate()?;
        Ok(())
    }
}
