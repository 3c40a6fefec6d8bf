//! Configuration loading from TOML files
//!
//! The config file path comes from the `--config` command line argument
//! and defaults to `config/dev.toml`. Missing sections and keys fall
//! back to their defaults.

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8090
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: default_bind_address(), port: default_server_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    /// Minimum gap between two accepted updates per technician
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    /// Radius around the destination that counts as arrived
    #[serde(default = "default_geofence_radius_m")]
    pub geofence_radius_m: f64,
}

fn default_throttle_ms() -> u64 {
    2000
}

fn default_geofence_radius_m() -> f64 {
    100.0
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self { throttle_ms: default_throttle_ms(), geofence_radius_m: default_geofence_radius_m() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Keep-alive interval for SSE connections
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Per-subscriber event queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    10
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { heartbeat_secs: default_heartbeat_secs(), queue_capacity: default_queue_capacity() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    bind_address: String,
    port: u16,
    throttle_ms: u64,
    geofence_radius_m: f64,
    heartbeat_secs: u64,
    queue_capacity: usize,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_server_port(),
            throttle_ms: default_throttle_ms(),
            geofence_radius_m: default_geofence_radius_m(),
            heartbeat_secs: default_heartbeat_secs(),
            queue_capacity: default_queue_capacity(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            bind_address: toml_config.server.bind_address,
            port: toml_config.server.port,
            throttle_ms: toml_config.tracking.throttle_ms,
            geofence_radius_m: toml_config.tracking.geofence_radius_m,
            heartbeat_secs: toml_config.stream.heartbeat_secs,
            queue_capacity: toml_config.stream.queue_capacity,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration from a path - falls back to defaults on error
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn throttle_ms(&self) -> u64 {
        self.throttle_ms
    }

    pub fn geofence_radius_m(&self) -> f64 {
        self.geofence_radius_m
    }

    pub fn heartbeat_secs(&self) -> u64 {
        self.heartbeat_secs
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}
