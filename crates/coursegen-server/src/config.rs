//! Server configuration.

use anyhow::Result;
use coursegen_core::CaptureConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Where finished captures are written
    #[serde(default = "default_capture_dir")]
    pub capture_dir: Option<PathBuf>,
    #[serde(default = "default_capture_enabled")]
    pub capture_enabled: bool,
    /// Seconds a response may stay open before it is failed
    #[serde(default = "default_stream_timeout")]
    pub stream_timeout_secs: u64,
    /// Capacity of the pipeline event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Ended responses kept readable before the oldest are evicted
    #[serde(default = "default_retained_responses")]
    pub retained_responses: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_capture_dir() -> Option<PathBuf> {
    Some(
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("coursegen")
            .join("captures"),
    )
}

fn default_capture_enabled() -> bool {
    true
}

fn default_stream_timeout() -> u64 {
    300
}

fn default_event_buffer() -> usize {
    coursegen_core::DEFAULT_EVENT_BUFFER
}

fn default_retained_responses() -> usize {
    coursegen_core::DEFAULT_RETAINED_RESPONSES
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            capture_dir: default_capture_dir(),
            capture_enabled: default_capture_enabled(),
            stream_timeout_secs: default_stream_timeout(),
            event_buffer: default_event_buffer(),
            retained_responses: default_retained_responses(),
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load config from default location (config/default.toml) or fall back to defaults.
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from("config/default.toml");
        if config_path.exists() {
            return Self::load_from(&config_path);
        }

        Ok(Config::default())
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            dir: self.capture_dir.clone(),
            enabled: self.capture_enabled,
        }
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }
}
