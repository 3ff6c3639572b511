//! Stream configuration
//!
//! [`StreamConfig`] carries the tunables of an
//! [`AudioStream`](crate::audio::AudioStream). It can be kept in a JSON file
//! through [`ConfigManager`]; fields missing from the file take their
//! defaults.
//!
//! # Example
//!
//! ```no_run
//! use duplex_audio::config::{ConfigManager, StreamConfig};
//!
//! let path = std::path::Path::new("stream.json");
//! let mut config = ConfigManager::load(path)?;
//! config.frames_per_buffer = 256;
//! ConfigManager::save(path, &config)?;
//! # Ok::<(), duplex_audio::config::ConfigError>(())
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Tunables of an audio stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Frames per second; `None` uses the devices' default
    pub sample_rate: Option<f64>,
    /// Suggested latency in seconds; `None` uses the devices' high latency
    pub latency: Option<f64>,
    /// Frames exchanged with the hardware per native call
    pub frames_per_buffer: usize,
    /// Log xruns as warnings instead of traces
    pub warn_xruns: bool,
    /// Clamp channel requests to what the device offers instead of failing
    pub adjust_channels: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: None,
            latency: None,
            frames_per_buffer: 128,
            warn_xruns: true,
            adjust_channels: false,
        }
    }
}

impl StreamConfig {
    /// Set the sample rate
    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Set the suggested latency in seconds
    pub fn with_latency(mut self, latency: f64) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Set the chunk size
    pub fn with_frames_per_buffer(mut self, frames_per_buffer: usize) -> Self {
        self.frames_per_buffer = frames_per_buffer;
        self
    }

    pub fn with_warn_xruns(mut self, warn_xruns: bool) -> Self {
        self.warn_xruns = warn_xruns;
        self
    }

    pub fn with_adjust_channels(mut self, adjust_channels: bool) -> Self {
        self.adjust_channels = adjust_channels;
        self
    }
}

/// Loads and stores [`StreamConfig`] files
pub struct ConfigManager;

impl ConfigManager {
    /// Load a configuration
    ///
    /// Returns the defaults when `path` does not exist.
    pub fn load(path: &Path) -> ConfigResult<StreamConfig> {
        tracing::debug!(path = %path.display(), "Loading config");

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: StreamConfig = serde_json::from_str(&content)?;
            tracing::info!(path = %path.display(), "Config loaded successfully");
            Ok(config)
        } else {
            tracing::info!("Config file not found, using defaults");
            Ok(StreamConfig::default())
        }
    }

    /// Save a configuration as pretty JSON, creating parent directories
    pub fn save(path: &Path, config: &StreamConfig) -> ConfigResult<()> {
        tracing::debug!(path = %path.display(), "Saving config");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(path, content)?;

        tracing::info!(path = %path.display(), "Config saved successfully");
        Ok(())
    }

    /// Delete a configuration file if it exists
    pub fn delete(path: &Path) -> ConfigResult<()> {
        if path.exists() {
            std::fs::remove_file(path)?;
            tracing::info!(path = %path.display(), "Config deleted");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_config_default() {
        let config = StreamConfig::default();

        assert!(config.sample_rate.is_none());
        assert!(config.latency.is_none());
        assert_eq!(config.frames_per_buffer, 128);
        assert!(config.warn_xruns);
        assert!(!config.adjust_channels);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: StreamConfig =
            serde_json::from_str(r#"{"sample_rate": 44100.0, "warn_xruns": false}"#).unwrap();

        assert_eq!(config.sample_rate, Some(44100.0));
        assert!(!config.warn_xruns);
        assert_eq!(config.frames_per_buffer, 128);
    }

    #[test]
    fn test_builder() {
        let config = StreamConfig::default()
            .with_sample_rate(48000.0)
            .with_latency(0.02)
            .with_frames_per_buffer(64)
            .with_adjust_channels(true);

        assert_eq!(config.sample_rate, Some(48000.0));
        assert_eq!(config.latency, Some(0.02));
        assert_eq!(config.frames_per_buffer, 64);
        assert!(config.adjust_channels);
    }
}
