//! Blocking duplex audio streams
//!
//! Callers read and write channel-major sample buffers of any length; a
//! worker thread per direction moves them through the audio hardware in
//! fixed-size interleaved chunks.

/// Audio streaming modules
pub mod audio;

/// Stream configuration
pub mod config;

/// Utility modules
pub mod utils;

pub use audio::{initialize, is_initialized, terminate, AudioError, AudioResult, AudioStream};
pub use config::{ConfigError, ConfigManager, StreamConfig};
