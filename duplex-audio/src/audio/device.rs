use std::fmt;

use serde::{Deserialize, Serialize};

use crate::audio::error::{AudioError, AudioResult};

/// Half of a duplex stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Source half, frames flow from the device to the caller
    Input,
    /// Sink half, frames flow from the caller to the device
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// Channel and latency limits of one direction of a device
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    /// Maximum number of channels
    pub max_channels: usize,
    /// Default latency for interactive use, in seconds
    pub low_latency: f64,
    /// Default latency for robust non-interactive use, in seconds
    pub high_latency: f64,
}

/// Information about an audio device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Position of the device in its backend's catalog
    pub index: usize,
    /// Human-readable device name
    pub name: String,
    /// Name of the host API the device belongs to
    pub host_api: String,
    /// Sample rate the device runs at unless told otherwise
    pub default_sample_rate: f64,
    /// Input limits
    pub input_bounds: Bounds,
    /// Output limits
    pub output_bounds: Bounds,
}

impl DeviceInfo {
    /// Limits for one direction
    pub fn bounds(&self, direction: Direction) -> Bounds {
        match direction {
            Direction::Input => self.input_bounds,
            Direction::Output => self.output_bounds,
        }
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({} in, {} out, {} Hz)",
            self.index,
            self.name,
            self.input_bounds.max_channels,
            self.output_bounds.max_channels,
            self.default_sample_rate
        )
    }
}

/// How a stream picks the device for one direction
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DeviceSelector {
    /// The backend's default device for the direction
    #[default]
    Default,
    /// Catalog index
    Index(usize),
    /// Exact device name
    Name(String),
    /// An already looked-up device
    Info(DeviceInfo),
}

impl From<&str> for DeviceSelector {
    fn from(name: &str) -> Self {
        DeviceSelector::Name(name.to_string())
    }
}

impl From<usize> for DeviceSelector {
    fn from(index: usize) -> Self {
        DeviceSelector::Index(index)
    }
}

impl From<DeviceInfo> for DeviceSelector {
    fn from(info: DeviceInfo) -> Self {
        DeviceSelector::Info(info)
    }
}

/// Requested channel count for one direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelCount {
    /// Everything the device advertises
    #[default]
    Max,
    /// A fixed count, zero disables the direction
    Exact(usize),
}

impl From<usize> for ChannelCount {
    fn from(channels: usize) -> Self {
        ChannelCount::Exact(channels)
    }
}

/// Find a device by index in a catalog
pub fn find_device_by_index(devices: &[DeviceInfo], index: usize) -> AudioResult<DeviceInfo> {
    devices
        .iter()
        .find(|device| device.index == index)
        .cloned()
        .ok_or_else(|| AudioError::DeviceNotFound(format!("index {}", index)))
}

/// Find a device by exact name in a catalog
pub fn find_device_by_name(devices: &[DeviceInfo], name: &str) -> AudioResult<DeviceInfo> {
    devices
        .iter()
        .find(|device| device.name == name)
        .cloned()
        .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))
}

/// Resolve a channel request against a device's bound
///
/// With `adjust` set, an over-large request is clamped to the bound
/// instead of failing.
pub fn resolve_channels(
    device: &DeviceInfo,
    direction: Direction,
    requested: ChannelCount,
    adjust: bool,
) -> AudioResult<usize> {
    let max = device.bounds(direction).max_channels;
    match requested {
        ChannelCount::Max => Ok(max),
        ChannelCount::Exact(channels) if channels <= max => Ok(channels),
        ChannelCount::Exact(_) if adjust => Ok(max),
        ChannelCount::Exact(channels) => Err(AudioError::TooManyChannels {
            device: device.name.clone(),
            direction,
            requested: channels,
            max,
        }),
    }
}

/// Pick the duplex sample rate when none was requested
pub fn combine_default_sample_rates(
    input: &DeviceInfo,
    output: &DeviceInfo,
) -> AudioResult<f64> {
    if input.default_sample_rate == output.default_sample_rate {
        Ok(input.default_sample_rate)
    } else {
        Err(AudioError::SampleRateMismatch {
            input: input.name.clone(),
            output: output.name.clone(),
            input_rate: input.default_sample_rate,
            output_rate: output.default_sample_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(index: usize, name: &str, inputs: usize, outputs: usize, rate: f64) -> DeviceInfo {
        DeviceInfo {
            index,
            name: name.to_string(),
            host_api: "test".to_string(),
            default_sample_rate: rate,
            input_bounds: Bounds {
                max_channels: inputs,
                low_latency: 0.01,
                high_latency: 0.1,
            },
            output_bounds: Bounds {
                max_channels: outputs,
                low_latency: 0.02,
                high_latency: 0.2,
            },
        }
    }

    #[test]
    fn test_find_device() {
        let devices = vec![
            device(0, "Microphone", 1, 0, 48000.0),
            device(1, "Speakers", 0, 2, 48000.0),
        ];

        assert_eq!(find_device_by_index(&devices, 1).unwrap().name, "Speakers");
        assert_eq!(find_device_by_name(&devices, "Microphone").unwrap().index, 0);
    }

    #[test]
    fn test_device_not_found() {
        let devices = vec![device(0, "Microphone", 1, 0, 48000.0)];

        let result = find_device_by_name(&devices, "NonExistentDevice123456789");
        if let Err(AudioError::DeviceNotFound(name)) = result {
            assert_eq!(name, "NonExistentDevice123456789");
        } else {
            panic!("Expected DeviceNotFound error");
        }
        assert!(find_device_by_index(&devices, 7).is_err());
    }

    #[test]
    fn test_resolve_channels() {
        let mic = device(0, "Microphone", 2, 0, 48000.0);

        assert_eq!(resolve_channels(&mic, Direction::Input, ChannelCount::Max, false), Ok(2));
        assert_eq!(resolve_channels(&mic, Direction::Input, ChannelCount::Exact(1), false), Ok(1));
        assert_eq!(resolve_channels(&mic, Direction::Output, ChannelCount::Max, false), Ok(0));
        assert_eq!(
            resolve_channels(&mic, Direction::Input, ChannelCount::Exact(4), true),
            Ok(2)
        );
    }

    #[test]
    fn test_resolve_channels_over_bound() {
        let mic = device(0, "Microphone", 2, 0, 48000.0);

        let error =
            resolve_channels(&mic, Direction::Input, ChannelCount::Exact(4), false).unwrap_err();
        assert_eq!(
            error,
            AudioError::TooManyChannels {
                device: "Microphone".to_string(),
                direction: Direction::Input,
                requested: 4,
                max: 2,
            }
        );
    }

    #[test]
    fn test_combine_default_sample_rates() {
        let mic = device(0, "Microphone", 1, 0, 44100.0);
        let speakers = device(1, "Speakers", 0, 2, 48000.0);
        let headset = device(2, "Headset", 1, 2, 44100.0);

        assert_eq!(combine_default_sample_rates(&mic, &headset), Ok(44100.0));
        assert!(matches!(
            combine_default_sample_rates(&mic, &speakers),
            Err(AudioError::SampleRateMismatch { .. })
        ));
    }
}
