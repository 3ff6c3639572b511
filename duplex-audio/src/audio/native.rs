//! Interface to the native audio I/O library
//!
//! A backend opens [`NativeStream`]s: blocking, interleaved, chunk-oriented
//! streams shared by the input and output workers of one [`AudioStream`].
//! Every call into a native stream goes through [`handle_status`], which
//! decides whether a status is fatal.
//!
//! [`AudioStream`]: crate::audio::AudioStream

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::audio::device::{DeviceInfo, Direction};
use crate::audio::error::{AudioError, AudioResult, ErrorCode};

/// Sample types a stream can carry
///
/// Implemented for every primitive sample type the backends understand
/// (`f32`, `i16`, `i32`, `u8`, ...).
pub trait Sample: cpal::SizedSample + Debug + Send + Sync + 'static {
    /// Value of a silent sample
    fn silence() -> Self {
        <Self as cpal::Sample>::EQUILIBRIUM
    }
}

impl<T> Sample for T where T: cpal::SizedSample + Debug + Send + Sync + 'static {}

/// Guard serializing calls on one native stream
///
/// Both directions of a stream hold clones of the same guard.
pub type StreamLock = Arc<Mutex<()>>;

/// Create a fresh, unshared guard
pub fn new_stream_lock() -> StreamLock {
    Arc::new(Mutex::new(()))
}

/// Parameters for one direction of a native stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamParameters {
    /// Device serving this direction
    pub device: DeviceInfo,
    /// Channel count, at least one
    pub channels: usize,
    /// Suggested latency in seconds
    pub latency: f64,
}

/// Everything a backend needs to open a native stream
#[derive(Debug, Clone, PartialEq)]
pub struct OpenParameters {
    /// Input side, `None` for output-only streams
    pub input: Option<StreamParameters>,
    /// Output side, `None` for input-only streams
    pub output: Option<StreamParameters>,
    /// Frames per second
    pub sample_rate: f64,
    /// Frames exchanged per native call
    pub frames_per_buffer: usize,
}

impl OpenParameters {
    /// Parameters for one direction
    pub fn side(&self, direction: Direction) -> Option<&StreamParameters> {
        match direction {
            Direction::Input => self.input.as_ref(),
            Direction::Output => self.output.as_ref(),
        }
    }
}

/// An open native stream
///
/// Buffers are interleaved, one sample per channel per frame. A stream must
/// not be entered from two threads at once; callers hold the stream's
/// [`StreamLock`] around `read` and `write`.
pub trait NativeStream<S: Sample>: Send + Sync {
    /// Start the stream
    fn start(&self) -> Result<(), ErrorCode>;

    /// Stop the stream, letting pending output play out
    fn stop(&self) -> Result<(), ErrorCode>;

    /// Whether the stream is stopped; `BadStreamPtr` once closed
    fn is_stopped(&self) -> Result<bool, ErrorCode>;

    /// Release the stream; every later call reports `BadStreamPtr`
    fn close(&self) -> Result<(), ErrorCode>;

    /// Block until `frames` frames have been read into `buffer`
    fn read(&self, buffer: &mut [S], frames: usize) -> Result<(), ErrorCode>;

    /// Block until `frames` frames of `buffer` have been written
    fn write(&self, buffer: &[S], frames: usize) -> Result<(), ErrorCode>;
}

/// A native audio I/O library
///
/// Device enumeration and stream creation for one host.
pub trait AudioBackend {
    /// Short backend name
    fn name(&self) -> &'static str;

    /// All devices, indexed as [`DeviceInfo::index`]
    fn devices(&self) -> AudioResult<Vec<DeviceInfo>>;

    /// Device used for input when none is named
    fn default_input_device(&self) -> AudioResult<DeviceInfo>;

    /// Device used for output when none is named
    fn default_output_device(&self) -> AudioResult<DeviceInfo>;

    /// Open a stopped native stream
    fn open_stream<S: Sample>(
        &self,
        parameters: &OpenParameters,
    ) -> AudioResult<Arc<dyn NativeStream<S>>>;
}

/// Interpret the status of a native call
///
/// Xruns are reported (as a warning when `warn_xruns` is set) and treated
/// as success; every other failure becomes [`AudioError::Protocol`].
pub fn handle_status(status: Result<(), ErrorCode>, warn_xruns: bool) -> AudioResult<()> {
    match status {
        Ok(()) | Err(ErrorCode::NoError) => Ok(()),
        Err(code) if code.is_xrun() => {
            if warn_xruns {
                warn!("Audio xrun: {}", code);
            } else {
                trace!("Suppressed xrun: {}", code);
            }
            Ok(())
        }
        Err(code) => Err(AudioError::Protocol(code)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::diagnostics;

    #[test]
    fn test_handle_status_success() {
        assert_eq!(handle_status(Ok(()), true), Ok(()));
        assert_eq!(handle_status(Err(ErrorCode::NoError), true), Ok(()));
    }

    #[test]
    fn test_handle_status_xruns_are_not_errors() {
        assert_eq!(handle_status(Err(ErrorCode::OutputUnderflowed), true), Ok(()));
        assert_eq!(handle_status(Err(ErrorCode::InputOverflowed), false), Ok(()));
    }

    #[test]
    fn test_xrun_warning_follows_flag() {
        let (result, sink) =
            diagnostics::capture(|| handle_status(Err(ErrorCode::OutputUnderflowed), true));
        assert_eq!(result, Ok(()));
        assert!(sink.contents().contains("WARN"));
        assert!(sink.contents().contains("Audio xrun"));

        let (result, sink) =
            diagnostics::capture(|| handle_status(Err(ErrorCode::InputOverflowed), false));
        assert_eq!(result, Ok(()));
        assert!(!sink.contents().contains("WARN"));
        assert!(!sink.contents().contains("Audio xrun"));
    }

    #[test]
    fn test_handle_status_escalates_failures() {
        assert_eq!(
            handle_status(Err(ErrorCode::DeviceUnavailable), false),
            Err(AudioError::Protocol(ErrorCode::DeviceUnavailable))
        );
    }

    #[test]
    fn test_silence() {
        assert_eq!(f32::silence(), 0.0);
        assert_eq!(i16::silence(), 0);
        assert_eq!(u8::silence(), 128);
    }
}
