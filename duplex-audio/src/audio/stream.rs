//! Duplex audio streams
//!
//! An [`AudioStream`] owns one native stream and one worker per direction.
//! Reads and writes block the calling thread until the worker has moved
//! every requested frame through the hardware, one chunk at a time.
//!
//! # Example
//!
//! ```
//! use duplex_audio::audio::{AudioStream, Endpoints, LoopbackBackend, SampleBuffer};
//! use duplex_audio::config::StreamConfig;
//!
//! duplex_audio::initialize();
//! let backend = LoopbackBackend::new();
//! let config = StreamConfig::default().with_frames_per_buffer(64);
//! let mut stream = AudioStream::<f32>::open(&backend, Endpoints::default(), &config)?;
//!
//! let mut tone = SampleBuffer::<f32>::new(2, 100);
//! tone.set(0, 0, 0.5);
//! assert_eq!(stream.write(&mut tone)?, 100);
//!
//! let echo = stream.read(100)?;
//! assert_eq!(echo.get(0, 0), 0.5);
//!
//! stream.close()?;
//! # Ok::<(), duplex_audio::audio::AudioError>(())
//! ```

use std::fmt;
use std::mem;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::audio::buffer::{ChannelBuffer, SampleBuffer};
use crate::audio::device::{
    combine_default_sample_rates, find_device_by_index, find_device_by_name, resolve_channels,
    ChannelCount, DeviceInfo, DeviceSelector, Direction,
};
use crate::audio::diagnostics::{self, DiagnosticSink};
use crate::audio::error::{AudioError, AudioResult, ErrorCode};
use crate::audio::host::ensure_initialized;
use crate::audio::native::{
    handle_status, new_stream_lock, AudioBackend, NativeStream, OpenParameters, Sample,
    StreamLock, StreamParameters,
};
use crate::audio::scribe::{SampleReader, SampleWriter, Scribe, Transfer, Transferred};
use crate::audio::worker::Messenger;
use crate::config::StreamConfig;

/// Devices and channel counts for both directions of a stream
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoints {
    pub input: DeviceSelector,
    pub input_channels: ChannelCount,
    pub output: DeviceSelector,
    pub output_channels: ChannelCount,
}

impl Endpoints {
    pub fn new(
        input: impl Into<DeviceSelector>,
        input_channels: ChannelCount,
        output: impl Into<DeviceSelector>,
        output_channels: ChannelCount,
    ) -> Self {
        Self {
            input: input.into(),
            input_channels,
            output: output.into(),
            output_channels,
        }
    }

    /// Both directions on one device
    pub fn duplex(
        device: impl Into<DeviceSelector>,
        input_channels: usize,
        output_channels: usize,
    ) -> Self {
        let device = device.into();
        Self::new(
            device.clone(),
            ChannelCount::Exact(input_channels),
            device,
            ChannelCount::Exact(output_channels),
        )
    }

    /// Every channel `device` offers, in both directions
    pub fn max_duplex(device: impl Into<DeviceSelector>) -> Self {
        let device = device.into();
        Self::new(device.clone(), ChannelCount::Max, device, ChannelCount::Max)
    }

    /// Record from `device` only
    pub fn input_only(device: impl Into<DeviceSelector>, channels: usize) -> Self {
        Self::new(
            device,
            ChannelCount::Exact(channels),
            DeviceSelector::Default,
            ChannelCount::Exact(0),
        )
    }

    /// Play to `device` only
    pub fn output_only(device: impl Into<DeviceSelector>, channels: usize) -> Self {
        Self::new(
            DeviceSelector::Default,
            ChannelCount::Exact(0),
            device,
            ChannelCount::Exact(channels),
        )
    }

    /// Stereo in and out on the default devices
    pub fn default_duplex() -> Self {
        Self::duplex(DeviceSelector::Default, 2, 2)
    }

    fn side(&self, direction: Direction) -> (&DeviceSelector, ChannelCount) {
        match direction {
            Direction::Input => (&self.input, self.input_channels),
            Direction::Output => (&self.output, self.output_channels),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::default_duplex()
    }
}

/// The guard and transfer strategies a stream is built with
pub struct StreamSetup<R, W> {
    /// Guard shared by both directions
    pub lock: StreamLock,
    /// Input scribe
    pub reader: R,
    /// Output scribe
    pub writer: W,
}

impl<R, W> StreamSetup<R, W> {
    pub fn new(lock: StreamLock, reader: R, writer: W) -> Self {
        Self {
            lock,
            reader,
            writer,
        }
    }
}

impl<S: Sample> StreamSetup<SampleReader<S>, SampleWriter<S>> {
    /// Built-in scribes honoring the config's xrun setting
    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(
            new_stream_lock(),
            SampleReader::new(config.warn_xruns),
            SampleWriter::new(config.warn_xruns),
        )
    }
}

/// A resolved direction: device and a positive channel count
type Side = Option<(DeviceInfo, usize)>;

/// A blocking duplex audio stream
pub struct AudioStream<S: Sample, R: Scribe<S> = SampleReader<S>, W: Scribe<S> = SampleWriter<S>> {
    stream: Arc<dyn NativeStream<S>>,
    sample_rate: f64,
    frames_per_buffer: usize,
    input_device: Option<DeviceInfo>,
    output_device: Option<DeviceInfo>,
    input: Messenger<S, R>,
    output: Messenger<S, W>,
    diagnostics: DiagnosticSink,
}

impl<S: Sample> AudioStream<S> {
    /// Open and start a stream with the built-in scribes
    pub fn open<B: AudioBackend>(
        backend: &B,
        endpoints: Endpoints,
        config: &StreamConfig,
    ) -> AudioResult<Self> {
        Self::open_with(backend, endpoints, config, StreamSetup::from_config(config))
    }
}

impl<S: Sample, R: Scribe<S>, W: Scribe<S>> AudioStream<S, R, W> {
    /// Open and start a stream with a custom guard and scribes
    ///
    /// Nothing is opened when both directions end up without channels, a
    /// channel request exceeds its device, or the devices' default sample
    /// rates disagree and `config` names none.
    pub fn open_with<B: AudioBackend>(
        backend: &B,
        endpoints: Endpoints,
        config: &StreamConfig,
        setup: StreamSetup<R, W>,
    ) -> AudioResult<Self> {
        ensure_initialized()?;
        if config.frames_per_buffer == 0 {
            return Err(AudioError::ZeroFramesPerBuffer);
        }

        let input = resolve_side(backend, &endpoints, Direction::Input, config.adjust_channels)?;
        let output = resolve_side(backend, &endpoints, Direction::Output, config.adjust_channels)?;

        let (latency, sample_rate) = match (&input, &output) {
            (None, None) => return Err(AudioError::NoChannels),
            (Some((device, _)), None) => (
                device.input_bounds.high_latency,
                config.sample_rate.unwrap_or(device.default_sample_rate),
            ),
            (None, Some((device, _))) => (
                device.output_bounds.high_latency,
                config.sample_rate.unwrap_or(device.default_sample_rate),
            ),
            (Some((input, _)), Some((output, _))) => {
                let latency = input
                    .input_bounds
                    .high_latency
                    .max(output.output_bounds.high_latency);
                let sample_rate = match config.sample_rate {
                    Some(rate) => rate,
                    None => combine_default_sample_rates(input, output)?,
                };
                (latency, sample_rate)
            }
        };
        let latency = config.latency.unwrap_or(latency);

        let side_parameters = |side: &Side| {
            side.as_ref().map(|(device, channels)| StreamParameters {
                device: device.clone(),
                channels: *channels,
                latency,
            })
        };
        let parameters = OpenParameters {
            input: side_parameters(&input),
            output: side_parameters(&output),
            sample_rate,
            frames_per_buffer: config.frames_per_buffer,
        };

        let (opened, diagnostics) = diagnostics::capture(|| {
            debug!(?parameters, backend = backend.name(), "Opening native stream");
            backend.open_stream::<S>(&parameters)
        });
        let stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to open native stream: {}", e);
                diagnostics.flush();
                return Err(e);
            }
        };

        if let Err(e) = handle_status(stream.start(), config.warn_xruns) {
            error!("Failed to start stream: {}", e);
            if let Err(code) = stream.close() {
                debug!("Closing unstarted stream failed: {}", code);
            }
            diagnostics.flush();
            return Err(e);
        }

        let mut audio = Self {
            stream,
            sample_rate,
            frames_per_buffer: config.frames_per_buffer,
            input_device: input.as_ref().map(|(device, _)| device.clone()),
            output_device: output.as_ref().map(|(device, _)| device.clone()),
            input: Messenger::closed(Direction::Input),
            output: Messenger::closed(Direction::Output),
            diagnostics,
        };

        // Dropping `audio` on failure closes whatever was started
        if let Some((device, channels)) = input {
            let buffer = audio.channel_buffer(&setup.lock, device, Direction::Input, channels);
            audio.input = Messenger::spawn(buffer, setup.reader)?;
        }
        if let Some((device, channels)) = output {
            let buffer = audio.channel_buffer(&setup.lock, device, Direction::Output, channels);
            audio.output = Messenger::spawn(buffer, setup.writer)?;
        }

        info!(
            sample_rate = audio.sample_rate,
            frames_per_buffer = audio.frames_per_buffer,
            input_channels = audio.input_channels(),
            output_channels = audio.output_channels(),
            "Audio stream opened"
        );
        Ok(audio)
    }

    fn channel_buffer(
        &self,
        lock: &StreamLock,
        device: DeviceInfo,
        direction: Direction,
        channels: usize,
    ) -> ChannelBuffer<S> {
        ChannelBuffer::new(
            Arc::clone(&self.stream),
            Arc::clone(lock),
            device,
            direction,
            channels,
            self.frames_per_buffer,
        )
    }

    /// Send a request to the input worker and wait for its response
    pub fn exchange_input(&self, request: R::Request) -> AudioResult<R::Response> {
        self.input.exchange(request)
    }

    /// Send a request to the output worker and wait for its response
    pub fn exchange_output(&self, request: W::Request) -> AudioResult<W::Response> {
        self.output.exchange(request)
    }

    /// Whether the native stream is still open
    pub fn is_open(&self) -> AudioResult<bool> {
        match self.stream.is_stopped() {
            Ok(_) => Ok(true),
            Err(ErrorCode::BadStreamPtr) => Ok(false),
            Err(code) => Err(AudioError::Protocol(code)),
        }
    }

    /// Stop both workers and release the native stream
    ///
    /// The input worker is drained and joined before the output worker.
    /// Every step runs even when an earlier one fails; the first error is
    /// returned. Closing a closed stream does nothing.
    pub fn close(&mut self) -> AudioResult<()> {
        let input = self.input.close();
        let output = self.output.close();
        let native = self.close_native();
        self.diagnostics.flush();
        input.and(output).and(native)
    }

    fn close_native(&self) -> AudioResult<()> {
        let stop = match self.stream.is_stopped() {
            Err(ErrorCode::BadStreamPtr) => return Ok(()),
            Err(code) => Err(AudioError::Protocol(code)),
            Ok(true) => Ok(()),
            Ok(false) => handle_status(self.stream.stop(), false),
        };
        let close = handle_status(self.stream.close(), false);
        if close.is_ok() {
            info!("Audio stream closed");
        }
        stop.and(close)
    }

    /// Frames per second
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Frames per native call
    pub fn frames_per_buffer(&self) -> usize {
        self.frames_per_buffer
    }

    pub fn input_channels(&self) -> usize {
        self.input.channels()
    }

    pub fn output_channels(&self) -> usize {
        self.output.channels()
    }

    /// Device serving the input side, if it has channels
    pub fn input_device(&self) -> Option<&DeviceInfo> {
        self.input_device.as_ref()
    }

    /// Device serving the output side, if it has channels
    pub fn output_device(&self) -> Option<&DeviceInfo> {
        self.output_device.as_ref()
    }
}

impl<S, R, W> AudioStream<S, R, W>
where
    S: Sample,
    R: Scribe<S, Request = Transfer<S>, Response = Transferred<S>>,
    W: Scribe<S>,
{
    /// Read `frames` frames into a new buffer
    pub fn read(&self, frames: usize) -> AudioResult<SampleBuffer<S>> {
        let mut buffer = SampleBuffer::new(self.input_channels(), frames);
        self.read_into(&mut buffer, 0, frames)?;
        Ok(buffer)
    }

    /// Read `frames` frames into `buffer` starting at frame `offset`
    ///
    /// Returns the number of frames read.
    pub fn read_into(
        &self,
        buffer: &mut SampleBuffer<S>,
        offset: usize,
        frames: usize,
    ) -> AudioResult<usize> {
        check_buffer(Direction::Input, self.input_channels(), buffer, offset, frames)?;
        transfer(buffer, offset, frames, |request| self.input.exchange(request))
    }
}

impl<S, R, W> AudioStream<S, R, W>
where
    S: Sample,
    R: Scribe<S>,
    W: Scribe<S, Request = Transfer<S>, Response = Transferred<S>>,
{
    /// Write all of `buffer`
    ///
    /// Returns the number of frames written.
    pub fn write(&self, buffer: &mut SampleBuffer<S>) -> AudioResult<usize> {
        let frames = buffer.frames();
        self.write_from(buffer, 0, frames)
    }

    /// Write `frames` frames of `buffer` starting at frame `offset`
    ///
    /// The buffer is lent to the output worker for the duration of the
    /// call, hence `&mut`. Its contents are unchanged on success. If the
    /// worker fails, the samples are lost: the buffer comes back silent,
    /// with the same shape.
    pub fn write_from(
        &self,
        buffer: &mut SampleBuffer<S>,
        offset: usize,
        frames: usize,
    ) -> AudioResult<usize> {
        check_buffer(Direction::Output, self.output_channels(), buffer, offset, frames)?;
        transfer(buffer, offset, frames, |request| self.output.exchange(request))
    }
}

/// Validate a caller buffer against one direction before it is sent
fn check_buffer<S: Sample>(
    direction: Direction,
    channels: usize,
    buffer: &SampleBuffer<S>,
    offset: usize,
    frames: usize,
) -> AudioResult<()> {
    if channels == 0 {
        return Err(AudioError::DirectionClosed(direction));
    }
    if buffer.channels() != channels {
        return Err(AudioError::ChannelMismatch {
            direction,
            expected: channels,
            actual: buffer.channels(),
        });
    }
    buffer.check_range(offset, frames)
}

/// Lend `buffer` to a worker and take it back
///
/// If the worker fails, the buffer is replaced by a silent one of the same
/// shape.
fn transfer<S: Sample>(
    buffer: &mut SampleBuffer<S>,
    offset: usize,
    frames: usize,
    exchange: impl FnOnce(Transfer<S>) -> AudioResult<Transferred<S>>,
) -> AudioResult<usize> {
    let (channels, length) = (buffer.channels(), buffer.frames());
    let request = Transfer {
        buffer: mem::take(buffer),
        offset,
        frames,
    };
    match exchange(request) {
        Ok(response) => {
            *buffer = response.buffer;
            Ok(response.frames)
        }
        Err(e) => {
            *buffer = SampleBuffer::new(channels, length);
            Err(e)
        }
    }
}

fn resolve_side<B: AudioBackend>(
    backend: &B,
    endpoints: &Endpoints,
    direction: Direction,
    adjust: bool,
) -> AudioResult<Side> {
    let (selector, requested) = endpoints.side(direction);
    if requested == ChannelCount::Exact(0) {
        return Ok(None);
    }

    let device = match selector {
        DeviceSelector::Default => match direction {
            Direction::Input => backend.default_input_device()?,
            Direction::Output => backend.default_output_device()?,
        },
        DeviceSelector::Index(index) => find_device_by_index(&backend.devices()?, *index)?,
        DeviceSelector::Name(name) => find_device_by_name(&backend.devices()?, name)?,
        DeviceSelector::Info(info) => info.clone(),
    };

    let channels = resolve_channels(&device, direction, requested, adjust)?;
    Ok((channels > 0).then_some((device, channels)))
}

impl<S: Sample, R: Scribe<S>, W: Scribe<S>> Drop for AudioStream<S, R, W> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("Error closing audio stream: {}", e);
        }
    }
}

impl<S: Sample, R: Scribe<S>, W: Scribe<S>> fmt::Display for AudioStream<S, R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioStream at {} Hz, {} frames per buffer",
            self.sample_rate, self.frames_per_buffer
        )?;
        let sides = [
            ("input", self.input_channels(), &self.input_device),
            ("output", self.output_channels(), &self.output_device),
        ];
        for (name, channels, device) in sides {
            if let Some(device) = device {
                write!(f, "\n  {}: {} channels on \"{}\"", name, channels, device.name)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::host::initialize;
    use crate::audio::loopback::LoopbackBackend;

    fn config(frames_per_buffer: usize) -> StreamConfig {
        StreamConfig::default()
            .with_frames_per_buffer(frames_per_buffer)
            .with_warn_xruns(false)
    }

    #[test]
    fn test_open_resolves_defaults() {
        initialize();
        let backend = LoopbackBackend::new();
        let stream = AudioStream::<f32>::open(&backend, Endpoints::default(), &config(32)).unwrap();

        assert_eq!(stream.sample_rate(), 48000.0);
        assert_eq!(stream.frames_per_buffer(), 32);
        assert_eq!(stream.input_channels(), 2);
        assert_eq!(stream.output_channels(), 2);
        assert_eq!(stream.input_device().unwrap().name, "Loopback");

        let parameters = backend.last_parameters().unwrap();
        assert_eq!(parameters.input.unwrap().latency, 0.05);
        assert_eq!(parameters.frames_per_buffer, 32);
    }

    #[test]
    fn test_chunked_write_calls() {
        initialize();
        let backend = LoopbackBackend::new();
        let endpoints = Endpoints::output_only("Loopback", 2);
        let stream = AudioStream::<f32>::open(&backend, endpoints, &config(16)).unwrap();

        let mut buffer = SampleBuffer::new(2, 40);
        assert_eq!(stream.write(&mut buffer).unwrap(), 40);
        assert_eq!(backend.calls_in(Direction::Output), vec![16, 16, 8]);

        assert_eq!(stream.write_from(&mut buffer, 35, 5).unwrap(), 5);
        assert_eq!(stream.write_from(&mut buffer, 40, 0).unwrap(), 0);
        assert_eq!(backend.calls_in(Direction::Output), vec![16, 16, 8, 5]);
        assert_eq!(buffer.frames(), 40);
    }

    #[test]
    fn test_caller_side_validation() {
        initialize();
        let backend = LoopbackBackend::new();
        let endpoints = Endpoints::output_only("Loopback", 2);
        let stream = AudioStream::<f32>::open(&backend, endpoints, &config(16)).unwrap();

        let mut mono = SampleBuffer::new(1, 10);
        assert_eq!(
            stream.write(&mut mono).unwrap_err(),
            AudioError::ChannelMismatch {
                direction: Direction::Output,
                expected: 2,
                actual: 1
            }
        );

        let mut stereo = SampleBuffer::new(2, 10);
        assert_eq!(
            stream.write_from(&mut stereo, 8, 4).unwrap_err(),
            AudioError::OutOfBounds {
                offset: 8,
                frames: 4,
                len: 10
            }
        );
        assert_eq!(
            stream.read(4).unwrap_err(),
            AudioError::DirectionClosed(Direction::Input)
        );
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_start_failure_closes_handle() {
        initialize();
        let backend = LoopbackBackend::new();
        backend.fail_next_start(ErrorCode::DeviceUnavailable);

        let result = AudioStream::<f32>::open(&backend, Endpoints::default(), &config(16));
        assert_eq!(
            result.err(),
            Some(AudioError::Protocol(ErrorCode::DeviceUnavailable))
        );
        assert_eq!(backend.opened(), 1);
        assert_eq!(backend.live(), 0);
    }

    #[test]
    fn test_zero_frames_per_buffer() {
        initialize();
        let backend = LoopbackBackend::new();
        let result = AudioStream::<f32>::open(&backend, Endpoints::default(), &config(0));
        assert_eq!(result.err(), Some(AudioError::ZeroFramesPerBuffer));
        assert_eq!(backend.opened(), 0);
    }

    #[test]
    fn test_explicit_latency_and_rate() {
        initialize();
        let backend = LoopbackBackend::new();
        let config = config(16).with_latency(0.2).with_sample_rate(44100.0);
        let stream = AudioStream::<i16>::open(&backend, Endpoints::default(), &config).unwrap();

        assert_eq!(stream.sample_rate(), 44100.0);
        let parameters = backend.last_parameters().unwrap();
        assert_eq!(parameters.output.unwrap().latency, 0.2);
        assert_eq!(parameters.sample_rate, 44100.0);
    }

    #[test]
    fn test_display() {
        initialize();
        let backend = LoopbackBackend::new();
        let endpoints = Endpoints::input_only("Loopback", 1);
        let stream = AudioStream::<f32>::open(&backend, endpoints, &config(64)).unwrap();

        let summary = stream.to_string();
        assert!(summary.starts_with("AudioStream at 48000 Hz, 64 frames per buffer"));
        assert!(summary.contains("input: 1 channels on \"Loopback\""));
        assert!(!summary.contains("output"));
    }
}
