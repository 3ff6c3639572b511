//! Hardware backend on top of cpal
//!
//! cpal is callback driven and its streams are not `Send`, so each
//! [`CpalStream`] keeps its cpal streams on a dedicated host thread and
//! bridges the callbacks to blocking reads and writes through
//! [`SampleRing`]s. A callback that finds its ring empty (output) or full
//! (input) raises the matching xrun status on the next blocking call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, HostId, StreamConfig, SupportedBufferSize};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn, Dispatch};

use crate::audio::device::{find_device_by_name, Bounds, DeviceInfo};
use crate::audio::error::{AudioError, AudioResult, ErrorCode};
use crate::audio::native::{AudioBackend, NativeStream, OpenParameters, Sample, StreamParameters};
use crate::audio::ring::{RingConsumer, RingProducer, SampleRing};

/// Sample rate assumed when a device reports no default configuration
const FALLBACK_SAMPLE_RATE: f64 = 44100.0;

/// Latencies assumed when a device reports no buffer size range
const DEFAULT_LOW_LATENCY: f64 = 0.01;
const DEFAULT_HIGH_LATENCY: f64 = 0.1;

/// Backend for the platform's audio hardware
pub struct CpalBackend {
    host: Host,
}

impl CpalBackend {
    /// Use the platform's default host
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    /// Use a specific host, e.g. JACK on Linux
    pub fn with_host(id: HostId) -> AudioResult<Self> {
        let host = cpal::host_from_id(id).map_err(|e| AudioError::BackendError(e.to_string()))?;
        Ok(Self { host })
    }

    fn cpal_devices(&self) -> AudioResult<Vec<Device>> {
        Ok(self
            .host
            .devices()
            .map_err(|e| AudioError::BackendError(e.to_string()))?
            .collect())
    }

    fn describe(&self, index: usize, device: &Device) -> DeviceInfo {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let default_config = device
            .default_output_config()
            .or_else(|_| device.default_input_config())
            .ok();
        let default_sample_rate = default_config
            .as_ref()
            .map_or(FALLBACK_SAMPLE_RATE, |config| config.sample_rate().0 as f64);
        let (low_latency, high_latency) = default_config
            .as_ref()
            .map_or((DEFAULT_LOW_LATENCY, DEFAULT_HIGH_LATENCY), |config| {
                latency_bounds(config.buffer_size(), default_sample_rate)
            });

        let input_channels = device
            .supported_input_configs()
            .map(|configs| configs.map(|c| c.channels() as usize).max().unwrap_or(0))
            .unwrap_or(0);
        let output_channels = device
            .supported_output_configs()
            .map(|configs| configs.map(|c| c.channels() as usize).max().unwrap_or(0))
            .unwrap_or(0);

        let bounds = |max_channels| Bounds {
            max_channels,
            low_latency,
            high_latency,
        };

        DeviceInfo {
            index,
            name,
            host_api: self.host.id().name().to_string(),
            default_sample_rate,
            input_bounds: bounds(input_channels),
            output_bounds: bounds(output_channels),
        }
    }

    fn find_default(&self, device: Option<Device>) -> AudioResult<DeviceInfo> {
        let device = device.ok_or_else(|| AudioError::DeviceNotFound("default".to_string()))?;
        let name = device.name().map_err(|e| AudioError::BackendError(e.to_string()))?;
        find_device_by_name(&self.devices()?, &name)
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency bounds derived from a device's buffer size range
fn latency_bounds(buffer_size: &SupportedBufferSize, sample_rate: f64) -> (f64, f64) {
    match buffer_size {
        SupportedBufferSize::Range { min, max } => {
            let low = *min as f64 / sample_rate;
            let high = (*max as f64 / sample_rate).clamp(low, DEFAULT_HIGH_LATENCY.max(low));
            (low, high)
        }
        SupportedBufferSize::Unknown => (DEFAULT_LOW_LATENCY, DEFAULT_HIGH_LATENCY),
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &'static str {
        self.host.id().name()
    }

    fn devices(&self) -> AudioResult<Vec<DeviceInfo>> {
        let devices = self.cpal_devices()?;
        Ok(devices
            .iter()
            .enumerate()
            .map(|(index, device)| self.describe(index, device))
            .collect())
    }

    fn default_input_device(&self) -> AudioResult<DeviceInfo> {
        self.find_default(self.host.default_input_device())
    }

    fn default_output_device(&self) -> AudioResult<DeviceInfo> {
        self.find_default(self.host.default_output_device())
    }

    fn open_stream<S: Sample>(
        &self,
        parameters: &OpenParameters,
    ) -> AudioResult<Arc<dyn NativeStream<S>>> {
        let stream = CpalStream::<S>::open(self.host.id(), parameters)?;
        Ok(Arc::new(stream))
    }
}

type Reply = Sender<Result<(), ErrorCode>>;

/// Commands for a stream's host thread
enum Command {
    Play(Reply),
    Pause(Reply),
}

/// State shared between the callbacks and the blocking side
#[derive(Default)]
struct StreamFlags {
    stopped: AtomicBool,
    closed: AtomicBool,
    input_overflowed: AtomicBool,
    output_underflowed: AtomicBool,
}

/// Native stream backed by cpal input and output streams
pub struct CpalStream<S: Sample> {
    input: Option<Mutex<RingConsumer<S>>>,
    output: Option<Mutex<RingProducer<S>>>,
    input_channels: usize,
    output_channels: usize,
    flags: Arc<StreamFlags>,
    commands: Mutex<Option<Sender<Command>>>,
    host_thread: Mutex<Option<JoinHandle<()>>>,
    poll_interval: Duration,
    drain_timeout: Duration,
}

impl<S: Sample> CpalStream<S> {
    /// Build the cpal streams on a new host thread, stopped
    pub fn open(host_id: HostId, parameters: &OpenParameters) -> AudioResult<Self> {
        let sample_rate = parameters.sample_rate;
        let frames_per_buffer = parameters.frames_per_buffer;
        let flags = Arc::new(StreamFlags::default());
        flags.stopped.store(true, Ordering::SeqCst);

        let ring_frames = |side: &StreamParameters| {
            ((side.latency * sample_rate).ceil() as usize).max(frames_per_buffer)
                + frames_per_buffer
        };
        let (input_producer, input_consumer) = match &parameters.input {
            Some(side) => {
                let (producer, consumer) = SampleRing::new::<S>(ring_frames(side) * side.channels);
                (Some(producer), Some(Mutex::new(consumer)))
            }
            None => (None, None),
        };
        let (output_producer, output_consumer) = match &parameters.output {
            Some(side) => {
                let (producer, consumer) = SampleRing::new::<S>(ring_frames(side) * side.channels);
                (Some(Mutex::new(producer)), Some(consumer))
            }
            None => (None, None),
        };

        let (command_tx, command_rx) = bounded(1);
        let (ready_tx, ready_rx) = bounded(1);
        let thread_parameters = parameters.clone();
        let thread_flags = Arc::clone(&flags);
        let dispatch = tracing::dispatcher::get_default(|current| current.clone());

        let host_thread = thread::Builder::new()
            .name("duplex-audio-host".to_string())
            .spawn(move || {
                run_host_thread(
                    host_id,
                    dispatch,
                    thread_parameters,
                    input_producer,
                    output_consumer,
                    thread_flags,
                    ready_tx,
                    command_rx,
                )
            })
            .map_err(|e| AudioError::StreamBuildFailed(e.to_string()))?;

        let ready = ready_rx
            .recv()
            .map_err(|_| AudioError::StreamBuildFailed("Host thread exited".to_string()))?;
        if let Err(e) = ready {
            let _ = host_thread.join();
            return Err(e);
        }

        let poll_seconds = (frames_per_buffer as f64 / sample_rate / 4.0).clamp(0.0005, 0.01);
        let drain_seconds = parameters
            .output
            .as_ref()
            .map_or(0.0, |side| ring_frames(side) as f64 / sample_rate * 2.0);

        Ok(Self {
            input: input_consumer,
            output: output_producer,
            input_channels: parameters.input.as_ref().map_or(0, |side| side.channels),
            output_channels: parameters.output.as_ref().map_or(0, |side| side.channels),
            flags,
            commands: Mutex::new(Some(command_tx)),
            host_thread: Mutex::new(Some(host_thread)),
            poll_interval: Duration::from_secs_f64(poll_seconds),
            drain_timeout: Duration::from_secs_f64(drain_seconds),
        })
    }

    fn ensure_open(&self) -> Result<(), ErrorCode> {
        if self.flags.closed.load(Ordering::SeqCst) {
            Err(ErrorCode::BadStreamPtr)
        } else {
            Ok(())
        }
    }

    fn ensure_running(&self) -> Result<(), ErrorCode> {
        self.ensure_open()?;
        if self.flags.stopped.load(Ordering::SeqCst) {
            Err(ErrorCode::StreamIsStopped)
        } else {
            Ok(())
        }
    }

    fn send_command(&self, command: impl FnOnce(Reply) -> Command) -> Result<(), ErrorCode> {
        let (reply_tx, reply_rx) = bounded(1);
        let commands = self.commands.lock();
        let commands = commands.as_ref().ok_or(ErrorCode::BadStreamPtr)?;
        commands
            .send(command(reply_tx))
            .map_err(|_| ErrorCode::InternalError)?;
        reply_rx.recv().map_err(|_| ErrorCode::InternalError)?
    }

    /// Wait until the output ring has been played out, or give up
    fn drain_output(&self) {
        let Some(output) = &self.output else {
            return;
        };
        let deadline = Instant::now() + self.drain_timeout;
        while output.lock().pending() > 0 {
            if Instant::now() >= deadline {
                warn!("Output did not drain before stopping");
                return;
            }
            thread::sleep(self.poll_interval);
        }
    }
}

impl<S: Sample> NativeStream<S> for CpalStream<S> {
    fn start(&self) -> Result<(), ErrorCode> {
        self.ensure_open()?;
        if !self.flags.stopped.load(Ordering::SeqCst) {
            return Err(ErrorCode::StreamIsNotStopped);
        }
        self.flags.input_overflowed.store(false, Ordering::SeqCst);
        self.flags.output_underflowed.store(false, Ordering::SeqCst);
        self.flags.stopped.store(false, Ordering::SeqCst);
        let result = self.send_command(Command::Play);
        if result.is_err() {
            self.flags.stopped.store(true, Ordering::SeqCst);
        }
        result
    }

    fn stop(&self) -> Result<(), ErrorCode> {
        self.ensure_open()?;
        if self.flags.stopped.load(Ordering::SeqCst) {
            return Err(ErrorCode::StreamIsStopped);
        }
        self.drain_output();
        self.flags.stopped.store(true, Ordering::SeqCst);
        self.send_command(Command::Pause)
    }

    fn is_stopped(&self) -> Result<bool, ErrorCode> {
        self.ensure_open()?;
        Ok(self.flags.stopped.load(Ordering::SeqCst))
    }

    fn close(&self) -> Result<(), ErrorCode> {
        if self.flags.closed.swap(true, Ordering::SeqCst) {
            return Err(ErrorCode::BadStreamPtr);
        }
        self.flags.stopped.store(true, Ordering::SeqCst);
        self.commands.lock().take();
        if let Some(host_thread) = self.host_thread.lock().take() {
            host_thread.join().map_err(|_| ErrorCode::InternalError)?;
        }
        debug!("cpal stream closed");
        Ok(())
    }

    fn read(&self, buffer: &mut [S], frames: usize) -> Result<(), ErrorCode> {
        let input = self
            .input
            .as_ref()
            .ok_or(ErrorCode::CanNotReadFromAnOutputOnlyStream)?;
        let wanted = frames * self.input_channels;
        let target = buffer.get_mut(..wanted).ok_or(ErrorCode::BadBufferPtr)?;

        let mut consumer = input.lock();
        let mut filled = 0;
        loop {
            self.ensure_running()?;
            filled += consumer.pop_slice(&mut target[filled..]);
            if filled == wanted {
                break;
            }
            thread::sleep(self.poll_interval);
        }

        if self.flags.input_overflowed.swap(false, Ordering::SeqCst) {
            return Err(ErrorCode::InputOverflowed);
        }
        Ok(())
    }

    fn write(&self, buffer: &[S], frames: usize) -> Result<(), ErrorCode> {
        let output = self
            .output
            .as_ref()
            .ok_or(ErrorCode::CanNotWriteToAnInputOnlyStream)?;
        let wanted = frames * self.output_channels;
        let source = buffer.get(..wanted).ok_or(ErrorCode::BadBufferPtr)?;

        let mut producer = output.lock();
        let mut sent = 0;
        loop {
            self.ensure_running()?;
            sent += producer.push_slice(&source[sent..]);
            if sent == wanted {
                break;
            }
            thread::sleep(self.poll_interval);
        }

        if self.flags.output_underflowed.swap(false, Ordering::SeqCst) {
            return Err(ErrorCode::OutputUnderflowed);
        }
        Ok(())
    }
}

impl<S: Sample> Drop for CpalStream<S> {
    fn drop(&mut self) {
        if !self.flags.closed.load(Ordering::SeqCst) {
            let _ = NativeStream::<S>::close(self);
        }
    }
}

/// Own the cpal streams for their whole life
///
/// Streams are built under `dispatch`, the opening thread's subscriber, so
/// build-time events land in the same place as the rest of the open.
fn run_host_thread<S: Sample>(
    host_id: HostId,
    dispatch: Dispatch,
    parameters: OpenParameters,
    input: Option<RingProducer<S>>,
    output: Option<RingConsumer<S>>,
    flags: Arc<StreamFlags>,
    ready: Sender<AudioResult<()>>,
    commands: Receiver<Command>,
) {
    let built = tracing::dispatcher::with_default(&dispatch, || {
        let built = build_streams(host_id, &parameters, input, output, &flags);
        match &built {
            Ok(streams) => info!(streams = streams.len(), "cpal streams ready"),
            Err(e) => error!("Failed to build cpal streams: {}", e),
        }
        built
    });
    drop(dispatch);
    let streams = match built {
        Ok(streams) => {
            let _ = ready.send(Ok(()));
            streams
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    while let Ok(command) = commands.recv() {
        match command {
            Command::Play(reply) => {
                let result = streams.iter().try_for_each(|stream| stream.play());
                let _ = reply.send(result.map_err(|e| {
                    error!("Failed to start cpal stream: {}", e);
                    ErrorCode::UnanticipatedHostError
                }));
            }
            Command::Pause(reply) => {
                if let Err(e) = streams.iter().try_for_each(|stream| stream.pause()) {
                    debug!("cpal stream cannot pause, relying on stopped flag: {}", e);
                }
                let _ = reply.send(Ok(()));
            }
        }
    }

    drop(streams);
    debug!("cpal host thread finished");
}

fn find_cpal_device(host: &Host, name: &str) -> AudioResult<Device> {
    host.devices()
        .map_err(|e| AudioError::BackendError(e.to_string()))?
        .find(|device| device.name().map(|n| n == name).unwrap_or(false))
        .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))
}

/// cpal config for one side, refusing values cpal cannot represent
fn stream_config(side: &StreamParameters, sample_rate: f64) -> Result<StreamConfig, ErrorCode> {
    let channels = u16::try_from(side.channels).map_err(|_| ErrorCode::InvalidChannelCount)?;
    if sample_rate.fract() != 0.0 || sample_rate < 1.0 || sample_rate > f64::from(u32::MAX) {
        return Err(ErrorCode::InvalidSampleRate);
    }
    Ok(StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate as u32),
        buffer_size: cpal::BufferSize::Default,
    })
}

fn build_streams<S: Sample>(
    host_id: HostId,
    parameters: &OpenParameters,
    input: Option<RingProducer<S>>,
    output: Option<RingConsumer<S>>,
    flags: &Arc<StreamFlags>,
) -> AudioResult<Vec<cpal::Stream>> {
    let host = cpal::host_from_id(host_id).map_err(|e| AudioError::BackendError(e.to_string()))?;
    let mut streams = Vec::new();

    if let (Some(side), Some(mut producer)) = (&parameters.input, input) {
        let device = find_cpal_device(&host, &side.device.name)?;
        let config = stream_config(side, parameters.sample_rate).map_err(AudioError::Protocol)?;
        let callback_flags = Arc::clone(flags);
        info!(
            device = %side.device.name,
            channels = side.channels,
            sample_rate = parameters.sample_rate,
            "Building input stream"
        );

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[S], _: &cpal::InputCallbackInfo| {
                    if producer.push_slice(data) < data.len()
                        && !callback_flags.stopped.load(Ordering::Relaxed)
                    {
                        callback_flags.input_overflowed.store(true, Ordering::Relaxed);
                    }
                },
                move |err| {
                    error!("Audio input stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::StreamBuildFailed(e.to_string()))?;
        streams.push(stream);
    }

    if let (Some(side), Some(mut consumer)) = (&parameters.output, output) {
        let device = find_cpal_device(&host, &side.device.name)?;
        let config = stream_config(side, parameters.sample_rate).map_err(AudioError::Protocol)?;
        let callback_flags = Arc::clone(flags);
        info!(
            device = %side.device.name,
            channels = side.channels,
            sample_rate = parameters.sample_rate,
            "Building output stream"
        );

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [S], _: &cpal::OutputCallbackInfo| {
                    let popped = consumer.pop_slice(data);
                    if popped < data.len() {
                        data[popped..].fill(S::silence());
                        if !callback_flags.stopped.load(Ordering::Relaxed) {
                            callback_flags.output_underflowed.store(true, Ordering::Relaxed);
                        }
                    }
                },
                move |err| {
                    error!("Audio output stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::StreamBuildFailed(e.to_string()))?;
        streams.push(stream);
    }

    // Some hosts start streams as soon as they are built
    for stream in &streams {
        let _ = stream.pause();
    }

    Ok(streams)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::diagnostics;

    fn side(name: &str, channels: usize) -> StreamParameters {
        StreamParameters {
            device: DeviceInfo {
                index: 0,
                name: name.to_string(),
                host_api: "test".to_string(),
                default_sample_rate: 48000.0,
                input_bounds: Bounds::default(),
                output_bounds: Bounds {
                    max_channels: channels,
                    low_latency: DEFAULT_LOW_LATENCY,
                    high_latency: DEFAULT_HIGH_LATENCY,
                },
            },
            channels,
            latency: DEFAULT_LOW_LATENCY,
        }
    }

    #[test]
    fn test_stream_config() {
        let config = stream_config(&side("Speakers", 2), 48000.0).unwrap();
        assert_eq!(config.channels, 2);
        assert_eq!(config.sample_rate, cpal::SampleRate(48000));
    }

    #[test]
    fn test_stream_config_rejects_unrepresentable_values() {
        assert_eq!(
            stream_config(&side("Speakers", 70000), 48000.0).unwrap_err(),
            ErrorCode::InvalidChannelCount
        );
        assert_eq!(
            stream_config(&side("Speakers", 2), 44100.5).unwrap_err(),
            ErrorCode::InvalidSampleRate
        );
        assert_eq!(
            stream_config(&side("Speakers", 2), 0.0).unwrap_err(),
            ErrorCode::InvalidSampleRate
        );
    }

    #[test]
    fn test_build_failure_is_captured() {
        let parameters = OpenParameters {
            input: None,
            output: Some(side("duplex-audio missing device", 2)),
            sample_rate: 48000.0,
            frames_per_buffer: 256,
        };

        let (opened, sink) = diagnostics::capture(|| {
            CpalStream::<f32>::open(cpal::default_host().id(), &parameters)
        });

        assert!(opened.is_err());
        assert!(sink.contents().contains("Failed to build cpal streams"));
    }

    #[test]
    fn test_latency_bounds_from_range() {
        let range = SupportedBufferSize::Range { min: 480, max: 96000 };
        let (low, high) = latency_bounds(&range, 48000.0);
        assert!((low - 0.01).abs() < 1e-9);
        assert!((high - DEFAULT_HIGH_LATENCY).abs() < 1e-9);

        let (low, high) = latency_bounds(&SupportedBufferSize::Unknown, 48000.0);
        assert_eq!((low, high), (DEFAULT_LOW_LATENCY, DEFAULT_HIGH_LATENCY));
    }

    #[test]
    fn test_list_devices() {
        let backend = CpalBackend::new();
        match backend.devices() {
            Ok(devices) => {
                for (position, device) in devices.iter().enumerate() {
                    assert_eq!(device.index, position);
                    assert!(!device.name.is_empty(), "Device name should not be empty");
                    assert!(device.default_sample_rate > 0.0);
                    println!("  - {}", device);
                }
            }
            Err(e) => {
                eprintln!("Warning: Could not list devices: {}", e);
                // Don't fail the test if no devices are available (e.g., in CI)
            }
        }
    }

    #[test]
    fn test_default_output_device() {
        let backend = CpalBackend::new();
        match backend.default_output_device() {
            Ok(device) => {
                assert!(device.output_bounds.max_channels > 0);
                println!("Default output device: {}", device);
            }
            Err(e) => {
                eprintln!("Warning: Could not get default device: {}", e);
            }
        }
    }
}
