//! In-memory loopback backend
//!
//! Every sample written to a [`LoopbackStream`] comes back out of its input
//! side, in order. Input reads that find the wire short are padded with
//! silence. The backend records each native read and write so callers can
//! check how transfers were chunked, and can be told to fail the next call
//! in a direction with any status code.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::audio::device::{Bounds, DeviceInfo, Direction};
use crate::audio::error::{AudioError, AudioResult, ErrorCode};
use crate::audio::native::{AudioBackend, NativeStream, OpenParameters, Sample};

/// One native read or write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeCall {
    pub direction: Direction,
    pub frames: usize,
}

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<NativeCall>>,
    injected: Mutex<Vec<(Direction, ErrorCode)>>,
    start_failure: Mutex<Option<ErrorCode>>,
    open_failure: Mutex<Option<ErrorCode>>,
    last_parameters: Mutex<Option<OpenParameters>>,
    opened: AtomicUsize,
    live: AtomicUsize,
    in_call: AtomicBool,
    overlaps: AtomicUsize,
}

impl Shared {
    /// Take the first status injected for `direction`
    fn take_injected(&self, direction: Direction) -> Option<ErrorCode> {
        let mut injected = self.injected.lock();
        let position = injected.iter().position(|(d, _)| *d == direction)?;
        Some(injected.remove(position).1)
    }

    fn enter(&self, direction: Direction, frames: usize) {
        if self.in_call.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.calls.lock().push(NativeCall { direction, frames });
    }

    fn leave(&self) {
        self.in_call.store(false, Ordering::SeqCst);
    }
}

/// Backend whose streams loop output back to input
#[derive(Clone)]
pub struct LoopbackBackend {
    devices: Vec<DeviceInfo>,
    shared: Arc<Shared>,
}

impl LoopbackBackend {
    /// One stereo-in, stereo-out device at 48 kHz
    pub fn new() -> Self {
        Self::with_devices(vec![Self::device(0, "Loopback", 2, 2, 48000.0)])
    }

    /// A backend serving the given catalog
    pub fn with_devices(devices: Vec<DeviceInfo>) -> Self {
        Self {
            devices,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Describe a loopback device
    pub fn device(
        index: usize,
        name: &str,
        input_channels: usize,
        output_channels: usize,
        default_sample_rate: f64,
    ) -> DeviceInfo {
        let bounds = |max_channels| Bounds {
            max_channels,
            low_latency: 0.005,
            high_latency: 0.05,
        };
        DeviceInfo {
            index,
            name: name.to_string(),
            host_api: "Loopback".to_string(),
            default_sample_rate,
            input_bounds: bounds(input_channels),
            output_bounds: bounds(output_channels),
        }
    }

    /// Every native read and write so far, in order
    pub fn calls(&self) -> Vec<NativeCall> {
        self.shared.calls.lock().clone()
    }

    /// Native calls in one direction
    pub fn calls_in(&self, direction: Direction) -> Vec<usize> {
        self.shared
            .calls
            .lock()
            .iter()
            .filter(|call| call.direction == direction)
            .map(|call| call.frames)
            .collect()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.shared.calls.lock().clear();
    }

    /// Make the next native call in `direction` report `code`
    pub fn inject_status(&self, direction: Direction, code: ErrorCode) {
        self.shared.injected.lock().push((direction, code));
    }

    /// Make the next `start` report `code`
    pub fn fail_next_start(&self, code: ErrorCode) {
        *self.shared.start_failure.lock() = Some(code);
    }

    /// Make the next `open_stream` refuse with `code`
    pub fn fail_next_open(&self, code: ErrorCode) {
        *self.shared.open_failure.lock() = Some(code);
    }

    /// Parameters of the most recently opened stream
    pub fn last_parameters(&self) -> Option<OpenParameters> {
        self.shared.last_parameters.lock().clone()
    }

    /// Streams opened so far
    pub fn opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    /// Streams opened and not yet closed
    pub fn live(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    /// Native calls that began while another was still running
    pub fn overlaps(&self) -> usize {
        self.shared.overlaps.load(Ordering::SeqCst)
    }

    fn default_for(&self, direction: Direction) -> AudioResult<DeviceInfo> {
        self.devices
            .iter()
            .find(|device| device.bounds(direction).max_channels > 0)
            .or_else(|| self.devices.first())
            .cloned()
            .ok_or_else(|| AudioError::DeviceNotFound(format!("default {}", direction)))
    }
}

impl Default for LoopbackBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for LoopbackBackend {
    fn name(&self) -> &'static str {
        "Loopback"
    }

    fn devices(&self) -> AudioResult<Vec<DeviceInfo>> {
        Ok(self.devices.clone())
    }

    fn default_input_device(&self) -> AudioResult<DeviceInfo> {
        self.default_for(Direction::Input)
    }

    fn default_output_device(&self) -> AudioResult<DeviceInfo> {
        self.default_for(Direction::Output)
    }

    fn open_stream<S: Sample>(
        &self,
        parameters: &OpenParameters,
    ) -> AudioResult<Arc<dyn NativeStream<S>>> {
        if parameters.input.is_none() && parameters.output.is_none() {
            return Err(AudioError::Protocol(ErrorCode::InvalidChannelCount));
        }
        if parameters.sample_rate <= 0.0 {
            return Err(AudioError::Protocol(ErrorCode::InvalidSampleRate));
        }
        if let Some(code) = self.shared.open_failure.lock().take() {
            warn!("Loopback device refused to open: {}", code);
            return Err(AudioError::Protocol(code));
        }

        *self.shared.last_parameters.lock() = Some(parameters.clone());
        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        self.shared.live.fetch_add(1, Ordering::SeqCst);
        debug!(
            sample_rate = parameters.sample_rate,
            frames_per_buffer = parameters.frames_per_buffer,
            "Loopback stream opened"
        );

        Ok(Arc::new(LoopbackStream {
            shared: Arc::clone(&self.shared),
            input_channels: parameters.input.as_ref().map_or(0, |side| side.channels),
            output_channels: parameters.output.as_ref().map_or(0, |side| side.channels),
            wire: Mutex::new(VecDeque::new()),
            stopped: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Native stream of a [`LoopbackBackend`]
pub struct LoopbackStream<S: Sample> {
    shared: Arc<Shared>,
    input_channels: usize,
    output_channels: usize,
    wire: Mutex<VecDeque<S>>,
    stopped: AtomicBool,
    closed: AtomicBool,
}

impl<S: Sample> LoopbackStream<S> {
    fn check(&self, direction: Direction) -> Result<(), ErrorCode> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ErrorCode::BadStreamPtr);
        }
        let channels = match direction {
            Direction::Input => self.input_channels,
            Direction::Output => self.output_channels,
        };
        if channels == 0 {
            return Err(match direction {
                Direction::Input => ErrorCode::CanNotReadFromAnOutputOnlyStream,
                Direction::Output => ErrorCode::CanNotWriteToAnInputOnlyStream,
            });
        }
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ErrorCode::StreamIsStopped);
        }
        Ok(())
    }
}

impl<S: Sample> NativeStream<S> for LoopbackStream<S> {
    fn start(&self) -> Result<(), ErrorCode> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ErrorCode::BadStreamPtr);
        }
        if let Some(code) = self.shared.start_failure.lock().take() {
            return Err(code);
        }
        if !self.stopped.swap(false, Ordering::SeqCst) {
            return Err(ErrorCode::StreamIsNotStopped);
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), ErrorCode> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ErrorCode::BadStreamPtr);
        }
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Err(ErrorCode::StreamIsStopped);
        }
        Ok(())
    }

    fn is_stopped(&self) -> Result<bool, ErrorCode> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ErrorCode::BadStreamPtr);
        }
        Ok(self.stopped.load(Ordering::SeqCst))
    }

    fn close(&self) -> Result<(), ErrorCode> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(ErrorCode::BadStreamPtr);
        }
        self.wire.lock().clear();
        self.shared.live.fetch_sub(1, Ordering::SeqCst);
        debug!("Loopback stream closed");
        Ok(())
    }

    fn read(&self, buffer: &mut [S], frames: usize) -> Result<(), ErrorCode> {
        self.check(Direction::Input)?;
        let samples = frames * self.input_channels;
        let target = buffer.get_mut(..samples).ok_or(ErrorCode::BadBufferPtr)?;

        self.shared.enter(Direction::Input, frames);
        {
            let mut wire = self.wire.lock();
            for sample in target.iter_mut() {
                *sample = wire.pop_front().unwrap_or_else(S::silence);
            }
        }
        self.shared.leave();

        match self.shared.take_injected(Direction::Input) {
            Some(code) => Err(code),
            None => Ok(()),
        }
    }

    fn write(&self, buffer: &[S], frames: usize) -> Result<(), ErrorCode> {
        self.check(Direction::Output)?;
        let samples = frames * self.output_channels;
        let source = buffer.get(..samples).ok_or(ErrorCode::BadBufferPtr)?;

        self.shared.enter(Direction::Output, frames);
        self.wire.lock().extend(source.iter().copied());
        self.shared.leave();

        match self.shared.take_injected(Direction::Output) {
            Some(code) => Err(code),
            None => Ok(()),
        }
    }
}

impl<S: Sample> Drop for LoopbackStream<S> {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            let _ = NativeStream::<S>::close(self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::native::StreamParameters;

    fn parameters(backend: &LoopbackBackend, input: usize, output: usize) -> OpenParameters {
        let device = backend.devices().unwrap().remove(0);
        let side = |channels| {
            (channels > 0).then(|| StreamParameters {
                device: device.clone(),
                channels,
                latency: 0.05,
            })
        };
        OpenParameters {
            input: side(input),
            output: side(output),
            sample_rate: 48000.0,
            frames_per_buffer: 4,
        }
    }

    #[test]
    fn test_loops_output_to_input() {
        let backend = LoopbackBackend::new();
        let stream = backend.open_stream::<f32>(&parameters(&backend, 2, 2)).unwrap();
        stream.start().unwrap();

        stream.write(&[1.0, 2.0, 3.0, 4.0], 2).unwrap();
        let mut read = [0.0f32; 6];
        stream.read(&mut read, 3).unwrap();

        assert_eq!(read, [1.0, 2.0, 3.0, 4.0, 0.0, 0.0]);
        assert_eq!(
            backend.calls(),
            vec![
                NativeCall { direction: Direction::Output, frames: 2 },
                NativeCall { direction: Direction::Input, frames: 3 },
            ]
        );
    }

    #[test]
    fn test_stopped_and_closed_states() {
        let backend = LoopbackBackend::new();
        let stream = backend.open_stream::<i16>(&parameters(&backend, 2, 2)).unwrap();

        assert_eq!(stream.is_stopped(), Ok(true));
        assert_eq!(stream.write(&[0; 2], 1), Err(ErrorCode::StreamIsStopped));

        stream.start().unwrap();
        assert_eq!(stream.start(), Err(ErrorCode::StreamIsNotStopped));
        stream.stop().unwrap();

        assert_eq!(backend.live(), 1);
        stream.close().unwrap();
        assert_eq!(backend.live(), 0);
        assert_eq!(stream.is_stopped(), Err(ErrorCode::BadStreamPtr));
        assert_eq!(stream.close(), Err(ErrorCode::BadStreamPtr));
    }

    #[test]
    fn test_one_sided_stream_rejects_other_direction() {
        let backend = LoopbackBackend::new();
        let stream = backend.open_stream::<f32>(&parameters(&backend, 0, 2)).unwrap();
        stream.start().unwrap();

        let mut read = [0.0f32; 2];
        assert_eq!(
            stream.read(&mut read, 1),
            Err(ErrorCode::CanNotReadFromAnOutputOnlyStream)
        );
    }

    #[test]
    fn test_injected_status() {
        let backend = LoopbackBackend::new();
        let stream = backend.open_stream::<f32>(&parameters(&backend, 2, 2)).unwrap();
        stream.start().unwrap();

        backend.inject_status(Direction::Output, ErrorCode::OutputUnderflowed);
        assert_eq!(stream.write(&[0.0; 2], 1), Err(ErrorCode::OutputUnderflowed));
        assert_eq!(stream.write(&[0.0; 2], 1), Ok(()));
    }

    #[test]
    fn test_drop_closes() {
        let backend = LoopbackBackend::new();
        {
            let _stream = backend.open_stream::<f32>(&parameters(&backend, 1, 1)).unwrap();
            assert_eq!(backend.live(), 1);
        }
        assert_eq!(backend.live(), 0);
        assert_eq!(backend.opened(), 1);
    }
}
