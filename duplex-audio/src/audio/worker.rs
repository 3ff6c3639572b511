//! Worker threads and the rendezvous handoff
//!
//! Each stream direction runs one worker that owns the direction's
//! [`ChannelBuffer`] and [`Scribe`]. Callers reach it through a
//! [`Messenger`]: a request queue and a response queue, both with capacity
//! zero, so a send only completes once the other side takes the message.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, error, info};

use crate::audio::buffer::ChannelBuffer;
use crate::audio::device::Direction;
use crate::audio::error::{AudioError, AudioResult};
use crate::audio::native::Sample;
use crate::audio::scribe::Scribe;

type Reply<R> = AudioResult<R>;

/// Caller-side endpoints of one direction
pub(crate) struct Messenger<S: Sample, W: Scribe<S>> {
    direction: Direction,
    channels: usize,
    requests: Option<Sender<W::Request>>,
    responses: Receiver<Reply<W::Response>>,
    worker: Option<JoinHandle<AudioResult<()>>>,
}

impl<S: Sample, W: Scribe<S>> Messenger<S, W> {
    /// Spawn a worker for `buffer`, or open closed queues for a direction
    /// without channels
    pub(crate) fn spawn(buffer: ChannelBuffer<S>, scribe: W) -> AudioResult<Self> {
        let direction = buffer.direction();
        let channels = buffer.channels();
        if channels == 0 {
            debug!(direction = %direction, "No channels, not starting a worker");
            return Ok(Self::closed(direction));
        }

        let (request_tx, request_rx) = bounded(0);
        let (response_tx, response_rx) = bounded(0);

        let worker = thread::Builder::new()
            .name(format!("duplex-audio-{}", direction))
            .spawn(move || run_worker(buffer, scribe, request_rx, response_tx))
            .map_err(|e| AudioError::BackendError(format!("Failed to spawn worker: {}", e)))?;

        Ok(Self {
            direction,
            channels,
            requests: Some(request_tx),
            responses: response_rx,
            worker: Some(worker),
        })
    }

    /// Endpoints for a direction without channels
    ///
    /// Both queues are created already closed, so every exchange fails
    /// with `DirectionClosed` without blocking.
    pub(crate) fn closed(direction: Direction) -> Self {
        let (request_tx, _) = bounded(0);
        let (_, response_rx) = bounded(0);
        Self {
            direction,
            channels: 0,
            requests: Some(request_tx),
            responses: response_rx,
            worker: None,
        }
    }

    pub(crate) fn channels(&self) -> usize {
        self.channels
    }

    /// Send a request and block for its response
    pub(crate) fn exchange(&self, request: W::Request) -> AudioResult<W::Response> {
        let closed = AudioError::DirectionClosed(self.direction);
        let requests = self.requests.as_ref().ok_or_else(|| closed.clone())?;

        requests.send(request).map_err(|_| closed.clone())?;
        self.responses.recv().map_err(|_| closed)?
    }

    /// Close the request queue and wait for the worker to finish
    ///
    /// Returns the error the worker stopped on, if any. Does nothing on a
    /// messenger that is already closed.
    pub(crate) fn close(&mut self) -> AudioResult<()> {
        self.requests.take();
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| AudioError::WorkerPanicked(self.direction))?,
            None => Ok(()),
        }
    }
}

/// Serve requests until the request queue closes
///
/// A failed transfer is reported to the waiting caller and ends the loop
/// with the same error; dropping `responses` on exit closes the response
/// queue.
fn run_worker<S: Sample, W: Scribe<S>>(
    mut buffer: ChannelBuffer<S>,
    mut scribe: W,
    requests: Receiver<W::Request>,
    responses: Sender<Reply<W::Response>>,
) -> AudioResult<()> {
    let direction = buffer.direction();
    info!(
        direction = %direction,
        device = %buffer.device().name,
        channels = buffer.channels(),
        chunk_frames = buffer.chunk_frames(),
        "Worker started"
    );

    let mut served = 0u64;
    while let Ok(request) = requests.recv() {
        match scribe.execute(&mut buffer, request) {
            Ok(response) => {
                served += 1;
                if responses.send(Ok(response)).is_err() {
                    debug!(direction = %direction, "Caller went away, dropping response");
                }
            }
            Err(e) => {
                error!(direction = %direction, "Transfer failed: {}", e);
                let _ = responses.send(Err(e.clone()));
                return Err(e);
            }
        }
    }

    info!(direction = %direction, requests = served, "Worker finished, request queue closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::audio::buffer::SampleBuffer;
    use crate::audio::device::{Bounds, DeviceInfo};
    use crate::audio::error::ErrorCode;
    use crate::audio::native::{new_stream_lock, NativeStream};
    use crate::audio::scribe::{SampleWriter, Transfer};

    /// Native stream that accepts everything and fails on demand
    struct Sink {
        fail: bool,
    }

    impl NativeStream<f32> for Sink {
        fn start(&self) -> Result<(), ErrorCode> {
            Ok(())
        }
        fn stop(&self) -> Result<(), ErrorCode> {
            Ok(())
        }
        fn is_stopped(&self) -> Result<bool, ErrorCode> {
            Ok(false)
        }
        fn close(&self) -> Result<(), ErrorCode> {
            Ok(())
        }
        fn read(&self, _buffer: &mut [f32], _frames: usize) -> Result<(), ErrorCode> {
            Ok(())
        }
        fn write(&self, _buffer: &[f32], _frames: usize) -> Result<(), ErrorCode> {
            if self.fail {
                Err(ErrorCode::DeviceUnavailable)
            } else {
                Ok(())
            }
        }
    }

    fn channel_buffer(channels: usize, fail: bool) -> ChannelBuffer<f32> {
        let device = DeviceInfo {
            index: 0,
            name: "sink".to_string(),
            host_api: "test".to_string(),
            default_sample_rate: 48000.0,
            input_bounds: Bounds::default(),
            output_bounds: Bounds {
                max_channels: 2,
                low_latency: 0.01,
                high_latency: 0.1,
            },
        };
        ChannelBuffer::new(
            Arc::new(Sink { fail }),
            new_stream_lock(),
            device,
            Direction::Output,
            channels,
            16,
        )
    }

    fn request(frames: usize) -> Transfer<f32> {
        Transfer {
            buffer: SampleBuffer::new(2, frames),
            offset: 0,
            frames,
        }
    }

    #[test]
    fn test_exchange_round_trip() {
        let mut messenger =
            Messenger::spawn(channel_buffer(2, false), SampleWriter::new(false)).unwrap();

        let response = messenger.exchange(request(40)).unwrap();
        assert_eq!(response.frames, 40);
        assert_eq!(response.buffer.frames(), 40);

        assert!(messenger.close().is_ok());
        assert_eq!(
            messenger.exchange(request(1)).unwrap_err(),
            AudioError::DirectionClosed(Direction::Output)
        );
    }

    #[test]
    fn test_zero_channels_fail_fast() {
        let mut messenger =
            Messenger::spawn(channel_buffer(0, false), SampleWriter::new(false)).unwrap();

        assert_eq!(messenger.channels(), 0);
        assert_eq!(
            messenger.exchange(request(1)).unwrap_err(),
            AudioError::DirectionClosed(Direction::Output)
        );
        assert!(messenger.close().is_ok());
    }

    #[test]
    fn test_worker_error_reaches_caller_and_close() {
        let mut messenger =
            Messenger::spawn(channel_buffer(2, true), SampleWriter::new(false)).unwrap();
        let failure = AudioError::Protocol(ErrorCode::DeviceUnavailable);

        assert_eq!(messenger.exchange(request(4)).unwrap_err(), failure);
        assert_eq!(
            messenger.exchange(request(4)).unwrap_err(),
            AudioError::DirectionClosed(Direction::Output)
        );
        assert_eq!(messenger.close().unwrap_err(), failure);
        assert!(messenger.close().is_ok());
    }
}
