//! Sample buffers and chunked hardware transfer
//!
//! Callers hand the stream channel-major [`SampleBuffer`]s of any length.
//! Hardware wants interleaved chunks of a fixed size, so each direction owns
//! a [`ChannelBuffer`] with one pre-sized scratch chunk that every transfer
//! reuses.
//!
//! # Example
//!
//! ```
//! use duplex_audio::audio::buffer::{chunk_plan, SampleBuffer};
//!
//! // 300 frames in chunks of 128: two full chunks and a 44-frame tail
//! let plan: Vec<usize> = chunk_plan(300, 128).collect();
//! assert_eq!(plan, vec![128, 128, 44]);
//!
//! let buffer = SampleBuffer::<f32>::new(2, 300);
//! assert_eq!(buffer.channel(1).len(), 300);
//! ```

use std::iter;
use std::sync::Arc;

use tracing::trace;

use crate::audio::device::{DeviceInfo, Direction};
use crate::audio::error::{AudioError, AudioResult};
use crate::audio::native::{handle_status, NativeStream, Sample, StreamLock};

/// A `frames × channels` block of samples
///
/// Storage is channel-major: each channel's samples are contiguous.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer<S> {
    samples: Vec<S>,
    channels: usize,
    frames: usize,
}

impl<S> Default for SampleBuffer<S> {
    fn default() -> Self {
        Self {
            samples: Vec::new(),
            channels: 0,
            frames: 0,
        }
    }
}

impl<S: Sample> SampleBuffer<S> {
    /// Create a silent buffer
    pub fn new(channels: usize, frames: usize) -> Self {
        Self {
            samples: vec![S::silence(); channels * frames],
            channels,
            frames,
        }
    }

    /// Create a buffer from one vector per channel
    ///
    /// # Errors
    /// Returns `AudioError::RaggedChannels` if the channels differ in length.
    pub fn from_channels(channels: Vec<Vec<S>>) -> AudioResult<Self> {
        let frames = channels.first().map_or(0, Vec::len);
        if let Some((channel, samples)) = channels
            .iter()
            .enumerate()
            .find(|(_, samples)| samples.len() != frames)
        {
            return Err(AudioError::RaggedChannels {
                channel,
                len: samples.len(),
                expected: frames,
            });
        }

        Ok(Self {
            channels: channels.len(),
            frames,
            samples: channels.into_iter().flatten().collect(),
        })
    }

    /// Create a buffer from interleaved samples
    ///
    /// # Errors
    /// Returns `AudioError::RaggedChannels` if the sample count is not a
    /// multiple of `channels`.
    pub fn from_interleaved(channels: usize, interleaved: &[S]) -> AudioResult<Self> {
        if channels == 0 || interleaved.len() % channels != 0 {
            if interleaved.is_empty() {
                return Ok(Self::new(channels, 0));
            }
            return Err(AudioError::RaggedChannels {
                channel: channels.saturating_sub(1),
                len: interleaved.len(),
                expected: channels,
            });
        }

        let frames = interleaved.len() / channels;
        let mut buffer = Self::new(channels, frames);
        interleaved_to_planar(interleaved, &mut buffer, 0, frames);
        Ok(buffer)
    }

    /// Number of channels
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of frames
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Whether the buffer holds no frames
    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Samples of one channel
    pub fn channel(&self, channel: usize) -> &[S] {
        let start = channel * self.frames;
        &self.samples[start..start + self.frames]
    }

    /// Mutable samples of one channel
    pub fn channel_mut(&mut self, channel: usize) -> &mut [S] {
        let start = channel * self.frames;
        &mut self.samples[start..start + self.frames]
    }

    /// One sample
    pub fn get(&self, frame: usize, channel: usize) -> S {
        self.samples[channel * self.frames + frame]
    }

    /// Overwrite one sample
    pub fn set(&mut self, frame: usize, channel: usize, sample: S) {
        self.samples[channel * self.frames + frame] = sample;
    }

    /// Samples in interleaved order
    pub fn to_interleaved(&self) -> Vec<S> {
        let mut interleaved = vec![S::silence(); self.samples.len()];
        planar_to_interleaved(self, 0, self.frames, &mut interleaved);
        interleaved
    }

    /// One vector per channel
    pub fn into_channels(self) -> Vec<Vec<S>> {
        if self.frames == 0 {
            return vec![Vec::new(); self.channels];
        }
        self.samples
            .chunks(self.frames)
            .map(<[S]>::to_vec)
            .collect()
    }

    /// Check that `frames` frames from `offset` fit in this buffer
    pub(crate) fn check_range(&self, offset: usize, frames: usize) -> AudioResult<()> {
        match offset.checked_add(frames) {
            Some(end) if end <= self.frames => Ok(()),
            _ => Err(AudioError::OutOfBounds {
                offset,
                frames,
                len: self.frames,
            }),
        }
    }
}

/// Frame counts of the native calls needed to move `frames` frames
///
/// Full chunks of `chunk_frames` followed by one partial chunk for the
/// remainder, if any. `chunk_frames` must be positive.
pub fn chunk_plan(frames: usize, chunk_frames: usize) -> impl Iterator<Item = usize> {
    let full = frames / chunk_frames;
    let left = frames % chunk_frames;
    iter::repeat(chunk_frames)
        .take(full)
        .chain((left > 0).then_some(left))
}

/// Copy `frames` frames of `buffer` from `offset` into interleaved `scratch`
fn planar_to_interleaved<S: Sample>(
    buffer: &SampleBuffer<S>,
    offset: usize,
    frames: usize,
    scratch: &mut [S],
) {
    let channels = buffer.channels();
    for channel in 0..channels {
        let source = &buffer.channel(channel)[offset..offset + frames];
        for (frame, sample) in source.iter().enumerate() {
            scratch[frame * channels + channel] = *sample;
        }
    }
}

/// Copy `frames` interleaved frames of `scratch` into `buffer` from `offset`
fn interleaved_to_planar<S: Sample>(
    scratch: &[S],
    buffer: &mut SampleBuffer<S>,
    offset: usize,
    frames: usize,
) {
    let channels = buffer.channels();
    for channel in 0..channels {
        let target = &mut buffer.channel_mut(channel)[offset..offset + frames];
        for (frame, sample) in target.iter_mut().enumerate() {
            *sample = scratch[frame * channels + channel];
        }
    }
}

/// Hardware-side state of one stream direction
///
/// Owned by that direction's worker; the scratch chunk is never shared.
pub struct ChannelBuffer<S: Sample> {
    stream: Arc<dyn NativeStream<S>>,
    lock: StreamLock,
    device: DeviceInfo,
    direction: Direction,
    channels: usize,
    chunk_frames: usize,
    scratch: Vec<S>,
}

impl<S: Sample> ChannelBuffer<S> {
    pub(crate) fn new(
        stream: Arc<dyn NativeStream<S>>,
        lock: StreamLock,
        device: DeviceInfo,
        direction: Direction,
        channels: usize,
        chunk_frames: usize,
    ) -> Self {
        Self {
            stream,
            lock,
            device,
            direction,
            channels,
            chunk_frames,
            scratch: vec![S::silence(); channels * chunk_frames],
        }
    }

    /// Device serving this direction
    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    /// Which half of the stream this is
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Channel count
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frames per native call
    pub fn chunk_frames(&self) -> usize {
        self.chunk_frames
    }

    /// The interleaved scratch chunk
    pub fn scratch(&self) -> &[S] {
        &self.scratch
    }

    /// The interleaved scratch chunk, for custom scribes
    pub fn scratch_mut(&mut self) -> &mut [S] {
        &mut self.scratch
    }

    /// Read `frames` frames (at most one chunk) into the scratch chunk
    pub fn read_chunk(&mut self, frames: usize, warn_xruns: bool) -> AudioResult<()> {
        let samples = frames * self.channels;
        let status = {
            let _guard = self.lock.lock();
            self.stream.read(&mut self.scratch[..samples], frames)
        };
        handle_status(status, warn_xruns)
    }

    /// Write the first `frames` frames (at most one chunk) of the scratch chunk
    pub fn write_chunk(&mut self, frames: usize, warn_xruns: bool) -> AudioResult<()> {
        let samples = frames * self.channels;
        let status = {
            let _guard = self.lock.lock();
            self.stream.write(&self.scratch[..samples], frames)
        };
        handle_status(status, warn_xruns)
    }

    /// Read `frames` frames into `buffer` from `offset`, chunk by chunk
    pub fn read_frames(
        &mut self,
        buffer: &mut SampleBuffer<S>,
        offset: usize,
        frames: usize,
        warn_xruns: bool,
    ) -> AudioResult<usize> {
        let mut done = 0;
        for chunk in chunk_plan(frames, self.chunk_frames) {
            self.read_chunk(chunk, warn_xruns)?;
            interleaved_to_planar(&self.scratch, buffer, offset + done, chunk);
            done += chunk;
        }
        trace!(direction = %self.direction, frames = done, "Read frames");
        Ok(done)
    }

    /// Write `frames` frames of `buffer` from `offset`, chunk by chunk
    pub fn write_frames(
        &mut self,
        buffer: &SampleBuffer<S>,
        offset: usize,
        frames: usize,
        warn_xruns: bool,
    ) -> AudioResult<usize> {
        let mut done = 0;
        for chunk in chunk_plan(frames, self.chunk_frames) {
            planar_to_interleaved(buffer, offset + done, chunk, &mut self.scratch);
            self.write_chunk(chunk, warn_xruns)?;
            done += chunk;
        }
        trace!(direction = %self.direction, frames = done, "Wrote frames");
        Ok(done)
    }
}
