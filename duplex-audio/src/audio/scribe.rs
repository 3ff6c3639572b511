//! Per-direction transfer strategies
//!
//! A [`Scribe`] declares what a request and a response look like for one
//! direction and carries out the transfer against that direction's
//! [`ChannelBuffer`]. [`SampleReader`] and [`SampleWriter`] move
//! [`SampleBuffer`]s; other strategies can be plugged into
//! [`AudioStream::open_with`].
//!
//! [`AudioStream::open_with`]: crate::audio::AudioStream::open_with

use std::marker::PhantomData;

use crate::audio::buffer::{ChannelBuffer, SampleBuffer};
use crate::audio::error::AudioResult;
use crate::audio::native::Sample;

/// Transfer strategy for one stream direction
pub trait Scribe<S: Sample>: Send + 'static {
    /// What the caller sends to the worker
    type Request: Send + 'static;
    /// What the worker sends back
    type Response: Send + 'static;

    /// Run one request against the direction's hardware buffer
    fn execute(
        &mut self,
        buffer: &mut ChannelBuffer<S>,
        request: Self::Request,
    ) -> AudioResult<Self::Response>;
}

/// A caller buffer on its way to a worker
///
/// The buffer travels with the request and comes back in the [`Transferred`]
/// response, so no samples are copied between threads.
#[derive(Debug)]
pub struct Transfer<S> {
    /// Caller buffer
    pub buffer: SampleBuffer<S>,
    /// First frame to transfer
    pub offset: usize,
    /// Frames to transfer
    pub frames: usize,
}

/// A caller buffer on its way back from a worker
#[derive(Debug)]
pub struct Transferred<S> {
    /// Caller buffer
    pub buffer: SampleBuffer<S>,
    /// Frames transferred
    pub frames: usize,
}

/// Reads hardware frames into caller buffers
#[derive(Debug, Clone, Copy)]
pub struct SampleReader<S> {
    warn_xruns: bool,
    _sample: PhantomData<fn() -> S>,
}

impl<S> SampleReader<S> {
    pub fn new(warn_xruns: bool) -> Self {
        Self {
            warn_xruns,
            _sample: PhantomData,
        }
    }

    pub fn warn_xruns(&self) -> bool {
        self.warn_xruns
    }
}

impl<S> Default for SampleReader<S> {
    fn default() -> Self {
        Self::new(true)
    }
}

impl<S: Sample> Scribe<S> for SampleReader<S> {
    type Request = Transfer<S>;
    type Response = Transferred<S>;

    fn execute(
        &mut self,
        buffer: &mut ChannelBuffer<S>,
        request: Transfer<S>,
    ) -> AudioResult<Transferred<S>> {
        let Transfer {
            buffer: mut samples,
            offset,
            frames,
        } = request;
        let frames = buffer.read_frames(&mut samples, offset, frames, self.warn_xruns)?;
        Ok(Transferred {
            buffer: samples,
            frames,
        })
    }
}

/// Writes caller buffers to hardware
#[derive(Debug, Clone, Copy)]
pub struct SampleWriter<S> {
    warn_xruns: bool,
    _sample: PhantomData<fn() -> S>,
}

impl<S> SampleWriter<S> {
    pub fn new(warn_xruns: bool) -> Self {
        Self {
            warn_xruns,
            _sample: PhantomData,
        }
    }

    pub fn warn_xruns(&self) -> bool {
        self.warn_xruns
    }
}

impl<S> Default for SampleWriter<S> {
    fn default() -> Self {
        Self::new(true)
    }
}

impl<S: Sample> Scribe<S> for SampleWriter<S> {
    type Request = Transfer<S>;
    type Response = Transferred<S>;

    fn execute(
        &mut self,
        buffer: &mut ChannelBuffer<S>,
        request: Transfer<S>,
    ) -> AudioResult<Transferred<S>> {
        let frames =
            buffer.write_frames(&request.buffer, request.offset, request.frames, self.warn_xruns)?;
        Ok(Transferred {
            buffer: request.buffer,
            frames,
        })
    }
}
