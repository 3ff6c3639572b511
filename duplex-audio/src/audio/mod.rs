/// Sample buffers and chunked hardware transfer
pub mod buffer;

/// Hardware backend on top of cpal
pub mod cpal_backend;

/// Audio device descriptions and lookup
pub mod device;

/// Open-time diagnostics capture
pub mod diagnostics;

/// Audio-related error types
pub mod error;

/// Process-wide library lifecycle
pub mod host;

/// In-memory loopback backend
pub mod loopback;

/// Native stream and backend interfaces
pub mod native;

/// Lock-free sample ring buffers
pub mod ring;

/// Per-direction transfer strategies
pub mod scribe;

/// Duplex audio streams
pub mod stream;

mod worker;

// Re-export commonly used types
pub use buffer::{chunk_plan, ChannelBuffer, SampleBuffer};
pub use cpal_backend::{CpalBackend, CpalStream};
pub use device::{
    find_device_by_index, find_device_by_name, Bounds, ChannelCount, DeviceInfo, DeviceSelector,
    Direction,
};
pub use diagnostics::DiagnosticSink;
pub use error::{AudioError, AudioResult, ErrorCode};
pub use host::{initialize, is_initialized, terminate};
pub use loopback::{LoopbackBackend, LoopbackStream, NativeCall};
pub use native::{
    handle_status, new_stream_lock, AudioBackend, NativeStream, OpenParameters, Sample,
    StreamLock, StreamParameters,
};
pub use scribe::{SampleReader, SampleWriter, Scribe, Transfer, Transferred};
pub use stream::{AudioStream, Endpoints, StreamSetup};
