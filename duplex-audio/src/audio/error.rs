use thiserror::Error;

use crate::audio::device::Direction;

/// Status codes reported by native stream calls
///
/// The numeric values follow the status table of the native audio I/O
/// library, so a raw status can be decoded with [`ErrorCode::from_code`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    #[error("Success")]
    NoError,
    #[error("Audio library not initialized")]
    NotInitialized,
    #[error("Unanticipated host error")]
    UnanticipatedHostError,
    #[error("Invalid number of channels")]
    InvalidChannelCount,
    #[error("Invalid sample rate")]
    InvalidSampleRate,
    #[error("Invalid device")]
    InvalidDevice,
    #[error("Invalid flag")]
    InvalidFlag,
    #[error("Sample format not supported")]
    SampleFormatNotSupported,
    #[error("Illegal combination of I/O devices")]
    BadIoDeviceCombination,
    #[error("Insufficient memory")]
    InsufficientMemory,
    #[error("Buffer too big")]
    BufferTooBig,
    #[error("Buffer too small")]
    BufferTooSmall,
    #[error("No callback routine specified")]
    NullCallback,
    #[error("Invalid stream pointer")]
    BadStreamPtr,
    #[error("Wait timed out")]
    TimedOut,
    #[error("Internal audio library error")]
    InternalError,
    #[error("Device unavailable")]
    DeviceUnavailable,
    #[error("Incompatible host API specific stream info")]
    IncompatibleHostApiSpecificStreamInfo,
    #[error("Stream is stopped")]
    StreamIsStopped,
    #[error("Stream is not stopped")]
    StreamIsNotStopped,
    #[error("Input overflowed")]
    InputOverflowed,
    #[error("Output underflowed")]
    OutputUnderflowed,
    #[error("Host API not found")]
    HostApiNotFound,
    #[error("Invalid host API")]
    InvalidHostApi,
    #[error("Can't read from a callback stream")]
    CanNotReadFromACallbackStream,
    #[error("Can't write to a callback stream")]
    CanNotWriteToACallbackStream,
    #[error("Can't read from an output only stream")]
    CanNotReadFromAnOutputOnlyStream,
    #[error("Can't write to an input only stream")]
    CanNotWriteToAnInputOnlyStream,
    #[error("Incompatible stream host API")]
    IncompatibleStreamHostApi,
    #[error("Bad buffer pointer")]
    BadBufferPtr,
}

const CODE_TABLE: [(ErrorCode, i32); 30] = [
    (ErrorCode::NoError, 0),
    (ErrorCode::NotInitialized, -10000),
    (ErrorCode::UnanticipatedHostError, -9999),
    (ErrorCode::InvalidChannelCount, -9998),
    (ErrorCode::InvalidSampleRate, -9997),
    (ErrorCode::InvalidDevice, -9996),
    (ErrorCode::InvalidFlag, -9995),
    (ErrorCode::SampleFormatNotSupported, -9994),
    (ErrorCode::BadIoDeviceCombination, -9993),
    (ErrorCode::InsufficientMemory, -9992),
    (ErrorCode::BufferTooBig, -9991),
    (ErrorCode::BufferTooSmall, -9990),
    (ErrorCode::NullCallback, -9989),
    (ErrorCode::BadStreamPtr, -9988),
    (ErrorCode::TimedOut, -9987),
    (ErrorCode::InternalError, -9986),
    (ErrorCode::DeviceUnavailable, -9985),
    (ErrorCode::IncompatibleHostApiSpecificStreamInfo, -9984),
    (ErrorCode::StreamIsStopped, -9983),
    (ErrorCode::StreamIsNotStopped, -9982),
    (ErrorCode::InputOverflowed, -9981),
    (ErrorCode::OutputUnderflowed, -9980),
    (ErrorCode::HostApiNotFound, -9979),
    (ErrorCode::InvalidHostApi, -9978),
    (ErrorCode::CanNotReadFromACallbackStream, -9977),
    (ErrorCode::CanNotWriteToACallbackStream, -9976),
    (ErrorCode::CanNotReadFromAnOutputOnlyStream, -9975),
    (ErrorCode::CanNotWriteToAnInputOnlyStream, -9974),
    (ErrorCode::IncompatibleStreamHostApi, -9973),
    (ErrorCode::BadBufferPtr, -9972),
];

impl ErrorCode {
    /// Raw numeric status
    pub fn code(self) -> i32 {
        CODE_TABLE
            .iter()
            .find(|(error, _)| *error == self)
            .map(|(_, code)| *code)
            .unwrap_or_default()
    }

    /// Decode a raw status, `None` for codes outside the table
    pub fn from_code(code: i32) -> Option<Self> {
        CODE_TABLE
            .iter()
            .find(|(_, raw)| *raw == code)
            .map(|(error, _)| *error)
    }

    /// Whether this status is an xrun: reported, but not fatal
    pub fn is_xrun(self) -> bool {
        matches!(self, ErrorCode::InputOverflowed | ErrorCode::OutputUnderflowed)
    }
}

/// Audio-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AudioError {
    /// A native stream call failed
    #[error("Audio library error {code}: {0}", code = .0.code())]
    Protocol(ErrorCode),

    /// No device matches the requested name or index
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Neither direction asked for any channel
    #[error("Input or output must have at least 1 channel")]
    NoChannels,

    /// Requested channel count exceeds what the device offers
    #[error("{requested} exceeds maximum {direction} channels ({max}) for \"{device}\"")]
    TooManyChannels {
        device: String,
        direction: Direction,
        requested: usize,
        max: usize,
    },

    /// Input and output default sample rates disagree and none was given
    #[error(
        "Default sample rate {input_rate} for input \"{input}\" disagrees with default sample rate {output_rate} for output \"{output}\". Please specify a sample rate."
    )]
    SampleRateMismatch {
        input: String,
        output: String,
        input_rate: f64,
        output_rate: f64,
    },

    /// Buffer channel count does not match the stream direction
    #[error("Buffer has {actual} channels but the {direction} side has {expected}")]
    ChannelMismatch {
        direction: Direction,
        expected: usize,
        actual: usize,
    },

    /// Chunk size of zero frames
    #[error("Frames per buffer must be at least 1")]
    ZeroFramesPerBuffer,

    /// Channels of a new buffer differ in length
    #[error("Channel {channel} has {len} samples, expected {expected}")]
    RaggedChannels {
        channel: usize,
        len: usize,
        expected: usize,
    },

    /// Requested frames do not fit in the buffer
    #[error("Cannot transfer {frames} frames at offset {offset} of a {len}-frame buffer")]
    OutOfBounds {
        offset: usize,
        frames: usize,
        len: usize,
    },

    /// The direction's request queue is closed
    #[error("The {0} side of the stream is closed")]
    DirectionClosed(Direction),

    /// The direction's worker panicked
    #[error("The {0} worker panicked")]
    WorkerPanicked(Direction),

    /// Failed to build the native stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildFailed(String),

    /// Backend-specific failure
    #[error("Audio backend error: {0}")]
    BackendError(String),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
