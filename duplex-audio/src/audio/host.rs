//! Process-wide audio library lifecycle
//!
//! The library must be initialized once before any stream opens and
//! terminated once after the last stream closes. Both calls are idempotent;
//! the application's startup and shutdown paths own them, and opening a
//! stream without initializing first fails with `NotInitialized`.

use parking_lot::{const_mutex, Mutex};
use tracing::{debug, info};

use crate::audio::error::{AudioError, AudioResult, ErrorCode};

static INITIALIZED: Mutex<bool> = const_mutex(false);

/// Initialize the audio library for this process
pub fn initialize() {
    let mut initialized = INITIALIZED.lock();
    if *initialized {
        debug!("Audio library already initialized");
        return;
    }
    *initialized = true;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Audio library initialized"
    );
}

/// Tear down the audio library for this process
pub fn terminate() {
    let mut initialized = INITIALIZED.lock();
    if !*initialized {
        debug!("Audio library not initialized, nothing to terminate");
        return;
    }
    *initialized = false;
    info!("Audio library terminated");
}

/// Whether [`initialize`] has been called without a matching [`terminate`]
pub fn is_initialized() -> bool {
    *INITIALIZED.lock()
}

/// Fail with `NotInitialized` unless the library is initialized
pub(crate) fn ensure_initialized() -> AudioResult<()> {
    if is_initialized() {
        Ok(())
    } else {
        Err(AudioError::Protocol(ErrorCode::NotInitialized))
    }
}
