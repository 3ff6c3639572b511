//! Open-time diagnostics capture
//!
//! Backends tend to be chatty while a stream is being opened, and some of
//! what they say is repeated by the native library itself. Events emitted
//! during [`capture`] go to a [`DiagnosticSink`] instead of the global
//! subscriber; the stream flushes the sink as a single debug event when it
//! closes, or right away if the open fails.
//!
//! The redirection is a thread-local default subscriber. Backends that
//! open on a thread of their own must carry the dispatcher over, as
//! [`CpalStream`](crate::audio::cpal_backend::CpalStream) does. Text a
//! native library prints straight to stderr (ALSA's configuration warnings,
//! for one) bypasses tracing and is not captured.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use tracing_subscriber::fmt::MakeWriter;

/// In-memory sink for captured diagnostic output
#[derive(Debug, Clone, Default)]
pub struct DiagnosticSink {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl DiagnosticSink {
    /// Captured text so far
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    /// Whether nothing was captured
    pub fn is_empty(&self) -> bool {
        self.buffer.lock().iter().all(u8::is_ascii_whitespace)
    }

    /// Emit everything captured as one debug event and clear the sink
    pub fn flush(&self) {
        let captured = std::mem::take(&mut *self.buffer.lock());
        let text = String::from_utf8_lossy(&captured);
        let text = text.trim_end();
        if !text.is_empty() {
            debug!(target: "duplex_audio::diagnostics", "Captured while opening stream:\n{}", text);
        }
    }
}

/// Writer handed out by [`DiagnosticSink`]
pub struct SinkWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for SinkWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buffer.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for DiagnosticSink {
    type Writer = SinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SinkWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

/// Run `f` with this thread's diagnostics redirected into a new sink
pub fn capture<T>(f: impl FnOnce() -> T) -> (T, DiagnosticSink) {
    let sink = DiagnosticSink::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(sink.clone())
        .with_ansi(false)
        .without_time()
        .with_max_level(tracing::Level::DEBUG)
        .finish();

    let result = tracing::subscriber::with_default(subscriber, f);
    (result, sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_collects_events() {
        let (value, sink) = capture(|| {
            tracing::warn!("ALSA lib pcm.c: unknown PCM cards.pcm.rear");
            42
        });

        assert_eq!(value, 42);
        assert!(!sink.is_empty());
        assert!(sink.contents().contains("unknown PCM cards.pcm.rear"));
    }

    #[test]
    fn test_flush_clears_sink() {
        let (_, sink) = capture(|| tracing::info!("opening"));
        assert!(!sink.is_empty());

        sink.flush();
        assert!(sink.is_empty());
        assert_eq!(sink.contents(), "");
    }

    #[test]
    fn test_quiet_capture_is_empty() {
        let (_, sink) = capture(|| ());
        assert!(sink.is_empty());
        sink.flush();
    }
}
