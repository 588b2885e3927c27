//! In-memory duplex device.
//!
//! Records every written chunk and lets the caller play the part of the
//! microphone through [`StubDevice::push_input`]. Failure knobs cover the
//! device error paths (start failure, transient and permanent write errors).

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use super::{AudioChunk, DuplexDevice, InputSink, StreamFormat};
use crate::error::{JarvisError, Result};

#[derive(Default)]
struct StubInner {
    sink: Mutex<Option<InputSink>>,
    written: Mutex<Vec<AudioChunk>>,
    format: Mutex<Option<StreamFormat>>,
    started: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
    failing_writes: AtomicUsize,
    write_delay: Mutex<Duration>,
    start_error: Mutex<Option<String>>,
}

/// Cheap to clone: all clones share one device.
#[derive(Clone, Default)]
pub struct StubDevice {
    inner: Arc<StubInner>,
}

impl StubDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one capture frame. Returns `false` when the device is stopped.
    pub fn push_input(&self, chunk: AudioChunk) -> bool {
        let mut sink = self.inner.sink.lock();
        match sink.as_mut() {
            Some(on_input) if self.inner.started.load(Ordering::Acquire) => {
                on_input(chunk);
                true
            }
            _ => false,
        }
    }

    /// Chunks written so far, in write order.
    pub fn written(&self) -> Vec<AudioChunk> {
        self.inner.written.lock().clone()
    }

    /// All written samples concatenated.
    pub fn written_samples(&self) -> Vec<i16> {
        self.inner
            .written
            .lock()
            .iter()
            .flat_map(|c| c.to_samples())
            .collect()
    }

    pub fn written_count(&self) -> usize {
        self.inner.written.lock().len()
    }

    /// Make the next `n` writes fail.
    pub fn fail_next_writes(&self, n: usize) {
        self.inner.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Make every write fail until `fail_next_writes(0)`.
    pub fn fail_all_writes(&self) {
        self.fail_next_writes(usize::MAX);
    }

    /// Simulate a slow device: each write sleeps for `delay`.
    pub fn set_write_delay(&self, delay: Duration) {
        *self.inner.write_delay.lock() = delay;
    }

    /// Make the next `start` fail with a stream error.
    pub fn fail_start_with(&self, message: impl Into<String>) {
        *self.inner.start_error.lock() = Some(message.into());
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    pub fn start_count(&self) -> usize {
        self.inner.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.inner.stops.load(Ordering::SeqCst)
    }

    /// Format passed to the most recent successful `start`.
    pub fn format(&self) -> Option<StreamFormat> {
        *self.inner.format.lock()
    }
}

impl DuplexDevice for StubDevice {
    fn start(&self, format: StreamFormat, on_input: InputSink) -> Result<()> {
        self.inner.starts.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.inner.start_error.lock().take() {
            return Err(JarvisError::AudioStream(message));
        }
        *self.inner.sink.lock() = Some(on_input);
        *self.inner.format.lock() = Some(format);
        self.inner.started.store(true, Ordering::Release);
        debug!(?format, "stub device started");
        Ok(())
    }

    fn write(&self, chunk: &AudioChunk) -> Result<()> {
        let delay = *self.inner.write_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let failing = self.inner.failing_writes.load(Ordering::SeqCst);
        if failing > 0 {
            if failing != usize::MAX {
                self.inner.failing_writes.fetch_sub(1, Ordering::SeqCst);
            }
            return Err(JarvisError::AudioStream("stub write failure".into()));
        }
        self.inner.written.lock().push(chunk.clone());
        Ok(())
    }

    fn stop(&self) {
        self.inner.stops.fetch_add(1, Ordering::SeqCst);
        self.inner.started.store(false, Ordering::Release);
        *self.inner.sink.lock() = None;
    }
}

impl std::fmt::Debug for StubDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubDevice")
            .field("started", &self.is_started())
            .field("written", &self.written_count())
            .finish_non_exhaustive()
    }
}
