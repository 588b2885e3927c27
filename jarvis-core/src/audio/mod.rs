//! Audio device I/O.
//!
//! The interface core never talks to a sound API directly; it drives a
//! [`DuplexDevice`]:
//!
//! - [`duplex::CpalDevice`]: real microphone/speaker through cpal
//!   (`audio-cpal` feature).
//! - [`stub::StubDevice`]: in-memory device that records writes and lets the
//!   caller inject capture frames. Used by tests and `--dry-run`.
//!
//! # Threading contract
//!
//! - `on_input` is called for every captured frame, in capture order, from a
//!   device-owned thread. It must hand the frame off without blocking.
//! - `write` is only ever called from the output drain loop, never concurrently.
//! - `stop` is idempotent and safe after a failed or partial `start`.

pub mod chunk;
pub mod device;
pub mod stub;

#[cfg(feature = "audio-cpal")]
pub mod duplex;

pub use chunk::AudioChunk;
pub use stub::StubDevice;

#[cfg(feature = "audio-cpal")]
pub use duplex::CpalDevice;

use crate::error::Result;

/// Receives captured frames (`input_frame_size` samples each).
pub type InputSink = Box<dyn FnMut(AudioChunk) + Send + 'static>;

/// Stream parameters fixed for the lifetime of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    /// Mono sample rate in Hz for both directions.
    pub sample_rate: u32,
    /// Samples per captured frame delivered to `on_input`.
    pub input_frame_size: usize,
    /// Samples per playback buffer.
    pub output_frame_size: usize,
}

/// Full-duplex 16-bit mono PCM device.
pub trait DuplexDevice: Send + Sync + 'static {
    /// Open both streams and begin delivering capture frames to `on_input`.
    ///
    /// On error nothing is left running.
    fn start(&self, format: StreamFormat, on_input: InputSink) -> Result<()>;

    /// Play one chunk. May block until the device has room for it.
    fn write(&self, chunk: &AudioChunk) -> Result<()>;

    /// Close both streams.
    fn stop(&self);
}
