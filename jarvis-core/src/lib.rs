//! # jarvis-core
//!
//! Interruptible duplex audio interface for a voice assistant.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → DuplexDevice::start(on_input) ──► session callback (agent uplink)
//!                         │
//!                  bounded channel
//!                         │
//!          classification loop: SpeechClassifier → SpeechGate
//!                         │
//!               InterruptCoordinator ◄── interrupt() / resume_normal_volume()
//!                  │             │
//!           OutputQueue.clear  GainController (duck / restore, linear fade)
//!                  │             │
//! output(chunk) ─► OutputQueue ─► drain loop ─► gain.apply ─► DuplexDevice::write → Speaker
//! ```
//!
//! The device callback never blocks: frames are handed to the classifier
//! with `try_send`. All heap work happens on the two loop threads.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod error;
pub mod gain;
pub mod interface;
pub mod ipc;
pub mod vad;

// Convenience re-exports for downstream crates
pub use audio::{AudioChunk, DuplexDevice, StreamFormat, StubDevice};
pub use buffering::EnqueueOutcome;
pub use error::{JarvisError, Result};
pub use interface::{
    InterfaceConfig, InterruptAction, InterruptPolicy, SpeakingObserver, VoiceInterface,
};
pub use ipc::events::{InterfaceStatus, InterfaceStatusEvent, SpeakingEvent};
pub use vad::{EnergyClassifier, SpeechClassifier};

#[cfg(feature = "audio-cpal")]
pub use audio::CpalDevice;

#[cfg(feature = "onnx")]
pub use vad::SileroVad;
