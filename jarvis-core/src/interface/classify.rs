//! Classification loop: captured frames → fixed windows → speech gate.
//!
//! Frames arrive at `input_frame_size` samples; the classifier wants exactly
//! `window_size` samples, so leftovers are carried into the next frame. Time
//! is measured on the stream clock (samples consumed / sample rate), which
//! keeps debouncing independent of how late this thread gets scheduled.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::coordinator::{InterruptCoordinator, InterruptEvent};
use super::diagnostics::InterfaceDiagnostics;
use crate::{
    audio::AudioChunk,
    ipc::events::SpeakingEvent,
    vad::{SpeechClassifier, SpeechGate},
};

/// How long one receive waits before re-checking the running flag.
pub const CLASSIFY_POLL: Duration = Duration::from_millis(100);

/// Classifier shared between sessions; reset at every `start()`.
pub type SharedClassifier = Arc<Mutex<Box<dyn SpeechClassifier>>>;

/// Called with every debounced speaking transition.
pub type SpeakingObserver = Arc<dyn Fn(bool) + Send + Sync + 'static>;

pub struct ClassifyContext {
    pub classifier: SharedClassifier,
    pub gate: Arc<Mutex<SpeechGate>>,
    pub frames: Receiver<AudioChunk>,
    pub running: Arc<AtomicBool>,
    pub sample_rate: u32,
    pub coordinator: Arc<InterruptCoordinator>,
    pub observer: Option<SpeakingObserver>,
    pub speaking_tx: broadcast::Sender<SpeakingEvent>,
    pub seq: Arc<AtomicU64>,
    pub diagnostics: Arc<InterfaceDiagnostics>,
}

/// Run until `ctx.running` is cleared or the frame sender is dropped.
pub fn run(ctx: ClassifyContext) {
    let (window, name) = {
        let classifier = ctx.classifier.lock();
        (classifier.window_size(), classifier.name())
    };
    info!(classifier = name, window, "classification loop started");

    let mut pending: Vec<f32> = Vec::with_capacity(window * 4);
    let mut consumed: u64 = 0;

    while ctx.running.load(Ordering::Acquire) {
        let chunk = match ctx.frames.recv_timeout(CLASSIFY_POLL) {
            Ok(chunk) => chunk,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        chunk.extend_normalized(&mut pending);

        let mut offset = 0;
        while pending.len() - offset >= window {
            let samples = &pending[offset..offset + window];
            offset += window;
            consumed += window as u64;
            ctx.diagnostics.vad_windows.fetch_add(1, Ordering::Relaxed);

            let at = stream_time(consumed, ctx.sample_rate);
            let probability = match ctx.classifier.lock().speech_probability(samples) {
                Ok(p) => p,
                Err(e) => {
                    ctx.diagnostics.vad_errors.fetch_add(1, Ordering::Relaxed);
                    warn!("speech classifier failed, dropping window: {e}");
                    ctx.gate.lock().skip(at);
                    continue;
                }
            };

            let transition = ctx.gate.lock().observe(probability, at);
            if let Some(is_speaking) = transition {
                notify(&ctx, is_speaking, at);
            }
        }
        pending.drain(..offset);
    }

    debug!(leftover = pending.len(), "classification loop exiting");
    info!("classification loop stopped");
}

/// Stream time after `samples` samples at `sample_rate`.
pub fn stream_time(samples: u64, sample_rate: u32) -> Duration {
    Duration::from_micros(samples.saturating_mul(1_000_000) / u64::from(sample_rate.max(1)))
}

fn notify(ctx: &ClassifyContext, is_speaking: bool, at: Duration) {
    ctx.diagnostics
        .speaking_transitions
        .fetch_add(1, Ordering::Relaxed);
    info!(
        is_speaking,
        stream_ms = at.as_millis() as u64,
        "user speaking state changed"
    );

    ctx.coordinator
        .handle(InterruptEvent::SpeakingStateChanged(is_speaking));

    if let Some(observer) = &ctx.observer {
        if catch_unwind(AssertUnwindSafe(|| observer(is_speaking))).is_err() {
            error!("speaking observer panicked");
        }
    }

    let seq = ctx.seq.fetch_add(1, Ordering::Relaxed);
    let _ = ctx.speaking_tx.send(SpeakingEvent {
        seq,
        is_speaking,
        stream_ms: at.as_millis() as u64,
    });
}
