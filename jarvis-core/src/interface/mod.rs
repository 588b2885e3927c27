//! `VoiceInterface`: the duplex audio endpoint a conversation session drives.
//!
//! ## Lifecycle
//!
//! ```text
//! VoiceInterface::new()
//!     └─► start(on_input)   → device open, loops spawned, status = Running
//!         ├─► output(chunk) → queued for the drain loop
//!         ├─► interrupt()   → clear or duck, per policy
//!         └─► stop()        → loops joined, device closed, status = Stopped
//! ```
//!
//! `start()` on a running interface returns `AlreadyRunning`; `stop()` on a
//! stopped one is a no-op. An interface can be restarted after `stop()`.
//!
//! ## Threading
//!
//! ```text
//! device thread ─► on_input(frame) ─► bounded channel ─► classification loop
//!                                                             │
//!                                                      SpeechGate transition
//!                                                             │
//!                                                  InterruptCoordinator ─► gain
//! output(chunk) ─► OutputQueue ─► drain loop ─► gain.apply ─► device.write
//! ```
//!
//! Nothing here blocks the device callback: captured frames are handed off
//! with `try_send` and dropped (and counted) when the classifier falls behind.

pub mod classify;
pub mod config;
pub mod coordinator;
pub mod diagnostics;
pub mod drain;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, TrySendError};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

pub use classify::{SharedClassifier, SpeakingObserver};
pub use config::{InterfaceConfig, InterruptPolicy};
pub use coordinator::{InterruptAction, InterruptCoordinator, InterruptEvent};
pub use diagnostics::{DiagnosticsSnapshot, InterfaceDiagnostics};

use crate::{
    audio::{AudioChunk, DuplexDevice},
    buffering::{EnqueueOutcome, OutputQueue},
    error::{JarvisError, Result},
    gain::{GainController, GainState},
    ipc::events::{InterfaceStatus, InterfaceStatusEvent, SpeakingEvent},
    vad::{EnergyClassifier, SpeechClassifier, SpeechGate, SpeechState},
};

#[cfg(feature = "onnx")]
use crate::vad::SileroVad;

/// Broadcast channel capacity: 256 events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

/// Upper bound on how long `stop()` waits for each loop.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// A background loop plus the channel it signals on exit.
struct Worker {
    name: &'static str,
    handle: JoinHandle<()>,
    done: crossbeam_channel::Receiver<()>,
}

impl Worker {
    fn spawn(name: &'static str, body: impl FnOnce() + Send + 'static) -> Result<Self> {
        let (done_tx, done) = crossbeam_channel::bounded(1);
        let handle = std::thread::Builder::new()
            .name(format!("jarvis-{name}"))
            .spawn(move || {
                body();
                let _ = done_tx.send(());
            })?;
        Ok(Self { name, handle, done })
    }

    /// Wait up to `timeout` for the loop to finish, then join it.
    ///
    /// A loop stuck past the timeout is detached; it exits on its own once
    /// its blocking call returns because the running flag is already clear.
    fn join(self, timeout: Duration) {
        match self.done.recv_timeout(timeout) {
            // Disconnected means the thread ended without signalling (panic).
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.handle.join().is_err() {
                    error!(worker = self.name, "worker thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    worker = self.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "worker did not exit in time; detaching"
                );
            }
        }
    }
}

#[derive(Default)]
struct Session {
    drain: Option<Worker>,
    classify: Option<Worker>,
}

/// The top-level interface handle.
///
/// `VoiceInterface` is `Send + Sync`; all fields use interior mutability.
/// Wrap in `Arc<VoiceInterface>` to share it between the session that pushes
/// agent audio and the trigger that interrupts it.
pub struct VoiceInterface {
    config: InterfaceConfig,
    device: Arc<dyn DuplexDevice>,
    queue: Arc<OutputQueue>,
    gain: Arc<GainController>,
    coordinator: Arc<InterruptCoordinator>,
    gate: Arc<Mutex<SpeechGate>>,
    /// `None` when VAD is disabled.
    classifier: Option<SharedClassifier>,
    observer: Option<SpeakingObserver>,
    /// `true` while the loops should keep going.
    running: Arc<AtomicBool>,
    /// Set by `output`, cleared by clearing interrupts and `stop`.
    playing: Arc<AtomicBool>,
    /// Serializes `start`/`stop`; `Some` while a session is live.
    session: Mutex<Option<Session>>,
    /// Drain-loop failure reported by the next `stop()`.
    fatal: Arc<Mutex<Option<String>>>,
    status: Arc<Mutex<InterfaceStatus>>,
    status_tx: broadcast::Sender<InterfaceStatusEvent>,
    speaking_tx: broadcast::Sender<SpeakingEvent>,
    seq: Arc<AtomicU64>,
    diagnostics: Arc<InterfaceDiagnostics>,
}

impl VoiceInterface {
    /// Create an interface over `device`. When VAD is enabled the classifier
    /// is picked from the build: Silero (with the `onnx` feature and a loadable
    /// model), otherwise the energy classifier.
    ///
    /// # Errors
    /// `InvalidConfig` / `UnsupportedSampleRate` when `config` fails validation.
    pub fn new(config: InterfaceConfig, device: Arc<dyn DuplexDevice>) -> Result<Self> {
        config.validate()?;
        let classifier = if config.vad_enabled {
            Some(default_classifier(&config)?)
        } else {
            None
        };
        Ok(Self::build(config, device, classifier))
    }

    /// Create an interface with an explicit speech classifier. VAD is enabled
    /// regardless of `config.vad_enabled`.
    ///
    /// # Errors
    /// As [`VoiceInterface::new`], plus `InvalidConfig` when the classifier
    /// reports an empty window.
    pub fn with_classifier(
        mut config: InterfaceConfig,
        device: Arc<dyn DuplexDevice>,
        classifier: Box<dyn SpeechClassifier>,
    ) -> Result<Self> {
        config.vad_enabled = true;
        config.validate()?;
        if classifier.window_size() == 0 {
            return Err(JarvisError::InvalidConfig(format!(
                "classifier {} reports an empty window",
                classifier.name()
            )));
        }
        Ok(Self::build(config, device, Some(Arc::new(Mutex::new(classifier)))))
    }

    fn build(
        config: InterfaceConfig,
        device: Arc<dyn DuplexDevice>,
        classifier: Option<SharedClassifier>,
    ) -> Self {
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (speaking_tx, _) = broadcast::channel(BROADCAST_CAP);
        let queue = Arc::new(OutputQueue::new(config.output_queue_capacity));
        let gain = Arc::new(GainController::new(
            config.reduction_factor(),
            config.fade_duration(),
        ));
        let playing = Arc::new(AtomicBool::new(false));
        let coordinator = Arc::new(InterruptCoordinator::new(
            config.interrupt_policy,
            Arc::clone(&queue),
            Arc::clone(&gain),
            Arc::clone(&playing),
        ));
        let gate = Arc::new(Mutex::new(SpeechGate::new(
            config.vad_threshold,
            config.min_speech_duration(),
            config.min_silence_duration(),
        )));

        Self {
            config,
            device,
            queue,
            gain,
            coordinator,
            gate,
            classifier,
            observer: None,
            running: Arc::new(AtomicBool::new(false)),
            playing,
            session: Mutex::new(None),
            fatal: Arc::new(Mutex::new(None)),
            status: Arc::new(Mutex::new(InterfaceStatus::Idle)),
            status_tx,
            speaking_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(InterfaceDiagnostics::default()),
        }
    }

    /// Register a callback for debounced speaking transitions. It runs on the
    /// classification thread after ducking has been applied.
    pub fn with_speaking_observer(mut self, observer: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Open the device and start both loops. `on_input` receives every
    /// captured frame on the device thread and must not block.
    ///
    /// Blocks until the device is confirmed open (or fails).
    ///
    /// # Errors
    /// - `JarvisError::AlreadyRunning` if already started.
    /// - Device errors from `DuplexDevice::start`; nothing is left running.
    pub fn start(&self, mut on_input: impl FnMut(&AudioChunk) + Send + 'static) -> Result<()> {
        let mut session = self.session.lock();
        if session.is_some() {
            return Err(JarvisError::AlreadyRunning);
        }

        // ── Fresh per-session state ──────────────────────────────────────────
        self.diagnostics.reset();
        self.gain.reset();
        self.gate.lock().reset();
        if let Some(classifier) = &self.classifier {
            classifier.lock().reset();
        }
        *self.fatal.lock() = None;
        self.playing.store(false, Ordering::Release);
        self.queue.open();
        self.running.store(true, Ordering::SeqCst);

        let frames = self
            .classifier
            .as_ref()
            .map(|_| crossbeam_channel::bounded::<AudioChunk>(self.config.input_queue_capacity));
        let frame_tx = frames.as_ref().map(|(tx, _)| tx.clone());

        let diagnostics = Arc::clone(&self.diagnostics);
        let sink = Box::new(move |chunk: AudioChunk| {
            diagnostics.frames_captured.fetch_add(1, Ordering::Relaxed);
            on_input(&chunk);
            if let Some(tx) = &frame_tx {
                match tx.try_send(chunk) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        diagnostics.frames_dropped.fetch_add(1, Ordering::Relaxed);
                        debug!("classifier behind; dropped captured frame");
                    }
                    Err(TrySendError::Disconnected(_)) => {}
                }
            }
        });

        // ── Open device ──────────────────────────────────────────────────────
        if let Err(e) = self.device.start(self.config.stream_format(), sink) {
            self.rollback(Session::default());
            self.set_status(InterfaceStatus::Error, Some(e.to_string()));
            error!("failed to start audio device: {e}");
            return Err(e);
        }

        // ── Spawn loops ──────────────────────────────────────────────────────
        let mut live = Session::default();
        match self.spawn_drain() {
            Ok(worker) => live.drain = Some(worker),
            Err(e) => return Err(self.abort_start(live, e)),
        }
        if let (Some(classifier), Some((_, rx))) = (&self.classifier, frames) {
            match self.spawn_classify(Arc::clone(classifier), rx) {
                Ok(worker) => live.classify = Some(worker),
                Err(e) => return Err(self.abort_start(live, e)),
            }
        }

        *session = Some(live);
        self.set_status(InterfaceStatus::Running, None);
        info!(
            sample_rate = self.config.sample_rate,
            vad = self.classifier.is_some(),
            policy = ?self.config.interrupt_policy,
            "voice interface started"
        );
        Ok(())
    }

    fn spawn_drain(&self) -> Result<Worker> {
        let ctx = drain::DrainContext {
            queue: Arc::clone(&self.queue),
            gain: Arc::clone(&self.gain),
            device: Arc::clone(&self.device),
            running: Arc::clone(&self.running),
            fatal: Arc::clone(&self.fatal),
            diagnostics: Arc::clone(&self.diagnostics),
            status: Arc::clone(&self.status),
            status_tx: self.status_tx.clone(),
        };
        Worker::spawn("drain", move || drain::run(ctx))
    }

    fn spawn_classify(
        &self,
        classifier: SharedClassifier,
        frames: crossbeam_channel::Receiver<AudioChunk>,
    ) -> Result<Worker> {
        let ctx = classify::ClassifyContext {
            classifier,
            gate: Arc::clone(&self.gate),
            frames,
            running: Arc::clone(&self.running),
            sample_rate: self.config.sample_rate,
            coordinator: Arc::clone(&self.coordinator),
            observer: self.observer.clone(),
            speaking_tx: self.speaking_tx.clone(),
            seq: Arc::clone(&self.seq),
            diagnostics: Arc::clone(&self.diagnostics),
        };
        Worker::spawn("classify", move || classify::run(ctx))
    }

    /// Undo a start that opened the device but could not spawn its loops.
    fn abort_start(&self, live: Session, e: JarvisError) -> JarvisError {
        self.device.stop();
        self.rollback(live);
        self.set_status(InterfaceStatus::Error, Some(e.to_string()));
        error!("failed to start interface loops: {e}");
        e
    }

    fn rollback(&self, live: Session) {
        self.running.store(false, Ordering::SeqCst);
        self.queue.close();
        self.playing.store(false, Ordering::Release);
        for worker in [live.drain, live.classify].into_iter().flatten() {
            worker.join(JOIN_TIMEOUT);
        }
    }

    /// Stop both loops and close the device. A no-op when not running.
    ///
    /// Buffered agent audio is discarded. Blocks for at most
    /// [`JOIN_TIMEOUT`] per loop.
    ///
    /// # Errors
    /// `JarvisError::OutputFailed` if the drain loop gave up on the device
    /// during this session. The interface is stopped either way.
    pub fn stop(&self) -> Result<()> {
        let mut session = self.session.lock();
        let Some(live) = session.take() else {
            return Ok(());
        };
        info!("voice interface stop requested");

        self.rollback(live);
        self.device.stop();

        match self.fatal.lock().take() {
            Some(detail) => {
                self.set_status(InterfaceStatus::Error, Some(detail.clone()));
                Err(JarvisError::OutputFailed(detail))
            }
            None => {
                self.set_status(InterfaceStatus::Stopped, None);
                info!("voice interface stopped");
                Ok(())
            }
        }
    }

    /// Queue one chunk of agent audio (16-bit LE mono PCM) for playback.
    ///
    /// Never blocks. Returns `Dropped` when the queue is full and `Closed`
    /// when the interface is not running.
    pub fn output(&self, chunk: AudioChunk) -> EnqueueOutcome {
        let outcome = self.queue.enqueue(chunk);
        match outcome {
            EnqueueOutcome::Queued => {
                self.playing.store(true, Ordering::Release);
                self.diagnostics
                    .chunks_enqueued
                    .fetch_add(1, Ordering::Relaxed);
            }
            EnqueueOutcome::Dropped => {
                self.diagnostics.chunks_dropped.fetch_add(1, Ordering::Relaxed);
                debug!("output queue full; dropped agent audio chunk");
            }
            EnqueueOutcome::Closed => {
                debug!("output on stopped interface ignored");
            }
        }
        outcome
    }

    /// External interrupt (the session's `interrupt()` callback, a button or a
    /// key): clears or ducks according to the configured policy.
    pub fn interrupt(&self) -> InterruptAction {
        self.diagnostics.interrupts.fetch_add(1, Ordering::Relaxed);
        self.coordinator.handle(InterruptEvent::External)
    }

    /// Same as [`interrupt`](Self::interrupt); named for callers that
    /// interrupt on the user's behalf rather than the agent's.
    pub fn force_interrupt(&self) -> InterruptAction {
        info!("forced interrupt");
        self.interrupt()
    }

    /// End a ducking interrupt: fade back to full volume.
    pub fn resume_normal_volume(&self) -> InterruptAction {
        self.coordinator.handle(InterruptEvent::Resume)
    }

    /// Discard all queued agent audio regardless of policy. Returns the
    /// number of discarded chunks.
    pub fn clear_audio_buffer(&self) -> usize {
        self.playing.store(false, Ordering::Release);
        let discarded = self.queue.clear();
        debug!(discarded, "audio buffer cleared");
        discarded
    }

    /// Whether agent audio is queued or being written. `false` right after a
    /// clearing interrupt, even while the in-flight chunk finishes.
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire) && self.queue.has_pending()
    }

    /// Debounced VAD state. Always `false` when VAD is disabled.
    pub fn is_user_speaking(&self) -> bool {
        self.gate.lock().is_speaking()
    }

    pub fn speech_state(&self) -> SpeechState {
        self.gate.lock().state()
    }

    pub fn gain_state(&self) -> GainState {
        self.gain.state()
    }

    pub fn queued_chunks(&self) -> usize {
        self.queue.len()
    }

    pub fn is_running(&self) -> bool {
        self.session.lock().is_some()
    }

    pub fn vad_enabled(&self) -> bool {
        self.classifier.is_some()
    }

    pub fn config(&self) -> &InterfaceConfig {
        &self.config
    }

    /// Current interface status (snapshot).
    pub fn status(&self) -> InterfaceStatus {
        *self.status.lock()
    }

    /// Subscribe to debounced speaking transitions.
    pub fn subscribe_speaking(&self) -> broadcast::Receiver<SpeakingEvent> {
        self.speaking_tx.subscribe()
    }

    /// Subscribe to live status change events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<InterfaceStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Snapshot of interface counters for observability.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn set_status(&self, new_status: InterfaceStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(InterfaceStatusEvent {
            status: new_status,
            detail,
        });
    }
}

impl Drop for VoiceInterface {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("voice interface stopped with error on drop: {e}");
        }
    }
}

impl std::fmt::Debug for VoiceInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceInterface")
            .field("status", &self.status())
            .field("policy", &self.config.interrupt_policy)
            .field("vad", &self.classifier.is_some())
            .field("queued", &self.queue.len())
            .finish_non_exhaustive()
    }
}

/// Pick the classifier for a VAD-enabled config.
#[cfg(feature = "onnx")]
fn default_classifier(config: &InterfaceConfig) -> Result<SharedClassifier> {
    let path = config
        .silero_model_path
        .clone()
        .unwrap_or_else(SileroVad::default_model_path);
    let classifier: Box<dyn SpeechClassifier> = match SileroVad::new(&path, config.sample_rate) {
        Ok(v) => {
            info!("using SileroVad from {:?}", path);
            Box::new(v)
        }
        Err(e) => {
            warn!("SileroVad load failed ({e}), falling back to energy classifier");
            Box::new(EnergyClassifier::new(
                config.sample_rate,
                config.energy_reference_rms,
            )?)
        }
    };
    Ok(Arc::new(Mutex::new(classifier)))
}

#[cfg(not(feature = "onnx"))]
fn default_classifier(config: &InterfaceConfig) -> Result<SharedClassifier> {
    let classifier: Box<dyn SpeechClassifier> = Box::new(EnergyClassifier::new(
        config.sample_rate,
        config.energy_reference_rms,
    )?);
    Ok(Arc::new(Mutex::new(classifier)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::StubDevice;
    use std::time::Instant;

    fn config(policy: InterruptPolicy) -> InterfaceConfig {
        InterfaceConfig {
            interrupt_policy: policy,
            fade_duration_ms: 0,
            ..Default::default()
        }
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn new_rejects_invalid_config() {
        let cfg = InterfaceConfig {
            input_frame_size: 0,
            ..Default::default()
        };
        assert!(VoiceInterface::new(cfg, Arc::new(StubDevice::new())).is_err());
    }

    #[test]
    fn vad_enabled_config_gets_a_classifier() {
        let cfg = InterfaceConfig {
            vad_enabled: true,
            ..Default::default()
        };
        let vi = VoiceInterface::new(cfg, Arc::new(StubDevice::new())).unwrap();
        assert!(vi.vad_enabled());
        assert!(!vi.is_user_speaking());
    }

    #[test]
    fn start_twice_is_rejected_and_stop_is_idempotent() {
        let device = StubDevice::new();
        let vi = VoiceInterface::new(config(InterruptPolicy::Clear), Arc::new(device.clone())).unwrap();
        assert_eq!(vi.status(), InterfaceStatus::Idle);

        vi.start(|_| {}).unwrap();
        assert_eq!(vi.status(), InterfaceStatus::Running);
        assert!(matches!(vi.start(|_| {}), Err(JarvisError::AlreadyRunning)));

        vi.stop().unwrap();
        vi.stop().unwrap();
        assert_eq!(vi.status(), InterfaceStatus::Stopped);
        assert_eq!(device.stop_count(), 1);
        assert!(!device.is_started());
    }

    #[test]
    fn output_is_played_in_order() {
        let device = StubDevice::new();
        let vi = VoiceInterface::new(config(InterruptPolicy::Clear), Arc::new(device.clone())).unwrap();
        assert_eq!(vi.output(AudioChunk::from_samples(&[1])), EnqueueOutcome::Closed);

        vi.start(|_| {}).unwrap();
        for i in 0..5 {
            assert_eq!(vi.output(AudioChunk::from_samples(&[i])), EnqueueOutcome::Queued);
        }
        assert!(wait_for(|| device.written_count() == 5));
        assert_eq!(device.written_samples(), vec![0, 1, 2, 3, 4]);
        assert!(wait_for(|| !vi.is_playing()));
        vi.stop().unwrap();
    }

    #[test]
    fn input_frames_reach_the_callback() {
        let device = StubDevice::new();
        let vi = VoiceInterface::new(config(InterruptPolicy::Clear), Arc::new(device.clone())).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        vi.start(move |chunk| sink.lock().push(chunk.to_samples())).unwrap();

        device.push_input(AudioChunk::from_samples(&[7, 8]));
        device.push_input(AudioChunk::from_samples(&[9]));
        assert_eq!(*seen.lock(), vec![vec![7, 8], vec![9]]);
        assert_eq!(vi.diagnostics_snapshot().frames_captured, 2);
        vi.stop().unwrap();
    }

    #[test]
    fn duck_interrupt_scales_playback_until_resumed() {
        let device = StubDevice::new();
        let vi = VoiceInterface::new(config(InterruptPolicy::Duck), Arc::new(device.clone())).unwrap();
        vi.start(|_| {}).unwrap();

        assert_eq!(vi.interrupt(), InterruptAction::Ducked);
        vi.output(AudioChunk::from_samples(&[1000, 2000, -1000, -2000]));
        assert!(wait_for(|| device.written_count() == 1));
        assert_eq!(device.written_samples(), vec![200, 400, -200, -400]);

        assert_eq!(vi.resume_normal_volume(), InterruptAction::Restored);
        vi.output(AudioChunk::from_samples(&[1000]));
        assert!(wait_for(|| device.written_count() == 2));
        assert_eq!(device.written()[1].to_samples(), vec![1000]);
        vi.stop().unwrap();
    }

    #[test]
    fn clear_audio_buffer_discards_pending_chunks() {
        let device = StubDevice::new();
        device.set_write_delay(Duration::from_millis(50));
        let vi = VoiceInterface::new(config(InterruptPolicy::Clear), Arc::new(device.clone())).unwrap();
        vi.start(|_| {}).unwrap();
        for i in 0..10 {
            vi.output(AudioChunk::from_samples(&[i]));
        }
        assert!(vi.is_playing());
        let discarded = vi.clear_audio_buffer();
        assert!(discarded >= 8);
        assert!(!vi.is_playing());
        vi.stop().unwrap();
        assert!(device.written_count() <= 2);
    }

    #[test]
    fn failed_device_start_leaves_nothing_running() {
        let device = StubDevice::new();
        device.fail_start_with("device busy");
        let vi = VoiceInterface::new(config(InterruptPolicy::Clear), Arc::new(device.clone())).unwrap();
        let mut status_rx = vi.subscribe_status();

        assert!(matches!(vi.start(|_| {}), Err(JarvisError::AudioStream(_))));
        assert!(!vi.is_running());
        assert_eq!(vi.status(), InterfaceStatus::Error);
        assert_eq!(status_rx.try_recv().unwrap().status, InterfaceStatus::Error);
        assert_eq!(vi.output(AudioChunk::from_samples(&[1])), EnqueueOutcome::Closed);

        // The failure is one-shot; a retry succeeds.
        vi.start(|_| {}).unwrap();
        assert!(vi.is_running());
        vi.stop().unwrap();
    }
}
