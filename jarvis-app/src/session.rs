//! Conversation sessions that drive a `VoiceInterface`.
//!
//! A session owns the interface lifecycle: `start_session` starts it with the
//! uplink callback and `end_session` stops it. The hosted agent protocol is not
//! built here; [`WavSession`] plays a recorded agent reply instead and
//! [`ListenSession`] runs capture/VAD with no agent audio.

use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{Receiver, Sender};
use jarvis_core::{AudioChunk, VoiceInterface};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// Upper bound on waiting for queued agent audio to finish after the last chunk.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

pub trait ConversationSession: Send + Sync {
    /// Start the interface and begin the conversation.
    fn start_session(&self) -> Result<()>;

    /// End the conversation early and stop the interface. Idempotent.
    fn end_session(&self);

    /// Block until the conversation ends. Returns the conversation id when
    /// it ran to completion, `None` when it was ended early.
    fn wait_for_session_end(&self) -> Option<String>;

    /// Contextual message from the user's side (e.g. a forced interruption).
    fn send_user_message(&self, text: &str) -> Result<()>;
}

fn stop_interface(interface: &VoiceInterface) {
    if let Err(e) = interface.stop() {
        warn!("voice interface stopped with error: {e}");
    }
}

// ---------------------------------------------------------------------------
// WAV playback session
// ---------------------------------------------------------------------------

struct Stream {
    handle: JoinHandle<()>,
    done: Receiver<bool>,
}

/// Streams a 16-bit mono WAV file as agent audio in `output_frame_size`
/// chunks, paced at real time.
pub struct WavSession {
    id: String,
    interface: Arc<VoiceInterface>,
    chunks: Arc<Vec<AudioChunk>>,
    chunk_duration: Duration,
    pace: f32,
    active: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    stream: Mutex<Option<Stream>>,
    messages: Mutex<Vec<String>>,
    uplink_frames: Arc<AtomicUsize>,
}

impl WavSession {
    /// Load `path`; its format must match the interface's sample rate.
    pub fn open(path: &Path, interface: Arc<VoiceInterface>) -> Result<Self> {
        let mut reader = hound::WavReader::open(path)
            .with_context(|| format!("open WAV file {}", path.display()))?;
        let spec = reader.spec();
        if spec.channels != 1
            || spec.bits_per_sample != 16
            || spec.sample_format != hound::SampleFormat::Int
        {
            bail!(
                "{} must be 16-bit integer mono PCM (got {} ch, {} bit {:?})",
                path.display(),
                spec.channels,
                spec.bits_per_sample,
                spec.sample_format
            );
        }
        let rate = interface.config().sample_rate;
        if spec.sample_rate != rate {
            bail!(
                "{} is {} Hz but the interface runs at {} Hz",
                path.display(),
                spec.sample_rate,
                rate
            );
        }
        let samples = reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<i16>, _>>()
            .with_context(|| format!("decode {}", path.display()))?;

        let id = path
            .file_stem()
            .map(|s| format!("wav-{}", s.to_string_lossy()))
            .unwrap_or_else(|| "wav".into());
        Ok(Self::from_samples(id, &samples, interface))
    }

    pub fn from_samples(id: impl Into<String>, samples: &[i16], interface: Arc<VoiceInterface>) -> Self {
        let config = interface.config();
        let frame = config.output_frame_size.max(1);
        let chunk_duration =
            Duration::from_secs_f64(frame as f64 / f64::from(config.sample_rate.max(1)));
        let chunks = samples.chunks(frame).map(AudioChunk::from_samples).collect();
        Self {
            id: id.into(),
            interface,
            chunks: Arc::new(chunks),
            chunk_duration,
            pace: 1.0,
            active: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
            stream: Mutex::new(None),
            messages: Mutex::new(Vec::new()),
            uplink_frames: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Scale the pause between chunks; `0.0` pushes as fast as the queue allows.
    pub fn with_pace(mut self, pace: f32) -> Self {
        self.pace = pace.max(0.0);
        self
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Messages received through `send_user_message`.
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    /// Captured frames delivered to the session so far.
    pub fn uplink_frames(&self) -> usize {
        self.uplink_frames.load(Ordering::Relaxed)
    }
}

impl ConversationSession for WavSession {
    fn start_session(&self) -> Result<()> {
        let mut stream = self.stream.lock();
        if stream.is_some() || self.active.load(Ordering::SeqCst) {
            bail!("session already started");
        }
        let uplink = Arc::clone(&self.uplink_frames);
        self.interface
            .start(move |_frame| {
                uplink.fetch_add(1, Ordering::Relaxed);
            })
            .map_err(|e| anyhow!("start voice interface: {e}"))?;

        self.cancel.store(false, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);
        let (done_tx, done) = crossbeam_channel::bounded(1);
        let interface = Arc::clone(&self.interface);
        let chunks = Arc::clone(&self.chunks);
        let cancel = Arc::clone(&self.cancel);
        let pause = self.chunk_duration.mul_f32(self.pace);
        let handle = thread::Builder::new()
            .name("jarvis-wav-session".into())
            .spawn(move || stream_chunks(&interface, &chunks, &cancel, pause, done_tx));
        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                self.active.store(false, Ordering::SeqCst);
                stop_interface(&self.interface);
                return Err(e).context("spawn WAV session thread");
            }
        };
        *stream = Some(Stream { handle, done });
        info!(id = %self.id, chunks = self.chunks.len(), "WAV session started");
        Ok(())
    }

    fn end_session(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        if self.active.swap(false, Ordering::SeqCst) {
            info!(id = %self.id, "ending WAV session");
        }
        stop_interface(&self.interface);
    }

    fn wait_for_session_end(&self) -> Option<String> {
        let stream = self.stream.lock().take()?;
        // Disconnected means the thread died; treat as an early end.
        let completed = stream.done.recv().unwrap_or(false);
        if stream.handle.join().is_err() {
            warn!("WAV session thread panicked");
        }
        self.active.store(false, Ordering::SeqCst);
        debug!(uplink_frames = self.uplink_frames(), "WAV session finished");
        completed.then(|| self.id.clone())
    }

    fn send_user_message(&self, text: &str) -> Result<()> {
        if !self.active.load(Ordering::SeqCst) {
            bail!("no active session");
        }
        info!(id = %self.id, "user message: {text}");
        self.messages.lock().push(text.to_string());
        Ok(())
    }
}

/// Push every chunk, then wait for playback to drain. Sends `true` on
/// `done` when the reply played to the end.
fn stream_chunks(
    interface: &VoiceInterface,
    chunks: &[AudioChunk],
    cancel: &AtomicBool,
    pause: Duration,
    done: Sender<bool>,
) {
    for chunk in chunks {
        if cancel.load(Ordering::SeqCst) {
            let _ = done.send(false);
            return;
        }
        interface.output(chunk.clone());
        if !pause.is_zero() {
            thread::sleep(pause);
        }
    }

    let deadline = Instant::now() + DRAIN_GRACE;
    while interface.is_playing() && Instant::now() < deadline {
        if cancel.load(Ordering::SeqCst) {
            let _ = done.send(false);
            return;
        }
        thread::sleep(Duration::from_millis(20));
    }
    let _ = done.send(!cancel.load(Ordering::SeqCst));
}

// ---------------------------------------------------------------------------
// Listen-only session
// ---------------------------------------------------------------------------

/// Runs capture and VAD with no agent audio until ended.
pub struct ListenSession {
    interface: Arc<VoiceInterface>,
    end_tx: Sender<()>,
    end_rx: Receiver<()>,
    active: AtomicBool,
}

impl ListenSession {
    pub fn new(interface: Arc<VoiceInterface>) -> Self {
        let (end_tx, end_rx) = crossbeam_channel::bounded(1);
        Self {
            interface,
            end_tx,
            end_rx,
            active: AtomicBool::new(false),
        }
    }
}

impl ConversationSession for ListenSession {
    fn start_session(&self) -> Result<()> {
        self.interface
            .start(|_frame| {})
            .map_err(|e| anyhow!("start voice interface: {e}"))?;
        self.active.store(true, Ordering::SeqCst);
        info!("listening; no agent audio in this session");
        Ok(())
    }

    /// Always signals the waiter, even before `start_session`; a
    /// `ListenSession` runs at most once.
    fn end_session(&self) {
        self.active.store(false, Ordering::SeqCst);
        let _ = self.end_tx.try_send(());
        stop_interface(&self.interface);
    }

    fn wait_for_session_end(&self) -> Option<String> {
        let _ = self.end_rx.recv();
        None
    }

    fn send_user_message(&self, text: &str) -> Result<()> {
        if !self.active.load(Ordering::SeqCst) {
            bail!("no active session");
        }
        info!("user message: {text}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jarvis_core::{InterfaceConfig, StubDevice};

    fn interface(device: &StubDevice, frame: usize) -> Arc<VoiceInterface> {
        let cfg = InterfaceConfig {
            output_frame_size: frame,
            ..Default::default()
        };
        Arc::new(VoiceInterface::new(cfg, Arc::new(device.clone())).unwrap())
    }

    fn write_wav(path: &Path, rate: u32, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn wav_plays_to_completion_in_frame_sized_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reply.wav");
        let samples: Vec<i16> = (0..2_500).map(|i| (i % 100) as i16).collect();
        write_wav(&path, 16_000, 1, &samples);

        let device = StubDevice::new();
        let session = WavSession::open(&path, interface(&device, 1_000))
            .unwrap()
            .with_pace(0.0);
        assert_eq!(session.chunk_count(), 3);

        session.start_session().unwrap();
        assert_eq!(session.wait_for_session_end().as_deref(), Some("wav-reply"));
        session.end_session();

        assert_eq!(device.written_samples(), samples);
        assert_eq!(device.written()[2].sample_count(), 500);
        assert!(!device.is_started());
    }

    #[test]
    fn wav_format_must_match_interface() {
        let dir = tempfile::tempdir().unwrap();
        let device = StubDevice::new();

        let stereo = dir.path().join("stereo.wav");
        write_wav(&stereo, 16_000, 2, &[0; 64]);
        assert!(WavSession::open(&stereo, interface(&device, 1_000)).is_err());

        let wrong_rate = dir.path().join("44k.wav");
        write_wav(&wrong_rate, 44_100, 1, &[0; 64]);
        assert!(WavSession::open(&wrong_rate, interface(&device, 1_000)).is_err());

        assert!(WavSession::open(&dir.path().join("missing.wav"), interface(&device, 1_000)).is_err());
    }

    #[test]
    fn ending_early_returns_no_id_and_records_messages() {
        let device = StubDevice::new();
        let session = WavSession::from_samples("long", &vec![1i16; 16_000 * 10], interface(&device, 1_600));
        assert!(session.send_user_message("too early").is_err());

        session.start_session().unwrap();
        session
            .send_user_message("The user forced an interruption.")
            .unwrap();
        session.end_session();
        assert_eq!(session.wait_for_session_end(), None);
        assert_eq!(session.messages(), vec!["The user forced an interruption."]);
        assert!(device.written_count() < 100);
    }

    #[test]
    fn listen_session_blocks_until_ended() {
        let device = StubDevice::new();
        let session = Arc::new(ListenSession::new(interface(&device, 1_000)));
        session.start_session().unwrap();
        assert!(device.is_started());

        let waiter = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.wait_for_session_end())
        };
        thread::sleep(Duration::from_millis(50));
        session.end_session();
        assert_eq!(waiter.join().unwrap(), None);
        assert!(!device.is_started());
    }
}
