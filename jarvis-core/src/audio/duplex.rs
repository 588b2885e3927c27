//! Full-duplex microphone/speaker through cpal.
//!
//! # Design constraints
//!
//! cpal data callbacks run on OS audio threads at elevated priority. They
//! **must not** allocate, block on a mutex or perform I/O. Both directions
//! therefore go through SPSC ring buffers whose `push_slice`/`pop_slice` are
//! lock-free and allocation-free:
//!
//! ```text
//! mic callback ──► input ring ──► stream thread (frames → on_input)
//! write() ──────► output ring ──► speaker callback
//! ```
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). Both streams are created, owned and dropped by one dedicated
//! stream thread, which also slices captured audio into frames. `start`
//! waits for that thread to report the streams open (or the failure).

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    FromSample, Sample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::{AudioChunk, DuplexDevice, InputSink, StreamFormat};
use crate::{
    buffering::{
        create_sample_ring, playback_ring_capacity, Consumer, Observer, Producer, SampleConsumer,
        SampleProducer,
    },
    error::{JarvisError, Result},
};

/// How long `start` waits for the stream thread to open both streams.
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);
/// How long `write` waits for room in the output ring before giving up.
const WRITE_STALL_TIMEOUT: Duration = Duration::from_secs(2);
/// Poll interval of the stream thread and of a blocked `write`.
const POLL_INTERVAL: Duration = Duration::from_millis(5);
/// Captured audio held for the stream thread: 2 s at 48 kHz.
const INPUT_RING_CAPACITY: usize = 96_000;

struct StreamThread {
    shutdown_tx: Sender<()>,
    handle: JoinHandle<()>,
    running: Arc<AtomicBool>,
}

/// cpal-backed [`DuplexDevice`].
pub struct CpalDevice {
    input_device: Option<String>,
    output_device: Option<String>,
    thread: Mutex<Option<StreamThread>>,
    writer: Mutex<Option<SampleProducer>>,
}

impl CpalDevice {
    /// Use the host's default input and output devices.
    pub fn new() -> Self {
        Self::with_preference(None, None)
    }

    /// Prefer devices by exact name, falling back to the defaults.
    pub fn with_preference(input_device: Option<String>, output_device: Option<String>) -> Self {
        Self {
            input_device,
            output_device,
            thread: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }
}

impl Default for CpalDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DuplexDevice for CpalDevice {
    fn start(&self, format: StreamFormat, on_input: InputSink) -> Result<()> {
        let mut thread_slot = self.thread.lock();
        if thread_slot.is_some() {
            return Err(JarvisError::AlreadyRunning);
        }

        let (out_prod, out_cons) = create_sample_ring(playback_ring_capacity(
            format.sample_rate,
            format.output_frame_size,
        ));
        let running = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);

        let input_device = self.input_device.clone();
        let output_device = self.output_device.clone();
        let thread_running = Arc::clone(&running);

        let handle = std::thread::Builder::new()
            .name("jarvis-audio-streams".into())
            .spawn(move || {
                run_stream_thread(StreamThreadContext {
                    format,
                    input_device,
                    output_device,
                    on_input,
                    out_cons,
                    running: thread_running,
                    shutdown_rx,
                    ready_tx,
                })
            })?;

        let opened = match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(result) => result,
            Err(_) => Err(JarvisError::AudioDevice(
                "timed out opening audio streams".into(),
            )),
        };

        match opened {
            Ok(()) => {
                *self.writer.lock() = Some(out_prod);
                *thread_slot = Some(StreamThread {
                    shutdown_tx,
                    handle,
                    running,
                });
                Ok(())
            }
            Err(e) => {
                running.store(false, Ordering::Release);
                let _ = shutdown_tx.try_send(());
                if handle.join().is_err() {
                    error!("audio stream thread panicked during failed start");
                }
                Err(e)
            }
        }
    }

    fn write(&self, chunk: &AudioChunk) -> Result<()> {
        let mut writer = self.writer.lock();
        let producer = writer
            .as_mut()
            .ok_or_else(|| JarvisError::AudioStream("output stream is not open".into()))?;

        let samples = chunk.to_samples();
        let deadline = Instant::now() + WRITE_STALL_TIMEOUT;
        let mut pushed = 0;
        while pushed < samples.len() {
            pushed += producer.push_slice(&samples[pushed..]);
            if pushed == samples.len() {
                break;
            }
            if Instant::now() >= deadline {
                return Err(JarvisError::WriteStalled {
                    waited_ms: WRITE_STALL_TIMEOUT.as_millis() as u64,
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }

    fn stop(&self) {
        let Some(thread) = self.thread.lock().take() else {
            return;
        };
        thread.running.store(false, Ordering::Release);
        let _ = thread.shutdown_tx.try_send(());
        if thread.handle.join().is_err() {
            error!("audio stream thread panicked");
        }
        *self.writer.lock() = None;
        info!("audio streams closed");
    }
}

struct StreamThreadContext {
    format: StreamFormat,
    input_device: Option<String>,
    output_device: Option<String>,
    on_input: InputSink,
    out_cons: SampleConsumer,
    running: Arc<AtomicBool>,
    shutdown_rx: Receiver<()>,
    ready_tx: Sender<Result<()>>,
}

fn run_stream_thread(ctx: StreamThreadContext) {
    let StreamThreadContext {
        format,
        input_device,
        output_device,
        mut on_input,
        out_cons,
        running,
        shutdown_rx,
        ready_tx,
    } = ctx;

    let (in_prod, mut in_cons) = create_sample_ring(INPUT_RING_CAPACITY);

    // Streams drop at the end of this function, on this thread.
    let streams = open_streams(
        format,
        input_device.as_deref(),
        output_device.as_deref(),
        in_prod,
        out_cons,
        &running,
    );
    let (_input, _output) = match streams {
        Ok(pair) => {
            let _ = ready_tx.send(Ok(()));
            pair
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let frame = format.input_frame_size.max(1);
    let mut scratch = vec![0i16; frame];
    loop {
        if shutdown_rx.try_recv().is_ok() || !running.load(Ordering::Acquire) {
            break;
        }
        if in_cons.occupied_len() < frame {
            std::thread::sleep(POLL_INTERVAL);
            continue;
        }
        let n = in_cons.pop_slice(&mut scratch);
        on_input(AudioChunk::from_samples(&scratch[..n]));
    }
    debug!("audio stream thread exiting");
}

fn open_streams(
    format: StreamFormat,
    input_name: Option<&str>,
    output_name: Option<&str>,
    in_prod: SampleProducer,
    out_cons: SampleConsumer,
    running: &Arc<AtomicBool>,
) -> Result<(Stream, Stream)> {
    let host = cpal::default_host();

    let input = select_device(
        input_name,
        host.input_devices().ok().map(|d| d.collect()),
        host.default_input_device(),
    )
    .ok_or(JarvisError::NoDefaultInputDevice)?;
    let output = select_device(
        output_name,
        host.output_devices().ok().map(|d| d.collect()),
        host.default_output_device(),
    )
    .ok_or(JarvisError::NoDefaultOutputDevice)?;

    let in_supported = input
        .default_input_config()
        .map_err(|e| JarvisError::AudioDevice(e.to_string()))?;
    let out_supported = output
        .default_output_config()
        .map_err(|e| JarvisError::AudioDevice(e.to_string()))?;

    // No resampling: the configured rate is requested from both devices.
    let in_config = StreamConfig {
        channels: in_supported.channels(),
        sample_rate: SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let out_config = StreamConfig {
        channels: out_supported.channels(),
        sample_rate: SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    info!(
        input = input.name().unwrap_or_default().as_str(),
        output = output.name().unwrap_or_default().as_str(),
        sample_rate = format.sample_rate,
        in_channels = in_config.channels,
        out_channels = out_config.channels,
        "opening audio streams"
    );

    let in_stream = match in_supported.sample_format() {
        SampleFormat::F32 => build_input::<f32>(&input, &in_config, in_prod, running),
        SampleFormat::I16 => build_input::<i16>(&input, &in_config, in_prod, running),
        SampleFormat::U16 => build_input::<u16>(&input, &in_config, in_prod, running),
        fmt => Err(JarvisError::AudioStream(format!(
            "unsupported input sample format: {fmt:?}"
        ))),
    }?;
    let out_stream = match out_supported.sample_format() {
        SampleFormat::F32 => build_output::<f32>(&output, &out_config, out_cons),
        SampleFormat::I16 => build_output::<i16>(&output, &out_config, out_cons),
        SampleFormat::U16 => build_output::<u16>(&output, &out_config, out_cons),
        fmt => Err(JarvisError::AudioStream(format!(
            "unsupported output sample format: {fmt:?}"
        ))),
    }?;

    in_stream
        .play()
        .map_err(|e| JarvisError::AudioStream(e.to_string()))?;
    out_stream
        .play()
        .map_err(|e| JarvisError::AudioStream(e.to_string()))?;

    Ok((in_stream, out_stream))
}

fn select_device(
    preferred: Option<&str>,
    available: Option<Vec<cpal::Device>>,
    default: Option<cpal::Device>,
) -> Option<cpal::Device> {
    if let Some(name) = preferred {
        let found = available.as_ref().and_then(|devices| {
            devices
                .iter()
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .cloned()
        });
        if found.is_some() {
            return found;
        }
        warn!("preferred audio device '{}' not found, falling back", name);
    }
    default.or_else(|| available.and_then(|d| d.into_iter().next()))
}

fn build_input<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: SampleProducer,
    running: &Arc<AtomicBool>,
) -> Result<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let running = Arc::clone(running);
    let ch = config.channels.max(1) as usize;
    let mut mono: Vec<i16> = Vec::new();
    device
        .build_input_stream(
            config,
            move |data: &[T], _info| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                let frames = data.len() / ch;
                // Grows only on the first callbacks; steady state is allocation-free.
                mono.resize(frames, 0);
                for (f, out) in mono.iter_mut().enumerate() {
                    let base = f * ch;
                    let sum: f32 = data[base..base + ch]
                        .iter()
                        .map(|s| f32::from_sample(*s))
                        .sum();
                    *out = i16::from_sample(sum / ch as f32);
                }
                let written = producer.push_slice(&mono);
                if written < mono.len() {
                    warn!("input ring full: dropped {} samples", mono.len() - written);
                }
            },
            |err| error!("audio input stream error: {err}"),
            None,
        )
        .map_err(|e| JarvisError::AudioStream(e.to_string()))
}

fn build_output<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut consumer: SampleConsumer,
) -> Result<Stream>
where
    T: SizedSample + FromSample<i16>,
{
    let ch = config.channels.max(1) as usize;
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _info| {
                // Underrun plays silence.
                for frame in data.chunks_mut(ch) {
                    let sample = consumer.try_pop().unwrap_or(0);
                    frame.fill(T::from_sample(sample));
                }
            },
            |err| error!("audio output stream error: {err}"),
            None,
        )
        .map_err(|e| JarvisError::AudioStream(e.to_string()))
}
