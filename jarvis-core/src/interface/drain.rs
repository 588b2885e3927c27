//! Output drain loop: queue → gain → device.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::diagnostics::InterfaceDiagnostics;
use crate::{
    audio::DuplexDevice,
    buffering::OutputQueue,
    gain::GainController,
    ipc::events::{InterfaceStatus, InterfaceStatusEvent},
};

/// How long one `drain_one` waits before re-checking the running flag.
pub const DRAIN_POLL: Duration = Duration::from_millis(150);

/// Consecutive failed writes after which playback is declared dead.
pub const MAX_CONSECUTIVE_WRITE_FAILURES: u32 = 3;

pub struct DrainContext {
    pub queue: Arc<OutputQueue>,
    pub gain: Arc<GainController>,
    pub device: Arc<dyn DuplexDevice>,
    pub running: Arc<AtomicBool>,
    /// Set when the loop gives up; surfaced by `VoiceInterface::stop`.
    pub fatal: Arc<Mutex<Option<String>>>,
    pub diagnostics: Arc<InterfaceDiagnostics>,
    pub status: Arc<Mutex<InterfaceStatus>>,
    pub status_tx: broadcast::Sender<InterfaceStatusEvent>,
}

/// Run until `ctx.running` is cleared or the device fails persistently.
pub fn run(ctx: DrainContext) {
    info!("output drain loop started");
    let mut consecutive_failures = 0u32;

    while ctx.running.load(Ordering::Acquire) {
        let Some(chunk) = ctx.queue.drain_one(DRAIN_POLL) else {
            continue;
        };
        // A chunk dequeued after stop() began is discarded.
        if !ctx.running.load(Ordering::Acquire) {
            ctx.queue.finish_one();
            break;
        }
        if !chunk.is_empty() {
            let scaled = ctx.gain.apply(chunk, Instant::now());
            match ctx.device.write(&scaled) {
                Ok(()) => {
                    consecutive_failures = 0;
                    ctx.diagnostics.chunks_played.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    consecutive_failures += 1;
                    ctx.diagnostics.write_errors.fetch_add(1, Ordering::Relaxed);
                    if consecutive_failures >= MAX_CONSECUTIVE_WRITE_FAILURES {
                        error!(
                            failures = consecutive_failures,
                            "output device failed persistently: {e}"
                        );
                        ctx.queue.finish_one();
                        fail(&ctx, e.to_string());
                        break;
                    }
                    warn!(failures = consecutive_failures, "audio write failed: {e}");
                }
            }
        }
        ctx.queue.finish_one();
    }

    debug!(pending = ctx.queue.len(), "output drain loop exiting");
    info!("output drain loop stopped");
}

/// Record the fatal error, refuse further output and publish `Error`.
fn fail(ctx: &DrainContext, detail: String) {
    *ctx.fatal.lock() = Some(detail.clone());
    ctx.queue.close();
    *ctx.status.lock() = InterfaceStatus::Error;
    let _ = ctx.status_tx.send(InterfaceStatusEvent {
        status: InterfaceStatus::Error,
        detail: Some(detail),
    });
}
