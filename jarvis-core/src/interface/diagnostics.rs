use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

/// Shared counters updated from the device callback and both loops.
#[derive(Default)]
pub struct InterfaceDiagnostics {
    pub frames_captured: AtomicUsize,
    pub frames_dropped: AtomicUsize,
    pub vad_windows: AtomicUsize,
    pub vad_errors: AtomicUsize,
    pub speaking_transitions: AtomicUsize,
    pub chunks_enqueued: AtomicUsize,
    pub chunks_dropped: AtomicUsize,
    pub chunks_played: AtomicUsize,
    pub write_errors: AtomicUsize,
    pub interrupts: AtomicUsize,
}

impl InterfaceDiagnostics {
    pub fn reset(&self) {
        self.frames_captured.store(0, Ordering::Relaxed);
        self.frames_dropped.store(0, Ordering::Relaxed);
        self.vad_windows.store(0, Ordering::Relaxed);
        self.vad_errors.store(0, Ordering::Relaxed);
        self.speaking_transitions.store(0, Ordering::Relaxed);
        self.chunks_enqueued.store(0, Ordering::Relaxed);
        self.chunks_dropped.store(0, Ordering::Relaxed);
        self.chunks_played.store(0, Ordering::Relaxed);
        self.write_errors.store(0, Ordering::Relaxed);
        self.interrupts.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            vad_windows: self.vad_windows.load(Ordering::Relaxed),
            vad_errors: self.vad_errors.load(Ordering::Relaxed),
            speaking_transitions: self.speaking_transitions.load(Ordering::Relaxed),
            chunks_enqueued: self.chunks_enqueued.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
            chunks_played: self.chunks_played.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            interrupts: self.interrupts.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub frames_captured: usize,
    pub frames_dropped: usize,
    pub vad_windows: usize,
    pub vad_errors: usize,
    pub speaking_transitions: usize,
    pub chunks_enqueued: usize,
    pub chunks_dropped: usize,
    pub chunks_played: usize,
    pub write_errors: usize,
    pub interrupts: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_zeroes_every_counter() {
        let d = InterfaceDiagnostics::default();
        d.frames_captured.fetch_add(3, Ordering::Relaxed);
        d.write_errors.fetch_add(1, Ordering::Relaxed);
        assert_eq!(d.snapshot().frames_captured, 3);
        d.reset();
        assert_eq!(d.snapshot(), DiagnosticsSnapshot::default());
    }
}
