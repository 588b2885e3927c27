//! Playback gain ("ducking") with an optional linear fade.
//!
//! The fade is not timer driven: the interpolated gain is recomputed from the
//! ramp start on every [`GainController::apply`] call, so a slow drain loop
//! simply samples the ramp less often.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::audio::chunk::AudioChunk;

/// Snapshot of the controller's ramp.
///
/// `current` is the gain at `ramp_start`; the effective gain at a later
/// instant is interpolated towards `target` over `ramp_duration`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainState {
    pub current: f32,
    pub target: f32,
    pub ramp_start: Instant,
    pub ramp_duration: Duration,
}

impl GainState {
    fn unity(now: Instant) -> Self {
        Self {
            current: 1.0,
            target: 1.0,
            ramp_start: now,
            ramp_duration: Duration::ZERO,
        }
    }

    /// Interpolated gain at `now`. Instants before `ramp_start` read as the start.
    pub fn gain_at(&self, now: Instant) -> f32 {
        if self.ramp_duration.is_zero() || self.current == self.target {
            return self.target;
        }
        let elapsed = now.saturating_duration_since(self.ramp_start);
        if elapsed >= self.ramp_duration {
            return self.target;
        }
        let t = elapsed.as_secs_f32() / self.ramp_duration.as_secs_f32();
        let g = self.current + (self.target - self.current) * t;
        g.clamp(self.current.min(self.target), self.current.max(self.target))
    }
}

pub struct GainController {
    reduction_factor: f32,
    fade: Duration,
    state: Mutex<GainState>,
}

impl GainController {
    /// `reduction_factor` is clamped to [0, 1]; NaN is treated as 0.
    pub fn new(reduction_factor: f32, fade: Duration) -> Self {
        let reduction_factor = if reduction_factor.is_nan() {
            0.0
        } else {
            reduction_factor.clamp(0.0, 1.0)
        };
        Self {
            reduction_factor,
            fade,
            state: Mutex::new(GainState::unity(Instant::now())),
        }
    }

    pub fn reduction_factor(&self) -> f32 {
        self.reduction_factor
    }

    pub fn fade(&self) -> Duration {
        self.fade
    }

    /// Duck (`true`) or restore (`false`) playback, starting now.
    pub fn set_speaking(&self, speaking: bool) {
        self.set_speaking_at(speaking, Instant::now());
    }

    /// Duck or restore with an explicit ramp start.
    ///
    /// The new ramp begins at whatever gain the previous ramp had reached at
    /// `now`, so reversing mid-fade never jumps.
    pub fn set_speaking_at(&self, speaking: bool, now: Instant) {
        let target = if speaking { self.reduction_factor } else { 1.0 };
        let mut state = self.state.lock();
        let from = state.gain_at(now);
        *state = GainState {
            current: if self.fade.is_zero() { target } else { from },
            target,
            ramp_start: now,
            ramp_duration: self.fade,
        };
        debug!(from, target, fade_ms = self.fade.as_millis() as u64, "gain target set");
    }

    /// Drop any ramp and return to unity gain.
    pub fn reset(&self) {
        *self.state.lock() = GainState::unity(Instant::now());
    }

    pub fn gain_at(&self, now: Instant) -> f32 {
        self.state.lock().gain_at(now)
    }

    pub fn state(&self) -> GainState {
        *self.state.lock()
    }

    /// Scale every sample by the gain at `now`.
    ///
    /// Returns `chunk` untouched when the gain is exactly 1.0. Scaling
    /// truncates toward zero, so no sample magnitude ever grows. A trailing
    /// partial sample byte is carried over unchanged.
    pub fn apply(&self, chunk: AudioChunk, now: Instant) -> AudioChunk {
        let gain = self.gain_at(now);
        if gain == 1.0 {
            return chunk;
        }
        scale_chunk(&chunk, gain)
    }
}

impl std::fmt::Debug for GainController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GainController")
            .field("reduction_factor", &self.reduction_factor)
            .field("fade", &self.fade)
            .field("state", &self.state())
            .finish()
    }
}

fn scale_chunk(chunk: &AudioChunk, gain: f32) -> AudioChunk {
    let mut bytes = Vec::with_capacity(chunk.len());
    for sample in chunk.samples() {
        let scaled = (sample as f32 * gain) as i16;
        bytes.extend_from_slice(&scaled.to_le_bytes());
    }
    if let Some(tail) = chunk.partial_tail() {
        bytes.push(tail);
    }
    AudioChunk::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SAMPLES: [i16; 4] = [1000, 2000, -1000, -2000];

    #[test]
    fn duck_without_fade_is_exact() {
        let gain = GainController::new(0.2, Duration::ZERO);
        gain.set_speaking(true);
        let out = gain.apply(AudioChunk::from_samples(&SAMPLES), Instant::now());
        assert_eq!(out.to_samples(), vec![200, 400, -200, -400]);
    }

    #[test]
    fn unity_gain_returns_input_unchanged() {
        let gain = GainController::new(0.2, Duration::ZERO);
        let input = AudioChunk::from_bytes(vec![0x01, 0x02, 0x03]);
        let out = gain.apply(input.clone(), Instant::now());
        assert_eq!(out, input);
    }

    #[test]
    fn restore_returns_to_unity() {
        let gain = GainController::new(0.5, Duration::ZERO);
        gain.set_speaking(true);
        gain.set_speaking(false);
        let input = AudioChunk::from_samples(&SAMPLES);
        assert_eq!(gain.apply(input.clone(), Instant::now()), input);
    }

    #[test]
    fn reduction_factor_is_clamped() {
        assert_eq!(GainController::new(1.7, Duration::ZERO).reduction_factor(), 1.0);
        assert_eq!(GainController::new(-0.3, Duration::ZERO).reduction_factor(), 0.0);
        assert_eq!(GainController::new(f32::NAN, Duration::ZERO).reduction_factor(), 0.0);
    }

    #[test]
    fn scaled_magnitude_never_exceeds_original() {
        let extremes = [i16::MIN, -32767, -12345, -1, 0, 1, 7, 12345, i16::MAX];
        for factor in [0.0f32, 0.1, 0.2, 0.33, 0.5, 0.75, 0.999, 1.0] {
            let gain = GainController::new(factor, Duration::ZERO);
            gain.set_speaking(true);
            let out = gain.apply(AudioChunk::from_samples(&extremes), Instant::now());
            for (orig, scaled) in extremes.iter().zip(out.samples()) {
                let orig = (*orig as i32).abs();
                let scaled = (scaled as i32).abs();
                assert!(scaled <= orig, "factor={factor} orig={orig} scaled={scaled}");
                assert!(scaled as f32 <= orig as f32 * factor + 1e-3 || factor == 1.0);
            }
        }
    }

    #[test]
    fn partial_tail_survives_scaling() {
        let gain = GainController::new(0.5, Duration::ZERO);
        gain.set_speaking(true);
        let mut bytes = AudioChunk::from_samples(&[1000]).into_bytes();
        bytes.push(0xAB);
        let out = gain.apply(AudioChunk::from_bytes(bytes), Instant::now());
        assert_eq!(out.to_samples(), vec![500]);
        assert_eq!(out.partial_tail(), Some(0xAB));
    }

    #[test]
    fn fade_out_is_monotonic_non_increasing() {
        let gain = GainController::new(0.2, Duration::from_millis(100));
        let t0 = Instant::now();
        gain.set_speaking_at(true, t0);

        let mut last = f32::INFINITY;
        for ms in (0..=150).step_by(5) {
            let g = gain.gain_at(t0 + Duration::from_millis(ms));
            assert!(g <= last, "gain rose at {ms} ms: {g} > {last}");
            assert!((0.2..=1.0).contains(&g));
            last = g;
        }
        assert_eq!(last, 0.2);
    }

    #[test]
    fn fade_in_is_monotonic_non_decreasing() {
        let gain = GainController::new(0.2, Duration::from_millis(80));
        let t0 = Instant::now();
        gain.set_speaking_at(true, t0);
        let t1 = t0 + Duration::from_millis(200);
        gain.set_speaking_at(false, t1);

        let mut last = f32::NEG_INFINITY;
        for ms in (0..=120).step_by(4) {
            let g = gain.gain_at(t1 + Duration::from_millis(ms));
            assert!(g >= last, "gain fell at {ms} ms: {g} < {last}");
            last = g;
        }
        assert_eq!(last, 1.0);
    }

    #[test]
    fn fade_midpoint_is_linear() {
        let gain = GainController::new(0.2, Duration::from_millis(100));
        let t0 = Instant::now();
        gain.set_speaking_at(true, t0);
        assert_relative_eq!(
            gain.gain_at(t0 + Duration::from_millis(50)),
            0.6,
            epsilon = 1e-4
        );
    }

    #[test]
    fn reversal_mid_fade_starts_from_reached_gain() {
        let gain = GainController::new(0.0, Duration::from_millis(100));
        let t0 = Instant::now();
        gain.set_speaking_at(true, t0);
        let mid = t0 + Duration::from_millis(25);
        gain.set_speaking_at(false, mid);

        let state = gain.state();
        assert_relative_eq!(state.current, 0.75, epsilon = 1e-4);
        assert_eq!(state.target, 1.0);
        assert_relative_eq!(gain.gain_at(mid), 0.75, epsilon = 1e-4);
    }

    #[test]
    fn earlier_timestamp_reads_ramp_start() {
        let gain = GainController::new(0.2, Duration::from_millis(100));
        let t0 = Instant::now() + Duration::from_millis(500);
        gain.set_speaking_at(true, t0);
        assert_eq!(gain.gain_at(t0 - Duration::from_millis(100)), 1.0);
    }

    #[test]
    fn reset_restores_unity() {
        let gain = GainController::new(0.2, Duration::ZERO);
        gain.set_speaking(true);
        gain.reset();
        assert_eq!(gain.gain_at(Instant::now()), 1.0);
    }
}
