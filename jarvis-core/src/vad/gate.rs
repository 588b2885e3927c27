//! Debounced speaking/silent decision.
//!
//! ## Algorithm
//!
//! Each analysis window is stamped with the stream time at which it *ends*.
//!
//! 1. Probability strictly above `threshold` → speech reading, `last_speech = t`.
//!    If currently silent and `t - last_silence >= min_speech`, flip to speaking.
//! 2. Otherwise → silence reading, `last_silence = t`.
//!    If currently speaking and `t - last_speech >= min_silence`, flip to silent.
//!
//! Because every reading of the opposite kind moves its timestamp forward,
//! `t - last_silence` is exactly the length of the current speech run (and
//! vice versa). A spike shorter than the minimum never flips the state.
//!
//! A window with no reading (classifier failure) goes through [`SpeechGate::skip`],
//! which restarts any run toward the opposite state at `t`.

use std::time::Duration;

/// Hysteresis state shared with observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpeechState {
    pub is_speaking: bool,
    /// Stream time at the end of the most recent speech window.
    pub last_speech: Duration,
    /// Stream time at the end of the most recent silence window.
    pub last_silence: Duration,
}

#[derive(Debug, Clone)]
pub struct SpeechGate {
    threshold: f32,
    min_speech: Duration,
    min_silence: Duration,
    state: SpeechState,
}

impl SpeechGate {
    pub fn new(threshold: f32, min_speech: Duration, min_silence: Duration) -> Self {
        Self {
            threshold,
            min_speech,
            min_silence,
            state: SpeechState::default(),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn state(&self) -> SpeechState {
        self.state
    }

    pub fn is_speaking(&self) -> bool {
        self.state.is_speaking
    }

    /// Back to silent with both timestamps at stream time zero.
    pub fn reset(&mut self) {
        self.state = SpeechState::default();
    }

    /// Account for a window that produced no reading, ending at `at`.
    ///
    /// A run toward the opposite state must be made of consecutive readings,
    /// so the gap restarts it; the current state never flips here.
    pub fn skip(&mut self, at: Duration) {
        if self.state.is_speaking {
            self.state.last_speech = at;
        } else {
            self.state.last_silence = at;
        }
    }

    /// Feed one window's probability, stamped with its end time.
    ///
    /// Returns `Some(new_state)` exactly when the speaking state flips.
    pub fn observe(&mut self, probability: f32, at: Duration) -> Option<bool> {
        let state = &mut self.state;
        if probability > self.threshold {
            state.last_speech = at;
            if !state.is_speaking && at.saturating_sub(state.last_silence) >= self.min_speech {
                state.is_speaking = true;
                return Some(true);
            }
        } else {
            state.last_silence = at;
            if state.is_speaking && at.saturating_sub(state.last_speech) >= self.min_silence {
                state.is_speaking = false;
                return Some(false);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: Duration = Duration::from_millis(10);

    fn gate() -> SpeechGate {
        SpeechGate::new(0.5, Duration::from_millis(250), Duration::from_millis(100))
    }

    /// Feed `probs` as consecutive 10 ms windows starting after `start`.
    fn feed(gate: &mut SpeechGate, start: Duration, probs: &[f32]) -> Vec<(Duration, bool)> {
        let mut events = Vec::new();
        let mut t = start;
        for &p in probs {
            t += STEP;
            if let Some(speaking) = gate.observe(p, t) {
                events.push((t, speaking));
            }
        }
        events
    }

    #[test]
    fn sustained_speech_fires_once_at_minimum_duration() {
        let mut g = gate();
        let events = feed(&mut g, Duration::ZERO, &[0.9; 30]);
        assert_eq!(events, vec![(Duration::from_millis(250), true)]);
        assert!(g.is_speaking());
    }

    #[test]
    fn short_spike_never_flips() {
        let mut g = gate();
        let mut probs = vec![0.1; 10];
        probs.extend([0.9; 24]); // 240 ms, just under the minimum
        probs.extend([0.1; 20]);
        assert!(feed(&mut g, Duration::ZERO, &probs).is_empty());
        assert!(!g.is_speaking());
    }

    #[test]
    fn threshold_is_strictly_greater() {
        let mut g = gate();
        assert!(feed(&mut g, Duration::ZERO, &[0.5; 40]).is_empty());
    }

    #[test]
    fn silence_debounce_restores_after_minimum() {
        let mut g = gate();
        let mut probs = vec![0.9; 30];
        probs.extend([0.1; 15]);
        let events = feed(&mut g, Duration::ZERO, &probs);
        assert_eq!(
            events,
            vec![
                (Duration::from_millis(250), true),
                (Duration::from_millis(400), false),
            ]
        );
    }

    #[test]
    fn brief_dip_while_speaking_is_ignored() {
        let mut g = gate();
        let mut probs = vec![0.9; 30];
        probs.extend([0.1; 5]); // 50 ms dip
        probs.extend([0.9; 10]);
        let events = feed(&mut g, Duration::ZERO, &probs);
        assert_eq!(events, vec![(Duration::from_millis(250), true)]);
        assert!(g.is_speaking());
    }

    #[test]
    fn interrupted_speech_run_restarts_the_clock() {
        let mut g = gate();
        let mut probs = vec![0.9; 20];
        probs.push(0.2);
        probs.extend([0.9; 25]);
        let events = feed(&mut g, Duration::ZERO, &probs);
        // Run restarts after the silent window ending at 210 ms.
        assert_eq!(events, vec![(Duration::from_millis(460), true)]);
    }

    #[test]
    fn transitions_alternate_and_never_repeat() {
        let mut g = gate();
        let mut probs = Vec::new();
        for _ in 0..4 {
            probs.extend([0.95; 40]);
            probs.extend([0.05; 40]);
        }
        let events = feed(&mut g, Duration::ZERO, &probs);
        assert_eq!(events.len(), 8);
        for pair in events.windows(2) {
            assert_ne!(pair[0].1, pair[1].1);
            assert!(pair[0].0 < pair[1].0);
        }
    }

    #[test]
    fn skipped_windows_restart_the_speech_run() {
        const WINDOW: Duration = Duration::from_millis(32);
        let mut g = gate();
        assert_eq!(g.observe(0.1, WINDOW), None);
        for i in 2..=6 {
            g.skip(WINDOW * i);
        }
        // Speech readings from 224 ms; the run counts from the last skip at 192 ms.
        let mut fired = None;
        for i in 7..=20 {
            if let Some(speaking) = g.observe(0.9, WINDOW * i) {
                fired = Some((WINDOW * i, speaking));
                break;
            }
        }
        assert_eq!(fired, Some((Duration::from_millis(448), true)));
    }

    #[test]
    fn skip_while_speaking_delays_the_return_to_silence() {
        let mut g = gate();
        feed(&mut g, Duration::ZERO, &[0.9; 30]);
        assert!(g.is_speaking());
        g.skip(Duration::from_millis(400));
        assert!(g.is_speaking());
        // Silence from 410 ms; 100 ms must elapse after the skip.
        let events = feed(&mut g, Duration::from_millis(400), &[0.1; 12]);
        assert_eq!(events, vec![(Duration::from_millis(500), false)]);
    }

    #[test]
    fn reset_returns_to_silent() {
        let mut g = gate();
        feed(&mut g, Duration::ZERO, &[0.9; 30]);
        g.reset();
        assert_eq!(g.state(), SpeechState::default());
    }
}
