//! Voice Activity Detection (VAD).
//!
//! Two layers:
//! - [`SpeechClassifier`]: black-box `window -> speech probability` model
//!   (`SileroVad` behind the `onnx` feature, `EnergyClassifier` always).
//! - [`SpeechGate`]: hysteresis on top of the per-window probabilities that
//!   decides when the user starts and stops speaking.

pub mod energy;
pub mod gate;

#[cfg(feature = "onnx")]
pub mod silero;

pub use energy::EnergyClassifier;
pub use gate::{SpeechGate, SpeechState};

#[cfg(feature = "onnx")]
pub use silero::SileroVad;

use crate::error::{JarvisError, Result};

/// Sample rates the classifiers are trained for.
pub const SUPPORTED_SAMPLE_RATES: [u32; 2] = [8_000, 16_000];

/// Analysis window for `sample_rate`: 32 ms (512 samples @ 16 kHz, 256 @ 8 kHz).
///
/// # Errors
/// `JarvisError::UnsupportedSampleRate` for anything but 8 kHz / 16 kHz.
pub fn window_size_for(sample_rate: u32) -> Result<usize> {
    match sample_rate {
        16_000 => Ok(512),
        8_000 => Ok(256),
        rate => Err(JarvisError::UnsupportedSampleRate { rate }),
    }
}

/// Contract for speech probability models.
///
/// Implementors may be stateful (RNN hidden states etc.); `reset` must return
/// them to a clean state and is called at the start of every session.
pub trait SpeechClassifier: Send + 'static {
    /// Exact number of samples each `speech_probability` call expects.
    fn window_size(&self) -> usize;

    /// Probability in [0, 1] that `window` (normalized mono f32) contains speech.
    fn speech_probability(&mut self, window: &[f32]) -> Result<f32>;

    /// Clear any hidden state.
    fn reset(&mut self);

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

impl SpeechClassifier for Box<dyn SpeechClassifier> {
    fn window_size(&self) -> usize {
        (**self).window_size()
    }

    fn speech_probability(&mut self, window: &[f32]) -> Result<f32> {
        (**self).speech_probability(window)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_sizes_follow_sample_rate() {
        assert_eq!(window_size_for(16_000).unwrap(), 512);
        assert_eq!(window_size_for(8_000).unwrap(), 256);
    }

    #[test]
    fn other_rates_are_rejected() {
        for rate in [0, 11_025, 22_050, 44_100, 48_000] {
            assert!(matches!(
                window_size_for(rate),
                Err(JarvisError::UnsupportedSampleRate { rate: r }) if r == rate
            ));
        }
    }
}
