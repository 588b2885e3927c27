//! Energy-based speech classifier.
//!
//! ## Algorithm
//!
//! 1. Compute the RMS of the window.
//! 2. Map it linearly onto [0, 1] against `reference_rms` (RMS at or above the
//!    reference reads as certain speech).
//!
//! Stateless apart from its configuration, so `reset` is a no-op. Used when no
//! neural model is available and as the fallback when Silero fails to load.

use super::{window_size_for, SpeechClassifier};
use crate::error::{JarvisError, Result};

/// Default reference level: a comfortably loud voice close to the microphone.
pub const DEFAULT_REFERENCE_RMS: f32 = 0.05;

#[derive(Debug, Clone)]
pub struct EnergyClassifier {
    window: usize,
    reference_rms: f32,
}

impl EnergyClassifier {
    /// # Errors
    /// `UnsupportedSampleRate` for rates other than 8 kHz / 16 kHz,
    /// `InvalidConfig` for a non-positive reference level.
    pub fn new(sample_rate: u32, reference_rms: f32) -> Result<Self> {
        let window = window_size_for(sample_rate)?;
        if reference_rms.is_nan() || reference_rms <= 0.0 {
            return Err(JarvisError::InvalidConfig(format!(
                "energy reference RMS must be positive, got {reference_rms}"
            )));
        }
        Ok(Self {
            window,
            reference_rms,
        })
    }

    pub fn with_default_reference(sample_rate: u32) -> Result<Self> {
        Self::new(sample_rate, DEFAULT_REFERENCE_RMS)
    }

    fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }
}

impl SpeechClassifier for EnergyClassifier {
    fn window_size(&self) -> usize {
        self.window
    }

    fn speech_probability(&mut self, window: &[f32]) -> Result<f32> {
        Ok((Self::rms(window) / self.reference_rms).clamp(0.0, 1.0))
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "energy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn silence_is_zero_probability() {
        let mut c = EnergyClassifier::with_default_reference(16_000).unwrap();
        assert_eq!(c.speech_probability(&[0.0; 512]).unwrap(), 0.0);
    }

    #[test]
    fn loud_window_saturates() {
        let mut c = EnergyClassifier::with_default_reference(16_000).unwrap();
        assert_eq!(c.speech_probability(&[0.5; 512]).unwrap(), 1.0);
    }

    #[test]
    fn probability_scales_with_rms() {
        let mut c = EnergyClassifier::new(8_000, 0.1).unwrap();
        // Square wave at ±0.05 has RMS 0.05.
        let window: Vec<f32> = (0..256)
            .map(|i| if i % 2 == 0 { 0.05 } else { -0.05 })
            .collect();
        assert_relative_eq!(c.speech_probability(&window).unwrap(), 0.5, epsilon = 1e-5);
        assert_eq!(c.window_size(), 256);
    }

    #[test]
    fn empty_window_is_silence() {
        let mut c = EnergyClassifier::with_default_reference(16_000).unwrap();
        assert_eq!(c.speech_probability(&[]).unwrap(), 0.0);
    }

    #[test]
    fn rejects_bad_configuration() {
        assert!(matches!(
            EnergyClassifier::new(44_100, 0.05),
            Err(JarvisError::UnsupportedSampleRate { rate: 44_100 })
        ));
        assert!(matches!(
            EnergyClassifier::new(16_000, 0.0),
            Err(JarvisError::InvalidConfig(_))
        ));
    }
}
