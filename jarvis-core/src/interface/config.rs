//! Immutable per-instance settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::StreamFormat;
use crate::error::{JarvisError, Result};
use crate::vad::SUPPORTED_SAMPLE_RATES;

/// What an external interrupt (button, key, remote `interrupt()`) does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterruptPolicy {
    /// Discard all buffered agent audio. Gain is untouched.
    #[default]
    Clear,
    /// Keep playing, faded down to the reduction factor until resumed.
    Duck,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct InterfaceConfig {
    /// Mono sample rate for capture and playback (Hz). Must be 8000 or 16000
    /// when VAD is enabled. Default: 16000.
    pub sample_rate: u32,
    /// Samples per captured frame handed to the session. Default: 2048.
    pub input_frame_size: usize,
    /// Samples per playback buffer. Default: 1024.
    pub output_frame_size: usize,
    /// Playback gain while ducked, clamped to [0, 1]. Default: 0.2.
    pub volume_reduction_factor: f32,
    /// Duration of the linear gain ramp; 0 snaps. Default: 100 ms.
    pub fade_duration_ms: u64,
    pub interrupt_policy: InterruptPolicy,
    /// Run the classification loop and duck while the user speaks.
    pub vad_enabled: bool,
    /// Speech probability threshold in [0, 1]. Default: 0.5.
    pub vad_threshold: f32,
    pub min_speech_duration_ms: u64,
    pub min_silence_duration_ms: u64,
    /// Outbound chunks buffered before new ones are dropped. Default: 256.
    pub output_queue_capacity: usize,
    /// Captured frames buffered for the classifier before drops. Default: 64.
    pub input_queue_capacity: usize,
    /// RMS read as certain speech by the energy classifier. Default: 0.05.
    pub energy_reference_rms: f32,
    /// Override path for the Silero VAD ONNX model.
    pub silero_model_path: Option<PathBuf>,
    /// Preferred capture device name.
    pub input_device: Option<String>,
    /// Preferred playback device name.
    pub output_device: Option<String>,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            input_frame_size: 2_048,
            output_frame_size: 1_024,
            volume_reduction_factor: 0.2,
            fade_duration_ms: 100,
            interrupt_policy: InterruptPolicy::Clear,
            vad_enabled: false,
            vad_threshold: 0.5,
            min_speech_duration_ms: 250,
            min_silence_duration_ms: 100,
            output_queue_capacity: 256,
            input_queue_capacity: 64,
            energy_reference_rms: 0.05,
            silero_model_path: None,
            input_device: None,
            output_device: None,
        }
    }
}

impl InterfaceConfig {
    /// Reject values that would fail at runtime.
    ///
    /// The volume reduction factor is the only value clamped rather than
    /// rejected (see [`Self::reduction_factor`]).
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(invalid("sampleRate must be positive"));
        }
        if self.input_frame_size == 0 {
            return Err(invalid("inputFrameSize must be positive"));
        }
        if self.output_frame_size == 0 {
            return Err(invalid("outputFrameSize must be positive"));
        }
        if self.output_queue_capacity == 0 {
            return Err(invalid("outputQueueCapacity must be positive"));
        }
        if self.input_queue_capacity == 0 {
            return Err(invalid("inputQueueCapacity must be positive"));
        }
        if self.vad_enabled {
            if !SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate) {
                return Err(JarvisError::UnsupportedSampleRate {
                    rate: self.sample_rate,
                });
            }
            if !(0.0..=1.0).contains(&self.vad_threshold) {
                return Err(invalid(format!(
                    "vadThreshold must be within [0, 1], got {}",
                    self.vad_threshold
                )));
            }
        }
        Ok(())
    }

    /// `volume_reduction_factor` clamped to [0, 1] (NaN reads as 0).
    pub fn reduction_factor(&self) -> f32 {
        if self.volume_reduction_factor.is_nan() {
            0.0
        } else {
            self.volume_reduction_factor.clamp(0.0, 1.0)
        }
    }

    pub fn fade_duration(&self) -> Duration {
        Duration::from_millis(self.fade_duration_ms)
    }

    pub fn min_speech_duration(&self) -> Duration {
        Duration::from_millis(self.min_speech_duration_ms)
    }

    pub fn min_silence_duration(&self) -> Duration {
        Duration::from_millis(self.min_silence_duration_ms)
    }

    pub fn stream_format(&self) -> StreamFormat {
        StreamFormat {
            sample_rate: self.sample_rate,
            input_frame_size: self.input_frame_size,
            output_frame_size: self.output_frame_size,
        }
    }
}

fn invalid(message: impl Into<String>) -> JarvisError {
    JarvisError::InvalidConfig(message.into())
}
