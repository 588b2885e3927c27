//! Silero VAD neural speech classifier.
//!
//! Wraps the official Silero VAD ONNX model published at
//! <https://github.com/snakers4/silero-vad>.
//!
//! Supports both the v3/v4 LSTM interface (separate `h`/`c` tensors) and the
//! v5 GRU interface (single `state` tensor plus a short audio context carried
//! over from the previous window).
//!
//! ## Model I/O (v4 LSTM)
//!
//! | Name     | Shape      | DType | Direction |
//! |----------|------------|-------|-----------|
//! | `input`  | `[1, W]`   | f32   | in        |
//! | `sr`     | `[1]`      | i64   | in        |
//! | `h`      | `[2,1,64]` | f32   | in/out    |
//! | `c`      | `[2,1,64]` | f32   | in/out    |
//! | `output` | `[1, 1]`   | f32   | out       |
//!
//! ## Model I/O (v5 GRU)
//!
//! | Name     | Shape       | DType | Direction |
//! |----------|-------------|-------|-----------|
//! | `input`  | `[1, C+W]`  | f32   | in        |
//! | `sr`     | `[1]`       | i64   | in        |
//! | `state`  | `[2,1,128]` | f32   | in/out    |
//! | `output` | `[1, 1]`    | f32   | out       |
//!
//! `W` is 512 samples at 16 kHz and 256 at 8 kHz; the v5 context `C` is 64 and
//! 32 samples respectively.

use std::path::PathBuf;

use ndarray::{Array1, Array2, Array3};
use ort::session::builder::SessionBuilder;
use ort::session::SessionInputValue;
use ort::value::Value;
use tracing::{info, warn};

use super::{window_size_for, SpeechClassifier};
use crate::error::{JarvisError, Result};

/// v3/v4 LSTM state size: 2 layers × 1 batch × 64 units (each of h and c).
const LSTM_SIZE: usize = 128;
/// v5 GRU state size: 2 layers × 1 batch × 128 units.
const GRU_STATE_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SileroIoMode {
    StatefulLstm,
    StatefulGru,
    Stateless,
}

pub struct SileroVad {
    session: ort::session::Session,
    io_mode: SileroIoMode,
    sample_rate: u32,
    window: usize,
    input_name: String,
    sr_name: Option<String>,
    output_name: String,
    h_name: Option<String>,
    c_name: Option<String>,
    hn_name: Option<String>,
    cn_name: Option<String>,
    state_name: Option<String>,
    state_out_name: Option<String>,
    h: Vec<f32>,
    c: Vec<f32>,
    state: Vec<f32>,
    /// Tail of the previous window (v5 only).
    context: Vec<f32>,
}

impl SileroVad {
    /// Load the model from `path` for audio at `sample_rate` (8 or 16 kHz).
    ///
    /// # Errors
    /// `UnsupportedSampleRate` before touching the file system; then
    /// `ModelNotFound` / `OnnxSession` for loading failures.
    pub fn new(path: impl AsRef<std::path::Path>, sample_rate: u32) -> Result<Self> {
        let window = window_size_for(sample_rate)?;
        let path = path.as_ref();
        if !path.exists() {
            return Err(JarvisError::ModelNotFound {
                path: path.to_path_buf(),
            });
        }

        let session = SessionBuilder::new()
            .map_err(|e| JarvisError::OnnxSession(e.to_string()))?
            .commit_from_file(path)
            .map_err(|e| JarvisError::OnnxSession(e.to_string()))?;

        let input_names: Vec<String> = session
            .inputs()
            .iter()
            .map(|outlet| outlet.name().to_string())
            .collect();
        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|outlet| outlet.name().to_string())
            .collect();

        let input_name = resolve_name(&input_names, &["input", "audio", "x"])
            .or_else(|| input_names.first().cloned())
            .ok_or_else(|| JarvisError::OnnxSession("Silero model has no inputs".into()))?;
        let sr_name = resolve_name(&input_names, &["sr", "sample_rate"]);
        let h_name = resolve_name(&input_names, &["h", "state_h"]);
        let c_name = resolve_name(&input_names, &["c", "state_c"]);
        let state_name = resolve_name(&input_names, &["state", "h_0", "hidden"]);

        let output_name = resolve_name(&output_names, &["output", "speech_prob", "prob"])
            .or_else(|| output_names.first().cloned())
            .ok_or_else(|| JarvisError::OnnxSession("Silero model has no outputs".into()))?;
        let hn_name = resolve_name(&output_names, &["hn", "state_hn", "h_out"]);
        let cn_name = resolve_name(&output_names, &["cn", "state_cn", "c_out"]);
        let state_out_name =
            resolve_name(&output_names, &["stateN", "state_out", "h_0_out", "hn_out"]);

        let io_mode =
            if h_name.is_some() && c_name.is_some() && hn_name.is_some() && cn_name.is_some() {
                SileroIoMode::StatefulLstm
            } else if state_name.is_some() {
                SileroIoMode::StatefulGru
            } else {
                SileroIoMode::Stateless
            };

        info!(
            path = %path.display(),
            sample_rate,
            window,
            io_mode = ?io_mode,
            "silero vad loaded"
        );

        Ok(Self {
            session,
            io_mode,
            sample_rate,
            window,
            input_name,
            sr_name,
            output_name,
            h_name,
            c_name,
            hn_name,
            cn_name,
            state_name,
            state_out_name,
            h: vec![0.0; LSTM_SIZE],
            c: vec![0.0; LSTM_SIZE],
            state: vec![0.0; GRU_STATE_SIZE],
            context: vec![0.0; context_size(sample_rate)],
        })
    }

    /// `$XDG_DATA_HOME/jarvis/models/silero_vad.onnx` (or the Windows equivalent).
    pub fn default_model_path() -> PathBuf {
        default_models_dir().join("silero_vad.onnx")
    }

    fn run_window(&mut self, window: &[f32]) -> Result<f32> {
        let onnx = |e: ort::Error| JarvisError::OnnxSession(e.to_string());
        let shape = |e: ndarray::ShapeError| JarvisError::OnnxSession(e.to_string());

        let input = if self.io_mode == SileroIoMode::StatefulGru {
            let mut joined = Vec::with_capacity(self.context.len() + window.len());
            joined.extend_from_slice(&self.context);
            joined.extend_from_slice(window);
            joined
        } else {
            window.to_vec()
        };
        let input_len = input.len();
        let input_val =
            Value::from_array(Array2::<f32>::from_shape_vec((1, input_len), input).map_err(shape)?)
                .map_err(onnx)?;

        let mut input_values: Vec<(String, SessionInputValue<'_>)> =
            vec![(self.input_name.clone(), input_val.into())];

        if let Some(sr_name) = &self.sr_name {
            let sr_val =
                Value::from_array(Array1::<i64>::from_elem(1, self.sample_rate as i64))
                    .map_err(onnx)?;
            input_values.push((sr_name.clone(), sr_val.into()));
        }

        match self.io_mode {
            SileroIoMode::StatefulLstm => {
                let h_val = Value::from_array(
                    Array3::<f32>::from_shape_vec((2, 1, 64), self.h.clone()).map_err(shape)?,
                )
                .map_err(onnx)?;
                let c_val = Value::from_array(
                    Array3::<f32>::from_shape_vec((2, 1, 64), self.c.clone()).map_err(shape)?,
                )
                .map_err(onnx)?;
                if let (Some(h_name), Some(c_name)) = (&self.h_name, &self.c_name) {
                    input_values.push((h_name.clone(), h_val.into()));
                    input_values.push((c_name.clone(), c_val.into()));
                }
            }
            SileroIoMode::StatefulGru => {
                let state_val = Value::from_array(
                    Array3::<f32>::from_shape_vec((2, 1, 128), self.state.clone())
                        .map_err(shape)?,
                )
                .map_err(onnx)?;
                if let Some(state_name) = &self.state_name {
                    input_values.push((state_name.clone(), state_val.into()));
                }
            }
            SileroIoMode::Stateless => {}
        }

        let outputs = self.session.run(input_values).map_err(onnx)?;

        let prob_output = outputs
            .get(self.output_name.as_str())
            .unwrap_or(&outputs[0]);
        let (_, prob_data) = prob_output.try_extract_tensor::<f32>().map_err(onnx)?;
        let prob = prob_data.first().copied().unwrap_or(0.0);

        match self.io_mode {
            SileroIoMode::StatefulLstm => {
                let hn = self.hn_name.as_deref().and_then(|n| outputs.get(n));
                let cn = self.cn_name.as_deref().and_then(|n| outputs.get(n));
                if let (Some(hn_out), Some(cn_out)) = (hn, cn) {
                    let (_, hn_data) = hn_out.try_extract_tensor::<f32>().map_err(onnx)?;
                    let (_, cn_data) = cn_out.try_extract_tensor::<f32>().map_err(onnx)?;
                    self.h = hn_data.to_vec();
                    self.c = cn_data.to_vec();
                } else {
                    warn!("silero LSTM state outputs missing; switching to stateless");
                    self.io_mode = SileroIoMode::Stateless;
                }
            }
            SileroIoMode::StatefulGru => {
                match self.state_out_name.as_deref().and_then(|n| outputs.get(n)) {
                    Some(state_out) => {
                        let (_, state_data) =
                            state_out.try_extract_tensor::<f32>().map_err(onnx)?;
                        self.state = state_data.to_vec();
                    }
                    None => {
                        warn!("silero GRU state output missing; switching to stateless");
                        self.io_mode = SileroIoMode::Stateless;
                    }
                }
                let keep = self.context.len();
                self.context
                    .copy_from_slice(&window[window.len().saturating_sub(keep)..]);
            }
            SileroIoMode::Stateless => {}
        }

        Ok(prob.clamp(0.0, 1.0))
    }
}

impl SpeechClassifier for SileroVad {
    fn window_size(&self) -> usize {
        self.window
    }

    fn speech_probability(&mut self, window: &[f32]) -> Result<f32> {
        if window.len() != self.window {
            return Err(JarvisError::Classifier(format!(
                "silero expects {} samples per window, got {}",
                self.window,
                window.len()
            )));
        }
        self.run_window(window)
    }

    fn reset(&mut self) {
        self.h.iter_mut().for_each(|v| *v = 0.0);
        self.c.iter_mut().for_each(|v| *v = 0.0);
        self.state.iter_mut().for_each(|v| *v = 0.0);
        self.context.iter_mut().for_each(|v| *v = 0.0);
    }

    fn name(&self) -> &'static str {
        "silero"
    }
}

fn context_size(sample_rate: u32) -> usize {
    if sample_rate == 16_000 {
        64
    } else {
        32
    }
}

fn resolve_name(candidates: &[String], preferred: &[&str]) -> Option<String> {
    preferred.iter().find_map(|needle| {
        candidates
            .iter()
            .find(|name| name.eq_ignore_ascii_case(needle))
            .cloned()
    })
}

/// Platform data directory for downloaded models.
pub fn default_models_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(|p| PathBuf::from(p).join("Jarvis").join("models"))
            .unwrap_or_else(|| PathBuf::from("models"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("jarvis")
            .join("models")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_rate_fails_before_loading() {
        let err = match SileroVad::new("/nonexistent/silero_vad.onnx", 44_100) {
            Err(e) => e,
            Ok(_) => panic!("expected failure"),
        };
        assert!(matches!(err, JarvisError::UnsupportedSampleRate { rate: 44_100 }));
    }

    #[test]
    fn missing_model_is_reported() {
        let err = match SileroVad::new("/nonexistent/silero_vad.onnx", 16_000) {
            Err(e) => e,
            Ok(_) => panic!("expected failure"),
        };
        assert!(matches!(err, JarvisError::ModelNotFound { .. }));
    }

    #[test]
    fn name_matching_is_case_insensitive() {
        let names = vec!["Input".to_string(), "SR".to_string()];
        assert_eq!(resolve_name(&names, &["sr"]), Some("SR".to_string()));
        assert_eq!(resolve_name(&names, &["state"]), None);
    }
}
