//! Persistent application settings (JSON file in app data directory).
//!
//! Precedence: settings file < `JARVIS_*` environment variables < CLI flags.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use jarvis_core::{InterfaceConfig, InterruptPolicy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub sample_rate: u32,
    /// 250 ms @ 16 kHz.
    pub input_frame_size: usize,
    /// 62.5 ms @ 16 kHz.
    pub output_frame_size: usize,
    pub interrupt_policy: String,
    pub volume_reduction_factor: f32,
    pub fade_duration_ms: u64,
    pub vad_enabled: bool,
    pub vad_threshold: f32,
    pub min_speech_duration_ms: u64,
    pub min_silence_duration_ms: u64,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub silero_model_path: Option<PathBuf>,
    /// `auto`, `keyboard`, `gpio` or `none`.
    pub trigger: String,
    pub gpio_pin: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            input_frame_size: 4_000,
            output_frame_size: 1_000,
            interrupt_policy: "clear".into(),
            volume_reduction_factor: 0.2,
            fade_duration_ms: 100,
            vad_enabled: false,
            vad_threshold: 0.5,
            min_speech_duration_ms: 250,
            min_silence_duration_ms: 100,
            input_device: None,
            output_device: None,
            silero_model_path: None,
            trigger: "auto".into(),
            gpio_pin: 17,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.interrupt_policy = normalize_policy(&self.interrupt_policy);
        self.trigger = normalize_trigger(&self.trigger);
        self.volume_reduction_factor = if self.volume_reduction_factor.is_nan() {
            0.0
        } else {
            self.volume_reduction_factor.clamp(0.0, 1.0)
        };
        self.input_device = trim_non_empty(self.input_device.take());
        self.output_device = trim_non_empty(self.output_device.take());
    }

    /// Reject values that cannot drive a device.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            bail!("sample_rate must be positive");
        }
        if self.input_frame_size == 0 {
            bail!("input_frame_size must be positive");
        }
        if self.output_frame_size == 0 {
            bail!("output_frame_size must be positive");
        }
        Ok(())
    }

    pub fn policy(&self) -> InterruptPolicy {
        match self.interrupt_policy.as_str() {
            "duck" => InterruptPolicy::Duck,
            _ => InterruptPolicy::Clear,
        }
    }

    pub fn interface_config(&self) -> InterfaceConfig {
        InterfaceConfig {
            sample_rate: self.sample_rate,
            input_frame_size: self.input_frame_size,
            output_frame_size: self.output_frame_size,
            volume_reduction_factor: self.volume_reduction_factor,
            fade_duration_ms: self.fade_duration_ms,
            interrupt_policy: self.policy(),
            vad_enabled: self.vad_enabled,
            vad_threshold: self.vad_threshold,
            min_speech_duration_ms: self.min_speech_duration_ms,
            min_silence_duration_ms: self.min_silence_duration_ms,
            silero_model_path: self.silero_model_path.clone(),
            input_device: self.input_device.clone(),
            output_device: self.output_device.clone(),
            ..Default::default()
        }
    }

    /// Apply `JARVIS_*` overrides read through `var`.
    ///
    /// Unparseable numeric values are ignored with a warning.
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("JARVIS_SAMPLE_RATE") {
            parse_into(&v, "JARVIS_SAMPLE_RATE", &mut self.sample_rate);
        }
        if let Some(v) = var("JARVIS_INPUT_FRAME_SIZE") {
            parse_into(&v, "JARVIS_INPUT_FRAME_SIZE", &mut self.input_frame_size);
        }
        if let Some(v) = var("JARVIS_OUTPUT_FRAME_SIZE") {
            parse_into(&v, "JARVIS_OUTPUT_FRAME_SIZE", &mut self.output_frame_size);
        }
        if let Some(v) = var("JARVIS_VOLUME_REDUCTION") {
            parse_into(&v, "JARVIS_VOLUME_REDUCTION", &mut self.volume_reduction_factor);
        }
        if let Some(v) = var("JARVIS_INTERRUPT_POLICY") {
            self.interrupt_policy = v;
        }
        if let Some(v) = var("JARVIS_VAD") {
            self.vad_enabled = matches!(v.trim(), "1" | "true" | "on" | "yes");
        }
        if let Some(v) = var("JARVIS_INPUT_DEVICE") {
            self.input_device = Some(v);
        }
        if let Some(v) = var("JARVIS_OUTPUT_DEVICE") {
            self.output_device = Some(v);
        }
        if let Some(v) = var("JARVIS_TRIGGER") {
            self.trigger = v;
        }
        self.normalize();
    }
}

/// Credentials for the hosted conversation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub agent_id: String,
    pub api_key: String,
}

impl Credentials {
    /// `None` unless both `AGENT_ID` and `ELEVENLABS_API_KEY` are set and non-blank.
    pub fn from_env(var: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let agent_id = trim_non_empty(var("AGENT_ID"))?;
        let api_key = trim_non_empty(var("ELEVENLABS_API_KEY"))?;
        Some(Self { agent_id, api_key })
    }
}

/// Canonical policy name for `raw`, or `None` if it names no policy.
pub fn parse_policy(raw: &str) -> Option<&'static str> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "clear" | "clearing" | "stop" => Some("clear"),
        "duck" | "ducking" | "reduce" | "volume" => Some("duck"),
        _ => None,
    }
}

/// Canonical trigger name for `raw`, or `None` if it names no trigger.
pub fn parse_trigger(raw: &str) -> Option<&'static str> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "auto" => Some("auto"),
        "keyboard" | "key" | "enter" => Some("keyboard"),
        "gpio" | "button" => Some("gpio"),
        "none" | "off" | "noop" => Some("none"),
        _ => None,
    }
}

/// Unknown values fall back to `clear`.
pub fn normalize_policy(raw: &str) -> String {
    parse_policy(raw).unwrap_or("clear").into()
}

/// Unknown values fall back to `auto`.
pub fn normalize_trigger(raw: &str) -> String {
    parse_trigger(raw).unwrap_or("auto").into()
}

fn trim_non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_into<T: std::str::FromStr>(raw: &str, name: &str, slot: &mut T) {
    match raw.trim().parse() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!("ignoring unparseable {name}={raw:?}"),
    }
}

pub fn default_settings_path() -> PathBuf {
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
        .join("settings.json")
}

/// Missing or malformed files fall back to defaults.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<AppSettings>(&raw).unwrap_or_else(|e| {
            tracing::warn!("invalid settings file {}: {e}; using defaults", path.display());
            AppSettings::default()
        }),
        Err(_) => AppSettings::default(),
    };
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
