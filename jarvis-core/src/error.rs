use thiserror::Error;

/// All errors produced by jarvis-core.
#[derive(Debug, Error)]
pub enum JarvisError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unsupported sample rate {rate} Hz for voice activity detection (expected 8000 or 16000)")]
    UnsupportedSampleRate { rate: u32 },

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("no default output device found")]
    NoDefaultOutputDevice,

    #[error("output device did not accept audio within {waited_ms} ms")]
    WriteStalled { waited_ms: u64 },

    #[error("audio output failed: {0}")]
    OutputFailed(String),

    #[error("classifier error: {0}")]
    Classifier(String),

    #[error("interface is already running")]
    AlreadyRunning,

    #[error("ONNX session error: {0}")]
    OnnxSession(String),

    #[error("model file not found: {path}")]
    ModelNotFound { path: std::path::PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, JarvisError>;
