//! Host platform detection, used to pick the interrupt trigger.

use std::fmt;
use std::path::Path;

const DEVICE_TREE_MODEL: &str = "/proc/device-tree/model";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Mac,
    /// Raspberry Pi (Linux with a matching device-tree model).
    Pi,
    Linux,
    Unknown,
}

impl Platform {
    pub fn detect() -> Self {
        Self::detect_from(std::env::consts::OS, Path::new(DEVICE_TREE_MODEL))
    }

    /// `os` as in `std::env::consts::OS`; `model_path` is only read on Linux.
    pub fn detect_from(os: &str, model_path: &Path) -> Self {
        match os {
            "macos" => Self::Mac,
            "linux" => {
                let is_pi = std::fs::read_to_string(model_path)
                    .map(|model| model.to_ascii_lowercase().contains("raspberry pi"))
                    .unwrap_or(false);
                if is_pi {
                    Self::Pi
                } else {
                    Self::Linux
                }
            }
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mac => "mac",
            Self::Pi => "pi",
            Self::Linux => "linux",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
