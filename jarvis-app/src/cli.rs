//! Command-line interface. Flags override the settings file and `JARVIS_*` env.

use std::path::PathBuf;

use clap::Parser;

use crate::settings::{parse_policy, parse_trigger, AppSettings};

/// Interruptible voice assistant
#[derive(Parser, Debug, Default, Clone, PartialEq)]
#[command(name = "jarvis", version, about = "Interruptible voice assistant")]
pub struct CliArgs {
    /// Settings JSON (default: $XDG_DATA_HOME/jarvis/settings.json)
    #[arg(long, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// Play a 16-bit mono WAV file as the agent's reply
    #[arg(long, value_name = "FILE")]
    pub wav: Option<PathBuf>,

    /// Enable local voice activity detection
    #[arg(long)]
    pub vad: bool,

    /// Interrupt policy (clear, duck)
    #[arg(long, value_name = "POLICY", value_parser = policy_arg)]
    pub policy: Option<String>,

    /// Interrupt trigger (auto, keyboard, gpio, none)
    #[arg(long, value_name = "TRIGGER", value_parser = trigger_arg, conflicts_with = "no_trigger")]
    pub trigger: Option<String>,

    /// Same as --trigger none
    #[arg(long)]
    pub no_trigger: bool,

    /// Use an in-memory device instead of the sound card
    #[arg(long)]
    pub dry_run: bool,

    /// Print audio devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Write the effective settings to the settings file and exit
    #[arg(long)]
    pub save_settings: bool,
}

/// Accepts the same spellings as the settings file.
fn policy_arg(s: &str) -> Result<String, String> {
    parse_policy(s)
        .map(String::from)
        .ok_or_else(|| format!("unknown interrupt policy {s:?} (expected clear or duck)"))
}

fn trigger_arg(s: &str) -> Result<String, String> {
    parse_trigger(s)
        .map(String::from)
        .ok_or_else(|| format!("unknown trigger {s:?} (expected auto, keyboard, gpio or none)"))
}

impl CliArgs {
    pub fn apply_to(&self, settings: &mut AppSettings) {
        if self.vad {
            settings.vad_enabled = true;
        }
        if let Some(policy) = &self.policy {
            settings.interrupt_policy = policy.clone();
        }
        if self.no_trigger {
            settings.trigger = "none".into();
        } else if let Some(trigger) = &self.trigger {
            settings.trigger = trigger.clone();
        }
        settings.normalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_change_nothing() {
        let cli = CliArgs::try_parse_from(["jarvis"]).unwrap();
        assert_eq!(cli, CliArgs::default());
        let mut settings = AppSettings::default();
        cli.apply_to(&mut settings);
        assert_eq!(settings, AppSettings::default());
    }

    #[test]
    fn flags_and_values() {
        let cli = CliArgs::try_parse_from([
            "jarvis", "--wav", "reply.wav", "--vad", "--policy", "Duck", "--no-trigger",
        ])
        .unwrap();
        assert_eq!(cli.wav, Some(PathBuf::from("reply.wav")));
        assert!(cli.vad);
        assert_eq!(cli.policy.as_deref(), Some("duck"));
        assert!(cli.no_trigger);
        assert!(!cli.dry_run);
    }

    #[test]
    fn policy_accepts_settings_aliases() {
        let cli = CliArgs::try_parse_from(["jarvis", "--policy", "ducking"]).unwrap();
        assert_eq!(cli.policy.as_deref(), Some("duck"));
        let cli = CliArgs::try_parse_from(["jarvis", "--trigger", "button"]).unwrap();
        assert_eq!(cli.trigger.as_deref(), Some("gpio"));
    }

    #[test]
    fn bad_input_is_rejected() {
        assert!(CliArgs::try_parse_from(["jarvis", "--wav"]).is_err());
        assert!(CliArgs::try_parse_from(["jarvis", "--policy", "mute"]).is_err());
        assert!(CliArgs::try_parse_from(["jarvis", "--frobnicate"]).is_err());
        assert!(CliArgs::try_parse_from(["jarvis", "--trigger", "gpio", "--no-trigger"]).is_err());
    }

    #[test]
    fn flags_override_settings() {
        let mut settings = AppSettings::default();
        CliArgs::try_parse_from(["jarvis", "--vad", "--policy", "duck", "--trigger", "gpio"])
            .unwrap()
            .apply_to(&mut settings);
        assert!(settings.vad_enabled);
        assert_eq!(settings.interrupt_policy, "duck");
        assert_eq!(settings.trigger, "gpio");
    }
}
