//! Jarvis command-line host.
//!
//! ## Runtime note
//!
//! The voice interface runs on its own threads. The assistant's blocking
//! `run` goes through `spawn_blocking` so Tokio stays free to watch Ctrl-C
//! and forward interface status events to the log.

mod assistant;
mod cli;
mod platform;
mod session;
mod settings;
mod trigger;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use jarvis_core::{audio::device::list_devices, DuplexDevice, StubDevice, VoiceInterface};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use assistant::Assistant;
use cli::CliArgs;
use platform::Platform;
use session::{ConversationSession, ListenSession, WavSession};
use settings::{default_settings_path, load_settings, save_settings, AppSettings, Credentials};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("jarvis=info,jarvis_core=info")),
        )
        .init();

    // Usage errors exit with status 2; --help and --version exit 0.
    let args = CliArgs::parse();
    if args.list_devices {
        print_devices();
        return ExitCode::SUCCESS;
    }

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn print_devices() {
    let devices = list_devices();
    if devices.is_empty() {
        println!("no audio devices found");
        return;
    }
    for d in devices {
        println!(
            "{:<6} {}{}{}",
            format!("{:?}", d.direction).to_ascii_lowercase(),
            d.name,
            if d.is_default { " (default)" } else { "" },
            if d.is_loopback_like { " [loopback?]" } else { "" },
        );
    }
}

fn settings_path(args: &CliArgs) -> std::path::PathBuf {
    args.settings.clone().unwrap_or_else(default_settings_path)
}

fn resolve_settings(args: &CliArgs) -> Result<AppSettings> {
    let path = settings_path(args);
    let mut settings = load_settings(&path);
    settings.apply_env_overrides(|key| std::env::var(key).ok());
    args.apply_to(&mut settings);
    settings.validate()?;
    info!(
        path = %path.display(),
        policy = %settings.interrupt_policy,
        vad = settings.vad_enabled,
        trigger = %settings.trigger,
        "settings loaded"
    );
    Ok(settings)
}

async fn run(args: CliArgs) -> Result<ExitCode> {
    let settings = resolve_settings(&args)?;
    if args.save_settings {
        let path = settings_path(&args);
        save_settings(&path, &settings)
            .with_context(|| format!("write settings to {}", path.display()))?;
        println!("settings written to {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }
    let platform = Platform::detect();
    info!(%platform, version = env!("CARGO_PKG_VERSION"), "Jarvis starting");

    match Credentials::from_env(|key| std::env::var(key).ok()) {
        Some(creds) => info!(agent_id = %creds.agent_id, "agent credentials found"),
        None if args.wav.is_none() => {
            warn!("AGENT_ID / ELEVENLABS_API_KEY not set; running a listen-only session")
        }
        None => {}
    }

    let device: Arc<dyn DuplexDevice> = if args.dry_run {
        info!("dry run: using in-memory audio device");
        Arc::new(StubDevice::new())
    } else {
        Arc::new(jarvis_core::CpalDevice::with_preference(
            settings.input_device.clone(),
            settings.output_device.clone(),
        ))
    };

    let interface = VoiceInterface::new(settings.interface_config(), device)
        .context("create voice interface")?
        .with_speaking_observer(|speaking| {
            if speaking {
                info!("user started speaking");
            } else {
                info!("user stopped speaking");
            }
        });
    let interface = Arc::new(interface);

    let session: Arc<dyn ConversationSession> = match &args.wav {
        Some(path) => {
            let wav = WavSession::open(path, Arc::clone(&interface))?;
            info!(path = %path.display(), chunks = wav.chunk_count(), "agent reply loaded");
            Arc::new(wav)
        }
        None => Arc::new(ListenSession::new(Arc::clone(&interface))),
    };

    let trigger = trigger::for_kind(&settings.trigger, platform, settings.gpio_pin);
    let assistant = Arc::new(Assistant::new(
        Arc::clone(&interface),
        session,
        trigger,
        platform,
    ));
    assistant.initialize();

    let mut status_rx = interface.subscribe_status();
    let status_log = tokio::spawn(async move {
        loop {
            match status_rx.recv().await {
                Ok(ev) => match ev.detail {
                    Some(detail) => warn!(status = ?ev.status, "{detail}"),
                    None => info!(status = ?ev.status, "interface status"),
                },
                Err(RecvError::Lagged(n)) => warn!("status log lagged by {n} events"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let runner = {
        let assistant = Arc::clone(&assistant);
        tokio::task::spawn_blocking(move || assistant.run())
    };
    tokio::pin!(runner);

    let (outcome, interrupted) = tokio::select! {
        res = &mut runner => (res, false),
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received");
            assistant.shutdown();
            (runner.await, true)
        }
    };
    status_log.abort();

    let diagnostics = interface.diagnostics_snapshot();
    info!(
        captured = diagnostics.frames_captured,
        played = diagnostics.chunks_played,
        dropped = diagnostics.chunks_dropped,
        interrupts = diagnostics.interrupts,
        transitions = diagnostics.speaking_transitions,
        "session diagnostics"
    );

    let id = outcome.context("assistant task panicked")??;
    if let Some(id) = id {
        println!("Conversation ID: {id}");
    }
    Ok(if interrupted {
        ExitCode::from(130)
    } else {
        ExitCode::SUCCESS
    })
}
