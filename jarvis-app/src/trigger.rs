//! Physical interrupt triggers: a key on the terminal or a GPIO button.

use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::platform::Platform;

pub type TriggerCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// A source of user-initiated interrupts.
pub trait InterruptTrigger: Send {
    /// Start watching; `callback` runs on the trigger's own thread.
    fn setup(&mut self, callback: TriggerCallback) -> Result<()>;

    /// Stop watching. Safe to call more than once.
    fn cleanup(&mut self);

    fn name(&self) -> &'static str;
}

/// Pick the trigger for `kind` (`auto`, `keyboard`, `gpio`, `none`).
///
/// `auto` uses the GPIO button on a Raspberry Pi and the keyboard elsewhere.
pub fn for_kind(kind: &str, platform: Platform, gpio_pin: u32) -> Box<dyn InterruptTrigger> {
    match (kind, platform) {
        ("none", _) => Box::new(NoOpTrigger),
        ("gpio", _) | ("auto", Platform::Pi) => Box::new(GpioTrigger::new(gpio_pin)),
        ("keyboard", _) | ("auto", Platform::Mac | Platform::Linux) => Box::new(KeyboardTrigger::new()),
        _ => Box::new(NoOpTrigger),
    }
}

// ---------------------------------------------------------------------------
// Keyboard
// ---------------------------------------------------------------------------

/// Fires on every Enter press on stdin.
pub struct KeyboardTrigger {
    active: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl KeyboardTrigger {
    pub fn new() -> Self {
        Self {
            active: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }
}

impl Default for KeyboardTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptTrigger for KeyboardTrigger {
    fn setup(&mut self, callback: TriggerCallback) -> Result<()> {
        self.active.store(true, Ordering::SeqCst);
        let active = Arc::clone(&self.active);
        let handle = thread::Builder::new()
            .name("jarvis-keyboard".into())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    if line.is_err() || !active.load(Ordering::SeqCst) {
                        break;
                    }
                    info!("Enter pressed, interrupting agent speech");
                    callback();
                }
                debug!("keyboard trigger exiting");
            })
            .context("spawn keyboard trigger thread")?;
        self.handle = Some(handle);
        info!("keyboard trigger ready: press ENTER to interrupt");
        Ok(())
    }

    fn cleanup(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        // A blocked stdin read cannot be cancelled; the thread is left to
        // exit at the next line or at process exit.
        self.handle.take();
    }

    fn name(&self) -> &'static str {
        "keyboard"
    }
}

// ---------------------------------------------------------------------------
// GPIO
// ---------------------------------------------------------------------------

const SYSFS_GPIO: &str = "/sys/class/gpio";
const GPIO_POLL: Duration = Duration::from_millis(10);
const GPIO_DEBOUNCE: Duration = Duration::from_millis(50);

/// Button between the pin and ground with a pull-up: pressed reads `0`.
///
/// Uses the sysfs GPIO interface and polls the value file, firing once per
/// falling edge.
pub struct GpioTrigger {
    pin: u32,
    root: PathBuf,
    active: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl GpioTrigger {
    pub fn new(pin: u32) -> Self {
        Self::with_root(pin, SYSFS_GPIO)
    }

    /// Watch `<root>/gpio<pin>/value` instead of the system sysfs tree.
    pub fn with_root(pin: u32, root: impl Into<PathBuf>) -> Self {
        Self {
            pin,
            root: root.into(),
            active: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    fn pin_dir(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.pin))
    }

    /// Export the pin and configure it as an input if sysfs has not already.
    fn export(&self) -> Result<()> {
        let dir = self.pin_dir();
        if !dir.exists() {
            fs::write(self.root.join("export"), self.pin.to_string())
                .with_context(|| format!("export GPIO{}", self.pin))?;
        }
        let direction = dir.join("direction");
        if direction.exists() {
            fs::write(&direction, "in").with_context(|| format!("set GPIO{} as input", self.pin))?;
        }
        Ok(())
    }
}

fn read_level(value: &Path) -> Option<bool> {
    let raw = fs::read_to_string(value).ok()?;
    match raw.trim() {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

impl InterruptTrigger for GpioTrigger {
    fn setup(&mut self, callback: TriggerCallback) -> Result<()> {
        self.export()?;
        let value = self.pin_dir().join("value");
        let mut last = read_level(&value)
            .with_context(|| format!("read {}", value.display()))?;

        self.active.store(true, Ordering::SeqCst);
        let active = Arc::clone(&self.active);
        let pin = self.pin;
        let handle = thread::Builder::new()
            .name(format!("jarvis-gpio{pin}"))
            .spawn(move || {
                let mut last_fire: Option<Instant> = None;
                while active.load(Ordering::SeqCst) {
                    match read_level(&value) {
                        Some(level) => {
                            let falling = last && !level;
                            let settled = last_fire.map_or(true, |t| t.elapsed() >= GPIO_DEBOUNCE);
                            if falling && settled {
                                info!(pin, "button pressed, interrupting agent speech");
                                last_fire = Some(Instant::now());
                                callback();
                            }
                            last = level;
                        }
                        None => warn!(pin, "unreadable GPIO value"),
                    }
                    thread::sleep(GPIO_POLL);
                }
                debug!(pin, "gpio trigger exiting");
            })
            .context("spawn GPIO trigger thread")?;
        self.handle = Some(handle);
        info!(pin, "GPIO trigger ready: press the button to interrupt");
        Ok(())
    }

    fn cleanup(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(pin = self.pin, "GPIO trigger thread panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "gpio"
    }
}

impl Drop for GpioTrigger {
    fn drop(&mut self) {
        self.cleanup();
    }
}

// ---------------------------------------------------------------------------
// No-op
// ---------------------------------------------------------------------------

/// For platforms without an input method; interrupts still arrive from VAD
/// and from the session.
pub struct NoOpTrigger;

impl InterruptTrigger for NoOpTrigger {
    fn setup(&mut self, _callback: TriggerCallback) -> Result<()> {
        warn!("no interrupt trigger available on this platform");
        Ok(())
    }

    fn cleanup(&mut self) {}

    fn name(&self) -> &'static str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn fake_sysfs(pin: u32, level: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let pin_dir = dir.path().join(format!("gpio{pin}"));
        fs::create_dir_all(&pin_dir).unwrap();
        fs::write(pin_dir.join("direction"), "out").unwrap();
        fs::write(pin_dir.join("value"), level).unwrap();
        (dir, pin_dir)
    }

    fn wait_for(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn auto_picks_per_platform() {
        assert_eq!(for_kind("auto", Platform::Pi, 17).name(), "gpio");
        assert_eq!(for_kind("auto", Platform::Mac, 17).name(), "keyboard");
        assert_eq!(for_kind("auto", Platform::Unknown, 17).name(), "none");
        assert_eq!(for_kind("none", Platform::Pi, 17).name(), "none");
        assert_eq!(for_kind("gpio", Platform::Mac, 17).name(), "gpio");
    }

    #[test]
    fn gpio_fires_once_per_falling_edge() {
        let (root, pin_dir) = fake_sysfs(17, "1\n");
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let mut trigger = GpioTrigger::with_root(17, root.path());
        trigger
            .setup(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        assert_eq!(fs::read_to_string(pin_dir.join("direction")).unwrap(), "in");

        fs::write(pin_dir.join("value"), "0\n").unwrap();
        assert!(wait_for(|| fired.load(Ordering::SeqCst) == 1));
        // Held down: no repeat.
        thread::sleep(Duration::from_millis(100));
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        fs::write(pin_dir.join("value"), "1\n").unwrap();
        thread::sleep(Duration::from_millis(100));
        fs::write(pin_dir.join("value"), "0\n").unwrap();
        assert!(wait_for(|| fired.load(Ordering::SeqCst) == 2));

        trigger.cleanup();
        trigger.cleanup();
    }

    #[test]
    fn gpio_setup_fails_without_value_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("export"), "").unwrap();
        let mut trigger = GpioTrigger::with_root(5, dir.path());
        assert!(trigger.setup(Arc::new(|| {})).is_err());
    }

    #[test]
    fn noop_setup_succeeds() {
        let mut trigger = NoOpTrigger;
        trigger.setup(Arc::new(|| {})).unwrap();
        trigger.cleanup();
    }
}
