//! Wires the voice interface, a conversation session and an interrupt trigger.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Result;
use jarvis_core::{InterruptAction, VoiceInterface};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::platform::Platform;
use crate::session::ConversationSession;
use crate::trigger::InterruptTrigger;

/// Contextual update sent to the agent when the user forces an interruption.
pub const FORCED_INTERRUPTION_MESSAGE: &str = "The user forced an interruption.";

pub struct Assistant {
    interface: Arc<VoiceInterface>,
    session: Arc<dyn ConversationSession>,
    trigger: Mutex<Box<dyn InterruptTrigger>>,
    session_active: Arc<AtomicBool>,
    /// Set by `shutdown`; a session that starts afterwards is ended at once.
    shutting_down: AtomicBool,
    platform: Platform,
}

impl Assistant {
    pub fn new(
        interface: Arc<VoiceInterface>,
        session: Arc<dyn ConversationSession>,
        trigger: Box<dyn InterruptTrigger>,
        platform: Platform,
    ) -> Self {
        Self {
            interface,
            session,
            trigger: Mutex::new(trigger),
            session_active: Arc::new(AtomicBool::new(false)),
            shutting_down: AtomicBool::new(false),
            platform,
        }
    }

    /// Arm the interrupt trigger. A trigger that fails to set up is logged
    /// and skipped; VAD and session interrupts still work without it.
    pub fn initialize(&self) {
        let interface = Arc::clone(&self.interface);
        let session = Arc::clone(&self.session);
        let active = Arc::clone(&self.session_active);
        let callback = Arc::new(move || {
            handle_interrupt(&interface, session.as_ref(), active.load(Ordering::SeqCst));
        });

        let mut trigger = self.trigger.lock();
        if let Err(e) = trigger.setup(callback) {
            warn!(
                trigger = trigger.name(),
                platform = %self.platform,
                "failed to set up interrupt trigger: {e:#}"
            );
        }
        info!(platform = %self.platform, trigger = trigger.name(), "assistant ready");
    }

    /// Start the session and block until it ends. Resources are released on
    /// every path.
    ///
    /// Returns the conversation id when the session ran to completion.
    pub fn run(&self) -> Result<Option<String>> {
        if self.shutting_down.load(Ordering::SeqCst) {
            info!("shutdown requested before the session started");
            self.cleanup();
            return Ok(None);
        }
        info!("starting conversation session");
        if let Err(e) = self.session.start_session() {
            self.cleanup();
            return Err(e);
        }
        self.session_active.store(true, Ordering::SeqCst);
        // `shutdown` may have run while the device was opening and found no
        // active session to end.
        if self.shutting_down.load(Ordering::SeqCst) {
            info!("shutdown requested while the session was starting");
            self.cleanup();
            return Ok(None);
        }
        info!("conversation session started");

        let id = self.session.wait_for_session_end();
        self.session_active.store(false, Ordering::SeqCst);
        match &id {
            Some(id) => info!(id = %id, "conversation ended"),
            None => info!("conversation ended early"),
        }
        self.cleanup();
        Ok(id)
    }

    /// Stop everything from another thread (e.g. on Ctrl-C). Unblocks `run`.
    pub fn shutdown(&self) {
        info!("shutting down");
        self.shutting_down.store(true, Ordering::SeqCst);
        self.cleanup();
    }

    /// Idempotent.
    pub fn cleanup(&self) {
        if self.session_active.swap(false, Ordering::SeqCst) {
            self.session.end_session();
        }
        self.trigger.lock().cleanup();
        if let Err(e) = self.interface.stop() {
            warn!("error stopping voice interface: {e}");
        }
    }

    pub fn is_session_active(&self) -> bool {
        self.session_active.load(Ordering::SeqCst)
    }
}

/// React to a physical interrupt: silence (or duck) the agent locally, then
/// tell the agent why when a session is live.
pub fn handle_interrupt(
    interface: &VoiceInterface,
    session: &dyn ConversationSession,
    session_active: bool,
) -> InterruptAction {
    let action = interface.force_interrupt();
    if session_active {
        if let Err(e) = session.send_user_message(FORCED_INTERRUPTION_MESSAGE) {
            warn!("failed to send contextual update: {e:#}");
        }
    } else {
        info!("conversation session not yet active, skipping contextual update");
    }
    action
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ListenSession, WavSession};
    use crate::trigger::{NoOpTrigger, TriggerCallback};
    use jarvis_core::{AudioChunk, InterfaceConfig, InterruptPolicy, StubDevice};
    use std::thread;
    use std::time::Duration;

    /// Stores the callback so a test can fire it.
    struct ManualTrigger {
        slot: Arc<Mutex<Option<TriggerCallback>>>,
        cleanups: Arc<Mutex<usize>>,
    }

    impl InterruptTrigger for ManualTrigger {
        fn setup(&mut self, callback: TriggerCallback) -> Result<()> {
            *self.slot.lock() = Some(callback);
            Ok(())
        }

        fn cleanup(&mut self) {
            *self.cleanups.lock() += 1;
        }

        fn name(&self) -> &'static str {
            "manual"
        }
    }

    fn interface(device: &StubDevice, policy: InterruptPolicy) -> Arc<VoiceInterface> {
        let cfg = InterfaceConfig {
            interrupt_policy: policy,
            output_frame_size: 1_600,
            ..Default::default()
        };
        Arc::new(VoiceInterface::new(cfg, Arc::new(device.clone())).unwrap())
    }

    #[test]
    fn interrupt_before_session_skips_contextual_update() {
        let device = StubDevice::new();
        let vi = interface(&device, InterruptPolicy::Clear);
        let session = WavSession::from_samples("s", &[0; 16], Arc::clone(&vi));
        assert_eq!(
            handle_interrupt(&vi, &session, false),
            InterruptAction::Cleared { discarded: 0 }
        );
        assert!(session.messages().is_empty());
    }

    #[test]
    fn trigger_interrupts_playback_and_notifies_agent() {
        let device = StubDevice::new();
        device.set_write_delay(Duration::from_millis(20));
        let vi = interface(&device, InterruptPolicy::Clear);
        let session = Arc::new(
            WavSession::from_samples("reply", &vec![500i16; 16_000 * 5], Arc::clone(&vi))
                .with_pace(0.0),
        );
        let slot = Arc::new(Mutex::new(None));
        let cleanups = Arc::new(Mutex::new(0));
        let trigger = ManualTrigger {
            slot: Arc::clone(&slot),
            cleanups: Arc::clone(&cleanups),
        };
        let assistant = Arc::new(Assistant::new(
            Arc::clone(&vi),
            session.clone(),
            Box::new(trigger),
            Platform::Linux,
        ));
        assistant.initialize();

        let runner = {
            let assistant = Arc::clone(&assistant);
            thread::spawn(move || assistant.run())
        };
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !assistant.is_session_active() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(assistant.is_session_active());
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while vi.queued_chunks() < 20 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }

        let fire = slot.lock().clone().expect("trigger armed");
        fire();
        assert_eq!(session.messages(), vec![FORCED_INTERRUPTION_MESSAGE]);

        let id = runner.join().unwrap().unwrap();
        assert_eq!(id.as_deref(), Some("reply"));
        // 50 chunks were pushed; the interrupt discarded most of them.
        assert!(device.written_count() < 50);
        assert!(*cleanups.lock() >= 1);
        assert!(!vi.is_running());
    }

    #[test]
    fn shutdown_before_run_does_not_hang() {
        let device = StubDevice::new();
        let vi = interface(&device, InterruptPolicy::Clear);
        let session = Arc::new(ListenSession::new(Arc::clone(&vi)));
        let assistant = Arc::new(Assistant::new(
            Arc::clone(&vi),
            session,
            Box::new(NoOpTrigger),
            Platform::Linux,
        ));
        assistant.initialize();
        assistant.shutdown();

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        {
            let assistant = Arc::clone(&assistant);
            thread::spawn(move || {
                let _ = done_tx.send(assistant.run());
            });
        }
        let outcome = done_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("run returned after shutdown");
        assert_eq!(outcome.unwrap(), None);
        assert!(!assistant.is_session_active());
        assert!(!vi.is_running());
    }

    #[test]
    fn listen_session_ended_before_waiting_still_returns() {
        let device = StubDevice::new();
        let vi = interface(&device, InterruptPolicy::Clear);
        let session = ListenSession::new(Arc::clone(&vi));
        session.end_session();
        session.start_session().unwrap();
        assert_eq!(session.wait_for_session_end(), None);
        session.end_session();
        assert!(!vi.is_running());
    }

    #[test]
    fn shutdown_ends_a_running_session() {
        let device = StubDevice::new();
        let vi = interface(&device, InterruptPolicy::Duck);
        let session = Arc::new(WavSession::from_samples(
            "long",
            &vec![1i16; 16_000 * 30],
            Arc::clone(&vi),
        ));
        let assistant = Arc::new(Assistant::new(
            Arc::clone(&vi),
            session,
            Box::new(NoOpTrigger),
            Platform::Unknown,
        ));
        assistant.initialize();

        let runner = {
            let assistant = Arc::clone(&assistant);
            thread::spawn(move || assistant.run())
        };
        thread::sleep(Duration::from_millis(100));
        assistant.shutdown();
        assert_eq!(runner.join().unwrap().unwrap(), None);
        assert!(!vi.is_running());

        // Output after shutdown is refused.
        assert_eq!(
            vi.output(AudioChunk::from_samples(&[1])),
            jarvis_core::EnqueueOutcome::Closed
        );
    }
}
