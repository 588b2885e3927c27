//! Routes interruption events to the output queue and the gain controller.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::info;

use super::config::InterruptPolicy;
use crate::{buffering::OutputQueue, gain::GainController};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptEvent {
    /// Button, key or the remote session's `interrupt()`.
    External,
    /// Explicit end of an external interrupt.
    Resume,
    /// Debounced VAD transition.
    SpeakingStateChanged(bool),
}

/// What the coordinator did in response to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    Cleared { discarded: usize },
    Ducked,
    Restored,
}

pub struct InterruptCoordinator {
    policy: InterruptPolicy,
    queue: Arc<OutputQueue>,
    gain: Arc<GainController>,
    playing: Arc<AtomicBool>,
}

impl InterruptCoordinator {
    pub fn new(
        policy: InterruptPolicy,
        queue: Arc<OutputQueue>,
        gain: Arc<GainController>,
        playing: Arc<AtomicBool>,
    ) -> Self {
        Self {
            policy,
            queue,
            gain,
            playing,
        }
    }

    pub fn policy(&self) -> InterruptPolicy {
        self.policy
    }

    /// Apply `event`.
    ///
    /// Speaking-state changes always duck/restore regardless of policy; the
    /// policy only decides what an external interrupt does.
    pub fn handle(&self, event: InterruptEvent) -> InterruptAction {
        match (event, self.policy) {
            (InterruptEvent::External, InterruptPolicy::Clear) => {
                self.playing.store(false, Ordering::Release);
                let discarded = self.queue.clear();
                info!(discarded, "interrupt: cleared agent audio");
                InterruptAction::Cleared { discarded }
            }
            (InterruptEvent::External, InterruptPolicy::Duck) => {
                self.gain.set_speaking(true);
                info!(
                    gain = self.gain.reduction_factor(),
                    "interrupt: ducking agent audio"
                );
                InterruptAction::Ducked
            }
            (InterruptEvent::Resume, _) => {
                self.gain.set_speaking(false);
                info!("interrupt released: restoring agent volume");
                InterruptAction::Restored
            }
            (InterruptEvent::SpeakingStateChanged(true), _) => {
                self.gain.set_speaking(true);
                InterruptAction::Ducked
            }
            (InterruptEvent::SpeakingStateChanged(false), _) => {
                self.gain.set_speaking(false);
                InterruptAction::Restored
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::chunk::AudioChunk;
    use std::time::{Duration, Instant};

    fn setup(policy: InterruptPolicy) -> (InterruptCoordinator, Arc<OutputQueue>, Arc<GainController>) {
        let queue = Arc::new(OutputQueue::new(16));
        queue.open();
        let gain = Arc::new(GainController::new(0.2, Duration::ZERO));
        let coordinator = InterruptCoordinator::new(
            policy,
            Arc::clone(&queue),
            Arc::clone(&gain),
            Arc::new(AtomicBool::new(true)),
        );
        (coordinator, queue, gain)
    }

    #[test]
    fn clear_policy_empties_queue_without_gain_change() {
        let (c, queue, gain) = setup(InterruptPolicy::Clear);
        for i in 0..5 {
            queue.enqueue(AudioChunk::from_samples(&[i]));
        }
        assert_eq!(
            c.handle(InterruptEvent::External),
            InterruptAction::Cleared { discarded: 5 }
        );
        assert!(queue.is_empty());
        assert_eq!(gain.gain_at(Instant::now()), 1.0);

        assert_eq!(
            c.handle(InterruptEvent::External),
            InterruptAction::Cleared { discarded: 0 }
        );
    }

    #[test]
    fn duck_policy_keeps_queue_and_lowers_gain() {
        let (c, queue, gain) = setup(InterruptPolicy::Duck);
        queue.enqueue(AudioChunk::from_samples(&[1]));
        assert_eq!(c.handle(InterruptEvent::External), InterruptAction::Ducked);
        assert_eq!(queue.len(), 1);
        assert_eq!(gain.gain_at(Instant::now()), 0.2);

        assert_eq!(c.handle(InterruptEvent::Resume), InterruptAction::Restored);
        assert_eq!(gain.gain_at(Instant::now()), 1.0);
    }

    #[test]
    fn speaking_changes_duck_under_either_policy() {
        for policy in [InterruptPolicy::Clear, InterruptPolicy::Duck] {
            let (c, queue, gain) = setup(policy);
            queue.enqueue(AudioChunk::from_samples(&[1]));
            c.handle(InterruptEvent::SpeakingStateChanged(true));
            assert_eq!(gain.gain_at(Instant::now()), 0.2);
            assert_eq!(queue.len(), 1);
            c.handle(InterruptEvent::SpeakingStateChanged(false));
            assert_eq!(gain.gain_at(Instant::now()), 1.0);
        }
    }
}
