//! Event types broadcast by `VoiceInterface`.
//!
//! | Event | Subscription |
//! |-------|--------------|
//! | `SpeakingEvent` | `VoiceInterface::subscribe_speaking` |
//! | `InterfaceStatusEvent` | `VoiceInterface::subscribe_status` |
//!
//! Both serialize to camelCase JSON so they can be forwarded verbatim to a
//! session log or UI.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Speaking events
// ---------------------------------------------------------------------------

/// Emitted once per debounced VAD transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakingEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// New debounced state.
    pub is_speaking: bool,
    /// Stream time of the window that completed the transition, in
    /// milliseconds of captured audio since `start()`.
    pub stream_ms: u64,
}

// ---------------------------------------------------------------------------
// Interface status events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceStatusEvent {
    pub status: InterfaceStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceStatus {
    /// Created, `start()` not yet called.
    Idle,
    /// Device open and loops running.
    Running,
    /// Stopped cleanly; may be restarted.
    Stopped,
    /// Device start failed or playback died.
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speaking_event_serializes_with_camel_case() {
        let event = SpeakingEvent {
            seq: 3,
            is_speaking: true,
            stream_ms: 256,
        };
        let json = serde_json::to_value(&event).expect("serialize speaking event");
        assert_eq!(json["seq"], 3);
        assert_eq!(json["isSpeaking"], true);
        assert_eq!(json["streamMs"], 256);
    }

    #[test]
    fn status_event_round_trips_with_lowercase_status() {
        let event = InterfaceStatusEvent {
            status: InterfaceStatus::Error,
            detail: Some("output device failed".into()),
        };
        let json = serde_json::to_string(&event).expect("serialize status event");
        assert!(json.contains(r#""status":"error""#));

        let back: InterfaceStatusEvent =
            serde_json::from_str(&json).expect("deserialize status event");
        assert_eq!(back.status, InterfaceStatus::Error);
        assert_eq!(back.detail.as_deref(), Some("output device failed"));
    }
}
