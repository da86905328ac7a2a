//! Events module for the capture session flow
//!
//! Provides structured event types for screen transitions, phrase
//! matches, capture requests, and the otherwise-silent failure paths.

use serde::{Deserialize, Serialize};

/// Events emitted by the screen flow controller during a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Entered the Listening screen and started a recognition session
    ListeningEntered {
        /// Session generation counter, bumped on every entry
        session: u64,
    },

    /// Left the Listening screen and stopped the recognition session
    ListeningExited {
        /// Session generation that was stopped
        session: u64,
        /// Duration in milliseconds the session was active
        duration_ms: u64,
    },

    /// The target phrase was matched in a recognition result
    PhraseHeard {
        /// Session generation in which the match occurred
        session: u64,
        /// Whether the capture request was submitted in the same step;
        /// carried in-band so status mirrors cannot drift
        photo_taken: bool,
    },

    /// A capture request was submitted to the camera subsystem
    CaptureRequested {
        /// Session generation in which the request was submitted
        session: u64,
    },

    /// The recognition session failed to start or errored mid-session.
    /// Swallowed by the controller; surfaced here for subscribers.
    RecognitionUnavailable {
        /// Human-readable failure detail
        detail: String,
    },

    /// A capture request could not be issued.
    /// Swallowed by the controller; surfaced here for subscribers.
    CaptureUnavailable {
        /// Human-readable failure detail
        detail: String,
    },
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::ListeningEntered { session } => {
                write!(f, "LISTENING_ENTERED (session {})", session)
            }
            SessionEvent::ListeningExited {
                session,
                duration_ms,
            } => {
                write!(f, "LISTENING_EXITED (session {}, {}ms)", session, duration_ms)
            }
            SessionEvent::PhraseHeard {
                session,
                photo_taken,
            } => {
                write!(f, "PHRASE_HEARD (session {}, photo_taken={})", session, photo_taken)
            }
            SessionEvent::CaptureRequested { session } => {
                write!(f, "CAPTURE_REQUESTED (session {})", session)
            }
            SessionEvent::RecognitionUnavailable { detail } => {
                write!(f, "RECOGNITION_UNAVAILABLE ({})", detail)
            }
            SessionEvent::CaptureUnavailable { detail } => {
                write!(f, "CAPTURE_UNAVAILABLE ({})", detail)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = SessionEvent::ListeningExited {
            session: 3,
            duration_ms: 1500,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("listening_exited"));
        assert!(json.contains("1500"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"phrase_heard","session":1,"photo_taken":true}"#;
        let event: SessionEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(
            event,
            SessionEvent::PhraseHeard {
                session: 1,
                photo_taken: true
            }
        ));
    }

    #[test]
    fn test_failure_event_display() {
        let event = SessionEvent::RecognitionUnavailable {
            detail: "recognizer exited".to_string(),
        };
        assert_eq!(
            event.to_string(),
            "RECOGNITION_UNAVAILABLE (recognizer exited)"
        );
    }
}
