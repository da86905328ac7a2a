//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::SessionEvent;
use crate::screen::Screen;

/// Screen names as seen over IPC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenName {
    /// Start screen, waiting for a tap
    Landing,
    /// Recognition session active
    Listening,
}

impl Default for ScreenName {
    fn default() -> Self {
        Self::Landing
    }
}

/// Requests from UI to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// A tap on the Landing screen
    Tap,

    /// Navigate back from Listening to Landing
    Back,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to session event notifications
    Subscribe,
}

/// Responses from daemon to UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Navigation request forwarded to the controller
    Accepted,

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification from daemon to UI (for subscribed clients)
///
/// Externally tagged: the inner `SessionEvent` already uses a `type` tag,
/// so an internal `type` tag here would collide with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notification {
    /// A session event occurred
    SessionEvent(SessionEvent),
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Current screen
    pub screen: ScreenName,

    /// The target phrase was matched this session
    pub heard_phrase: bool,

    /// A capture request was submitted this session
    pub photo_taken: bool,

    /// User-facing text for the current screen and flags
    pub display_text: String,

    /// Session generation counter
    pub session: u64,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            screen: ScreenName::default(),
            heard_phrase: false,
            photo_taken: false,
            display_text: "Tap anywhere to proceed".to_string(),
            session: 0,
            uptime_secs: 0,
        }
    }
}

/// Convert internal Screen to IPC ScreenName
impl From<Screen> for ScreenName {
    fn from(screen: Screen) -> Self {
        match screen {
            Screen::Landing => ScreenName::Landing,
            Screen::Listening => ScreenName::Listening,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = Request::Tap;
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("tap"));
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(DaemonStatus::default());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("status"));
        assert!(json.contains("Tap anywhere to proceed"));
    }

    #[test]
    fn test_notification_serialization() {
        let note = Notification::SessionEvent(SessionEvent::PhraseHeard {
            session: 2,
            photo_taken: true,
        });
        let json = serde_json::to_string(&note).unwrap();
        assert!(json.contains("phrase_heard"));
    }

    #[test]
    fn test_screen_name_from_screen() {
        assert_eq!(ScreenName::from(Screen::Landing), ScreenName::Landing);
        assert_eq!(ScreenName::from(Screen::Listening), ScreenName::Listening);
    }
}
