//! Core screen flow implementation
//!
//! Handles the Landing/Listening transition and the two monotonic
//! outcome flags set by recognition and capture events. All mutation
//! happens on the controller's event loop, so no locks are needed.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::capture::CaptureService;
use crate::events::SessionEvent;
use crate::recognition::{Candidates, ListenerEvent, RecognitionControl, RecognitionEvent};

/// The two screens of the flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    /// Start screen; a tap advances to Listening
    Landing,
    /// Recognition session screen, active until navigated away
    Listening,
}

impl Default for Screen {
    fn default() -> Self {
        Self::Landing
    }
}

impl std::fmt::Display for Screen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Screen::Landing => write!(f, "Landing"),
            Screen::Listening => write!(f, "Listening"),
        }
    }
}

/// Session outcome flags, reset only on re-entering Listening.
///
/// Both flags are monotonic within a session: once true they stay true
/// until the next entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeFlags {
    /// The target phrase was matched in a recognition result
    pub heard_phrase: bool,
    /// A capture request was submitted (not a capture confirmation)
    pub photo_taken: bool,
}

/// The user-facing text for a screen and its outcome flags.
///
/// The strings are fixed; the flags pick one of four on Listening.
pub fn display_text(screen: Screen, flags: OutcomeFlags) -> &'static str {
    match screen {
        Screen::Landing => "Tap anywhere to proceed",
        Screen::Listening => match (flags.heard_phrase, flags.photo_taken) {
            (false, false) => "Say 'scan' to take a photo.",
            (true, true) => "Success! Heard 'scan' and took the photo!",
            (true, false) => "Heard 'scan', but the photo request failed.",
            // Unreachable: capture is only triggered by a phrase match
            (false, true) => "Photo taken, but 'scan' was not heard.",
        },
    }
}

/// Inputs to the controller's event loop
#[derive(Debug)]
pub enum ControlEvent {
    /// A tap on the Landing screen
    Tap,
    /// Navigation back from Listening to Landing
    Back,
    /// An event from the recognition session
    Recognition(ListenerEvent),
}

/// The controller that owns screen state and outcome flags
pub struct ScreenController {
    /// Current screen
    screen: Screen,
    /// Outcome flags for the current session
    flags: OutcomeFlags,
    /// Session generation, bumped on every Listening entry
    session: u64,
    /// Token to match in transcript candidates
    phrase: String,
    /// Time when the current Listening session was entered
    listening_since: Option<Instant>,
    /// Recognition session start/stop handle
    recognition: Arc<dyn RecognitionControl>,
    /// Camera capture boundary
    capture: Arc<dyn CaptureService>,
    /// Channel for emitting session events
    event_tx: broadcast::Sender<SessionEvent>,
}

impl ScreenController {
    /// Create a new controller starting on the Landing screen
    pub fn new(
        phrase: String,
        recognition: Arc<dyn RecognitionControl>,
        capture: Arc<dyn CaptureService>,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            screen: Screen::Landing,
            flags: OutcomeFlags::default(),
            session: 0,
            phrase,
            listening_since: None,
            recognition,
            capture,
            event_tx,
        }
    }

    /// Get the current screen
    pub fn screen(&self) -> Screen {
        self.screen
    }

    /// Get the current outcome flags
    pub fn flags(&self) -> OutcomeFlags {
        self.flags
    }

    /// Get the current session generation
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Run the controller, processing control events
    pub async fn run(&mut self, mut control_rx: mpsc::Receiver<ControlEvent>) {
        info!("screen flow controller started on Landing");

        while let Some(event) = control_rx.recv().await {
            match event {
                ControlEvent::Tap => self.handle_tap(),
                ControlEvent::Back => self.handle_back(),
                ControlEvent::Recognition(event) => self.handle_recognition(event),
            }
        }

        info!("screen flow controller stopped");
    }

    /// Handle a tap: Landing -> Listening
    ///
    /// Resets both outcome flags, bumps the session generation, and
    /// starts a fresh recognition session.
    fn handle_tap(&mut self) {
        if self.screen != Screen::Landing {
            debug!(screen = %self.screen, "tap ignored");
            return;
        }

        self.session += 1;
        self.flags = OutcomeFlags::default();
        self.screen = Screen::Listening;
        self.listening_since = Some(Instant::now());

        info!(session = self.session, "entering Listening");

        if let Err(e) = self.recognition.start(self.session) {
            // Silent by policy; subscribers can observe the event
            warn!(?e, "recognition session failed to start");
            self.emit(SessionEvent::RecognitionUnavailable {
                detail: e.to_string(),
            });
        }

        self.emit(SessionEvent::ListeningEntered {
            session: self.session,
        });
    }

    /// Handle back navigation: Listening -> Landing
    ///
    /// Stops the recognition session; any event still in flight carries
    /// a stale generation and is discarded when it arrives.
    fn handle_back(&mut self) {
        if self.screen != Screen::Listening {
            debug!(screen = %self.screen, "back ignored");
            return;
        }

        self.recognition.stop();

        let duration_ms = self
            .listening_since
            .take()
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        self.screen = Screen::Landing;

        info!(session = self.session, duration_ms, "leaving Listening");

        self.emit(SessionEvent::ListeningExited {
            session: self.session,
            duration_ms,
        });
    }

    /// Handle an event from the recognition session
    fn handle_recognition(&mut self, event: ListenerEvent) {
        if self.screen != Screen::Listening || event.session != self.session {
            debug!(
                event_session = event.session,
                current_session = self.session,
                "stale recognition event discarded"
            );
            return;
        }

        match event.event {
            RecognitionEvent::Results(candidates) => self.handle_results(candidates),
            RecognitionEvent::Error(detail) => {
                // Swallowed by policy; surfaced only on the event stream
                debug!(%detail, "recognition session error");
                self.emit(SessionEvent::RecognitionUnavailable { detail });
            }
            other => {
                debug!(?other, "recognition lifecycle event ignored");
            }
        }
    }

    /// Handle terminal transcript candidates for one utterance cycle
    fn handle_results(&mut self, candidates: Candidates) {
        if self.flags.heard_phrase {
            debug!(session = self.session, "phrase already matched this session");
            return;
        }

        if !candidates.contains_token(&self.phrase) {
            debug!(count = candidates.len(), "no phrase match in candidates");
            return;
        }

        info!(session = self.session, phrase = %self.phrase, "phrase matched");

        // photo_taken means "request submitted", set at the call site
        let submitted = match self.capture.request_capture() {
            Ok(()) => {
                self.emit(SessionEvent::CaptureRequested {
                    session: self.session,
                });
                true
            }
            Err(e) => {
                warn!(?e, "capture request could not be issued");
                self.emit(SessionEvent::CaptureUnavailable {
                    detail: e.to_string(),
                });
                false
            }
        };

        self.flags.heard_phrase = true;
        self.flags.photo_taken = submitted;

        self.emit(SessionEvent::PhraseHeard {
            session: self.session,
            photo_taken: submitted,
        });
    }

    /// Emit a session event to subscribers
    fn emit(&self, event: SessionEvent) {
        debug!(%event, "emitting session event");
        let _ = self.event_tx.send(event);
    }
}
