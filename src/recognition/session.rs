//! Recognition session listener
//!
//! Bridges an external speech recognizer into the controller's event
//! loop. The recognizer runs as a child process emitting one JSON array
//! of candidate transcripts per line on stdout; a dedicated reader
//! thread forwards each line as a Results event.

use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::transcript::Candidates;

/// Sentinel for "no session running" in the session stamp
const NO_SESSION: u64 = 0;

/// Asynchronous callbacks delivered by a recognition session.
///
/// Mirrors the full callback surface of a platform recognizer. Only
/// `Results` carries information the controller acts on; the remaining
/// lifecycle events are accepted and deliberately ignored.
#[derive(Debug, Clone)]
pub enum RecognitionEvent {
    /// Session is ready to receive speech
    Ready,
    /// Start of an utterance detected
    BeginOfSpeech,
    /// Input volume changed
    RmsChanged(f32),
    /// End of an utterance detected
    EndOfSpeech,
    /// Interim candidates for the current utterance
    PartialResults(Candidates),
    /// Terminal candidates for one utterance cycle
    Results(Candidates),
    /// Generic recognizer event
    Event,
    /// The session failed mid-flight
    Error(String),
}

/// A recognition event tagged with the session generation it belongs to.
///
/// The controller discards events whose generation does not match the
/// current session, which makes late callbacks after stop() harmless.
#[derive(Debug, Clone)]
pub struct ListenerEvent {
    /// Session generation the event was produced under
    pub session: u64,
    /// The recognition callback payload
    pub event: RecognitionEvent,
}

/// Fixed configuration passed to the recognizer when a session begins
#[derive(Debug, Clone)]
pub struct RecognitionConfig {
    /// Language model hint (free-form dictation)
    pub language_model: String,
    /// Recognition locale
    pub locale: String,
    /// External recognizer command and arguments. The command must emit
    /// one JSON array of candidate strings per line on stdout.
    pub recognizer_command: Vec<String>,
}

/// Errors that can occur when starting a recognition session
#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("recognition session is already running")]
    AlreadyRunning,

    #[error("no recognizer command configured")]
    NotConfigured,

    #[error("failed to spawn recognizer process: {0}")]
    Spawn(String),

    #[error("failed to spawn reader thread: {0}")]
    ThreadSpawn(String),
}

/// Start/stop surface of a recognition session.
///
/// The controller holds this as a trait object so tests can inject a
/// recording stub instead of a real child process.
pub trait RecognitionControl: Send + Sync {
    /// Begin one recognition session under the given generation
    fn start(&self, session: u64) -> Result<(), RecognitionError>;

    /// Stop the current session; late events are discarded downstream
    fn stop(&self);
}

/// Recognition session backed by an external recognizer process.
///
/// The active session generation is the single source of truth for
/// "running": both the child slot and the stamp are tagged with it, so
/// a stale reader thread from a stopped session can never kill the next
/// session's recognizer or clear its stamp.
pub struct RecognitionListener {
    config: RecognitionConfig,
    event_tx: mpsc::Sender<ListenerEvent>,
    /// Generation of the active session, NO_SESSION when idle
    current: Arc<AtomicU64>,
    /// Recognizer child tagged with the generation that spawned it
    child: Arc<Mutex<Option<(u64, Child)>>>,
}

impl RecognitionListener {
    /// Create a new listener; no session runs until `start()` is called
    pub fn new(config: RecognitionConfig, event_tx: mpsc::Sender<ListenerEvent>) -> Self {
        Self {
            config,
            event_tx,
            current: Arc::new(AtomicU64::new(NO_SESSION)),
            child: Arc::new(Mutex::new(None)),
        }
    }

    /// Check if a session is currently running
    pub fn is_running(&self) -> bool {
        self.current.load(Ordering::SeqCst) != NO_SESSION
    }

    /// Take the child out of the slot if it belongs to `session`
    fn take_child_for(
        slot: &Mutex<Option<(u64, Child)>>,
        session: u64,
    ) -> Option<Child> {
        let mut slot = slot.lock().unwrap_or_else(|e| e.into_inner());
        match slot.take() {
            Some((owner, child)) if owner == session => Some(child),
            other => {
                // Not ours; put it back untouched
                *slot = other;
                None
            }
        }
    }
}

impl RecognitionControl for RecognitionListener {
    /// Start a recognition session
    ///
    /// Spawns the recognizer process and a dedicated reader thread that
    /// forwards stdout lines as Results events until `stop()` is called
    /// or the recognizer exits.
    fn start(&self, session: u64) -> Result<(), RecognitionError> {
        let (program, args) = self
            .config
            .recognizer_command
            .split_first()
            .ok_or(RecognitionError::NotConfigured)?;

        if self
            .current
            .compare_exchange(NO_SESSION, session, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(RecognitionError::AlreadyRunning);
        }

        let mut child = Command::new(program)
            .args(args)
            .env("RECOGNIZER_LANGUAGE_MODEL", &self.config.language_model)
            .env("RECOGNIZER_LOCALE", &self.config.locale)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                let _ = self.current.compare_exchange(
                    session,
                    NO_SESSION,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                RecognitionError::Spawn(e.to_string())
            })?;

        // stdout is piped above, so take() cannot return None
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = self.current.compare_exchange(
                    session,
                    NO_SESSION,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                return Err(RecognitionError::Spawn(
                    "recognizer stdout unavailable".to_string(),
                ));
            }
        };

        *self.child.lock().unwrap_or_else(|e| e.into_inner()) = Some((session, child));

        let event_tx = self.event_tx.clone();
        let current = Arc::clone(&self.current);
        let child_slot = Arc::clone(&self.child);

        let spawned = thread::Builder::new()
            .name("recognition-session".to_string())
            .spawn(move || {
                info!(session, "recognition session thread started");

                run_session(BufReader::new(stdout), session, &event_tx, &current);

                // Reap our own child if stop() has not already done so;
                // a newer session's child must be left alone
                if let Some(mut child) = Self::take_child_for(&child_slot, session) {
                    let _ = child.kill();
                    let _ = child.wait();
                }

                // Clear the stamp only if it is still ours
                let _ = current.compare_exchange(
                    session,
                    NO_SESSION,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                info!(session, "recognition session thread stopped");
            });

        if let Err(e) = spawned {
            if let Some(mut child) = Self::take_child_for(&self.child, session) {
                let _ = child.kill();
                let _ = child.wait();
            }
            let _ = self.current.compare_exchange(
                session,
                NO_SESSION,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
            return Err(RecognitionError::ThreadSpawn(e.to_string()));
        }

        Ok(())
    }

    /// Stop the current session
    ///
    /// Clears the session stamp and kills the recognizer process so the
    /// reader thread sees EOF and exits. Safe to call when no session
    /// is running.
    fn stop(&self) {
        let session = self.current.swap(NO_SESSION, Ordering::SeqCst);
        if session == NO_SESSION {
            return;
        }

        if let Some(mut child) = Self::take_child_for(&self.child, session) {
            debug!(session, "killing recognizer process");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Forward recognizer stdout lines as session events
fn run_session<R: BufRead>(
    reader: R,
    session: u64,
    event_tx: &mpsc::Sender<ListenerEvent>,
    current: &AtomicU64,
) {
    let send = |event: RecognitionEvent| {
        event_tx
            .blocking_send(ListenerEvent { session, event })
            .is_ok()
    };

    if !send(RecognitionEvent::Ready) {
        warn!("failed to send ready event - channel closed?");
        return;
    }

    for line in reader.lines() {
        if current.load(Ordering::SeqCst) != session {
            debug!(session, "session stopped, discarding remaining output");
            return;
        }

        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!(?e, "error reading recognizer output");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<Vec<String>>(&line) {
            Ok(candidates) => {
                debug!(session, count = candidates.len(), "recognition results");
                if !send(RecognitionEvent::Results(Candidates::new(candidates))) {
                    warn!("failed to send results - channel closed?");
                    return;
                }
            }
            Err(e) => {
                debug!(?e, %line, "unparseable recognizer line, skipping");
            }
        }
    }

    // Recognizer ended on its own; report it as a session error
    if current.load(Ordering::SeqCst) == session {
        let _ = send(RecognitionEvent::Error("recognizer exited".to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    fn test_config(command: &[&str]) -> RecognitionConfig {
        RecognitionConfig {
            language_model: "free_form".to_string(),
            locale: "en-US".to_string(),
            recognizer_command: command.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_listener_creation() {
        let (tx, _rx) = mpsc::channel(32);
        let listener = RecognitionListener::new(test_config(&["true"]), tx);
        assert!(!listener.is_running());
    }

    #[test]
    fn test_start_without_command() {
        let (tx, _rx) = mpsc::channel(32);
        let listener = RecognitionListener::new(test_config(&[]), tx);
        assert!(matches!(
            listener.start(1),
            Err(RecognitionError::NotConfigured)
        ));
        assert!(!listener.is_running());
    }

    #[test]
    fn test_stop_without_session_is_harmless() {
        let (tx, _rx) = mpsc::channel(32);
        let listener = RecognitionListener::new(test_config(&["true"]), tx);
        listener.stop();
        assert!(!listener.is_running());
    }

    #[test]
    fn test_double_start_is_rejected() {
        let (tx, _rx) = mpsc::channel(32);
        let listener = RecognitionListener::new(test_config(&["sleep", "5"]), tx);

        listener.start(1).unwrap();
        assert!(matches!(
            listener.start(2),
            Err(RecognitionError::AlreadyRunning)
        ));

        listener.stop();
    }

    #[test]
    fn test_restart_keeps_new_session_running() {
        let (tx, _rx) = mpsc::channel(256);
        let listener = RecognitionListener::new(test_config(&["sleep", "5"]), tx);

        // The previous session's reader thread wakes from the kill while
        // the next session is already up; its cleanup must not touch the
        // new session's stamp or child. Iterate to give the stale thread
        // every chance to lose the race.
        for round in 0..10u64 {
            let old = round * 2 + 1;
            let new = round * 2 + 2;

            listener.start(old).unwrap();
            listener.stop();
            listener.start(new).unwrap();

            thread::sleep(Duration::from_millis(30));
            assert!(
                listener.is_running(),
                "restarted session lost its running flag (round {})",
                round
            );

            listener.stop();
            assert!(!listener.is_running());
        }
    }

    #[tokio::test]
    async fn test_results_forwarded_from_recognizer_output() {
        let (tx, mut rx) = mpsc::channel(32);
        let listener =
            RecognitionListener::new(test_config(&["echo", r#"["please scan this"]"#]), tx);

        listener.start(7).unwrap();

        let ready = rx.recv().await.unwrap();
        assert_eq!(ready.session, 7);
        assert!(matches!(ready.event, RecognitionEvent::Ready));

        let results = rx.recv().await.unwrap();
        assert_eq!(results.session, 7);
        match results.event {
            RecognitionEvent::Results(candidates) => {
                assert!(candidates.contains_token("scan"));
            }
            other => panic!("expected results, got {:?}", other),
        }

        listener.stop();
    }
}
