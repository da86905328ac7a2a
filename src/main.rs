//! voicesnap-daemon: Background daemon for a voice-triggered camera flow
//!
//! The daemon models a two-screen flow and provides:
//! - A screen flow controller (Landing/Listening) with monotonic
//!   outcome flags for phrase match and capture submission
//! - A recognition session scoped to the Listening screen, fed by an
//!   external recognizer process
//! - A fire-and-forget capture trigger
//! - An IPC server for navigation requests and status queries
//!
//! All state mutation happens on the controller's event loop; the
//! recognition session and IPC clients only send events into it.

mod capture;
mod config;
mod events;
mod ipc;
mod lifecycle;
mod recognition;
mod screen;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::capture::CommandCaptureService;
use crate::config::Config;
use crate::events::SessionEvent;
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::recognition::{RecognitionControl, RecognitionListener};
use crate::screen::{ControlEvent, OutcomeFlags, Screen, ScreenController};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "voicesnap-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, phrase = %config.phrase, "configuration loaded");

    if config.recognizer_command.is_empty() {
        warn!("no recognizer command configured - Listening sessions will report unavailable");
    }
    if config.capture_command.is_empty() {
        warn!("no capture command configured - capture requests will report unavailable");
    }

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    // Create channels for inter-component communication
    // IPC server and recognition session -> controller
    let (control_tx, control_rx) = mpsc::channel(32);
    // Recognition session -> forwarder
    let (listener_tx, mut listener_rx) = mpsc::channel(32);
    // Controller -> IPC server mirror (and any subscriber)
    let (event_tx, _event_rx) = broadcast::channel::<SessionEvent>(64);

    // Create the recognition session handle
    let recognition = Arc::new(RecognitionListener::new(config.recognition(), listener_tx));

    // Create the capture trigger
    let capture = Arc::new(CommandCaptureService::new(config.capture_command.clone()));

    // Create the screen flow controller
    let mut controller = ScreenController::new(
        config.phrase.clone(),
        Arc::clone(&recognition) as Arc<dyn RecognitionControl>,
        capture,
        event_tx.clone(),
    );

    // Create IPC server forwarding navigation requests to the controller
    let server = Server::new(&config.socket_path, control_tx.clone(), event_tx.clone())?;

    // Subscribe to session events for the IPC status mirror
    let mut ipc_event_rx = event_tx.subscribe();
    let server_for_events = &server;

    // Forward recognition events onto the controller's event loop
    let recognition_control_tx = control_tx.clone();

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the controller (processes taps and recognition events)
        _ = controller.run(control_rx) => {
            info!("screen flow controller exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Marshal recognition callbacks onto the controller loop
        _ = async {
            while let Some(event) = listener_rx.recv().await {
                if recognition_control_tx
                    .send(ControlEvent::Recognition(event))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        } => {
            info!("recognition event forwarder exited");
        }

        // Keep the IPC status mirror in sync with session events
        _ = async {
            let mut mirror_screen = Screen::Landing;
            let mut mirror_flags = OutcomeFlags::default();
            let mut mirror_session = 0u64;

            loop {
                match ipc_event_rx.recv().await {
                    Ok(event) => {
                        info!(%event, "session event received");
                        match &event {
                            SessionEvent::ListeningEntered { session } => {
                                mirror_screen = Screen::Listening;
                                mirror_flags = OutcomeFlags::default();
                                mirror_session = *session;
                            }
                            SessionEvent::ListeningExited { .. } => {
                                mirror_screen = Screen::Landing;
                            }
                            SessionEvent::PhraseHeard { photo_taken, .. } => {
                                mirror_flags.heard_phrase = true;
                                mirror_flags.photo_taken = *photo_taken;
                            }
                            SessionEvent::CaptureRequested { .. }
                            | SessionEvent::RecognitionUnavailable { .. }
                            | SessionEvent::CaptureUnavailable { .. } => {
                                // Observable only; flags arrive in PhraseHeard
                                continue;
                            }
                        }
                        server_for_events
                            .set_view(mirror_screen, mirror_flags, mirror_session)
                            .await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "session event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("session event handler exited");
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    recognition.stop();
    server.shutdown().await;

    info!("voicesnap-daemon stopped");

    Ok(())
}
