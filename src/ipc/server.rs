//! Unix domain socket server for IPC
//!
//! Serves status queries, forwards navigation requests (tap/back) to
//! the screen flow controller, and streams session events to
//! subscribed clients. A Subscribe request upgrades the connection to
//! a push stream of Notification messages.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};

use crate::events::SessionEvent;
use crate::screen::{display_text, ControlEvent, OutcomeFlags, Screen};

use super::protocol::{DaemonStatus, Notification, Request, Response};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    state: Arc<RwLock<ServerState>>,
    shutdown_tx: broadcast::Sender<()>,
    /// Channel for forwarding navigation requests to the controller
    control_tx: mpsc::Sender<ControlEvent>,
    /// Session event channel, subscribed per client on request
    event_tx: broadcast::Sender<SessionEvent>,
}

/// Shared server state
struct ServerState {
    status: DaemonStatus,
    start_time: std::time::Instant,
}

impl Server {
    /// Create a new IPC server
    pub fn new(
        socket_path: &Path,
        control_tx: mpsc::Sender<ControlEvent>,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let state = Arc::new(RwLock::new(ServerState {
            status: DaemonStatus::default(),
            start_time: std::time::Instant::now(),
        }));

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            state,
            shutdown_tx,
            control_tx,
            event_tx,
        })
    }

    /// Update the server's view of the screen flow state
    pub async fn set_view(&self, screen: Screen, flags: OutcomeFlags, session: u64) {
        let mut server_state = self.state.write().await;
        let old_screen = server_state.status.screen;
        server_state.status.screen = screen.into();
        server_state.status.heard_phrase = flags.heard_phrase;
        server_state.status.photo_taken = flags.photo_taken;
        server_state.status.display_text = display_text(screen, flags).to_string();
        server_state.status.session = session;

        if old_screen != server_state.status.screen {
            info!(
                from = ?old_screen,
                to = ?server_state.status.screen,
                "IPC server: screen updated"
            );
        }
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let state = Arc::clone(&self.state);
                    let control_tx = self.control_tx.clone();
                    let event_tx = self.event_tx.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, state, control_tx, event_tx) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(
        mut stream: UnixStream,
        state: Arc<RwLock<ServerState>>,
        control_tx: mpsc::Sender<ControlEvent>,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Result<()> {
        let mut len_buf = [0u8; 4];

        loop {
            // Read message length (4-byte little-endian)
            match stream.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("client disconnected");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > 1024 * 1024 {
                warn!(len, "message too large, disconnecting");
                return Ok(());
            }

            // Read message body
            let mut msg_buf = vec![0u8; len];
            stream.read_exact(&mut msg_buf).await?;

            // Parse request
            let request: Request =
                serde_json::from_slice(&msg_buf).context("failed to parse request")?;

            debug!(?request, "received request");

            // Process request
            let (response, subscribe) = Self::process_request(request, &state, &control_tx).await;

            // Send response
            Self::send_message(&mut stream, &response).await?;

            // Subscribe upgrades the connection to a push stream
            if subscribe {
                debug!("client subscribed to notifications");
                return Self::push_notifications(stream, event_tx.subscribe()).await;
            }
        }
    }

    /// Stream session events to a subscribed client until it
    /// disconnects or the event channel closes
    async fn push_notifications(
        mut stream: UnixStream,
        mut event_rx: broadcast::Receiver<SessionEvent>,
    ) -> Result<()> {
        loop {
            match event_rx.recv().await {
                Ok(event) => {
                    let notification = Notification::SessionEvent(event);
                    Self::send_message(&mut stream, &notification).await?;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "notification receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("event channel closed, ending subscription");
                    return Ok(());
                }
            }
        }
    }

    /// Send a length-prefixed JSON message
    async fn send_message<T: serde::Serialize>(stream: &mut UnixStream, msg: &T) -> Result<()> {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = (msg_bytes.len() as u32).to_le_bytes();

        stream.write_all(&msg_len).await?;
        stream.write_all(&msg_bytes).await?;

        Ok(())
    }

    /// Process a request and return a response
    /// Returns (Response, should_subscribe)
    async fn process_request(
        request: Request,
        state: &Arc<RwLock<ServerState>>,
        control_tx: &mpsc::Sender<ControlEvent>,
    ) -> (Response, bool) {
        match request {
            Request::Ping => (Response::Pong, false),

            Request::GetStatus => {
                let mut state = state.write().await;
                state.status.uptime_secs = state.start_time.elapsed().as_secs();
                (Response::Status(state.status.clone()), false)
            }

            Request::Tap => (Self::forward(control_tx, ControlEvent::Tap).await, false),

            Request::Back => (Self::forward(control_tx, ControlEvent::Back).await, false),

            Request::Subscribe => (Response::Subscribed, true),
        }
    }

    /// Forward a navigation event to the controller
    async fn forward(control_tx: &mpsc::Sender<ControlEvent>, event: ControlEvent) -> Response {
        debug!(?event, "forwarding navigation request");
        match control_tx.send(event).await {
            Ok(()) => Response::Accepted,
            Err(e) => {
                error!(?e, "controller channel closed");
                Response::Error {
                    code: "controller_unavailable".to_string(),
                    message: "screen flow controller is not running".to_string(),
                }
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tap_is_forwarded_to_controller() {
        let (control_tx, mut control_rx) = mpsc::channel(4);
        let state = Arc::new(RwLock::new(ServerState {
            status: DaemonStatus::default(),
            start_time: std::time::Instant::now(),
        }));

        let (response, subscribe) =
            Server::process_request(Request::Tap, &state, &control_tx).await;

        assert!(matches!(response, Response::Accepted));
        assert!(!subscribe);
        assert!(matches!(control_rx.recv().await, Some(ControlEvent::Tap)));
    }

    #[tokio::test]
    async fn test_status_reflects_view() {
        let (control_tx, _control_rx) = mpsc::channel(4);
        let state = Arc::new(RwLock::new(ServerState {
            status: DaemonStatus::default(),
            start_time: std::time::Instant::now(),
        }));

        {
            let mut s = state.write().await;
            let flags = OutcomeFlags {
                heard_phrase: true,
                photo_taken: true,
            };
            s.status.screen = Screen::Listening.into();
            s.status.heard_phrase = flags.heard_phrase;
            s.status.photo_taken = flags.photo_taken;
            s.status.display_text = display_text(Screen::Listening, flags).to_string();
        }

        let (response, _) = Server::process_request(Request::GetStatus, &state, &control_tx).await;

        match response {
            Response::Status(status) => {
                assert!(status.heard_phrase);
                assert!(status.photo_taken);
                assert_eq!(
                    status.display_text,
                    "Success! Heard 'scan' and took the photo!"
                );
            }
            other => panic!("expected status, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_subscribe_upgrades_to_push() {
        let (control_tx, _control_rx) = mpsc::channel(4);
        let state = Arc::new(RwLock::new(ServerState {
            status: DaemonStatus::default(),
            start_time: std::time::Instant::now(),
        }));

        let (_, subscribe) =
            Server::process_request(Request::Subscribe, &state, &control_tx).await;
        assert!(subscribe);
    }

    #[tokio::test]
    async fn test_session_events_are_pushed_to_subscriber() {
        let (event_tx, event_rx) = broadcast::channel(16);
        let (server_end, mut client_end) = UnixStream::pair().unwrap();

        let push = tokio::spawn(Server::push_notifications(server_end, event_rx));

        event_tx
            .send(SessionEvent::PhraseHeard {
                session: 1,
                photo_taken: true,
            })
            .unwrap();

        let mut len_buf = [0u8; 4];
        client_end.read_exact(&mut len_buf).await.unwrap();
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut msg_buf = vec![0u8; len];
        client_end.read_exact(&mut msg_buf).await.unwrap();

        let notification: Notification = serde_json::from_slice(&msg_buf).unwrap();
        let Notification::SessionEvent(event) = notification;
        assert!(matches!(
            event,
            SessionEvent::PhraseHeard {
                session: 1,
                photo_taken: true
            }
        ));

        drop(event_tx);
        push.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_closed_controller_yields_error() {
        let (control_tx, control_rx) = mpsc::channel(4);
        drop(control_rx);
        let state = Arc::new(RwLock::new(ServerState {
            status: DaemonStatus::default(),
            start_time: std::time::Instant::now(),
        }));

        let (response, _) = Server::process_request(Request::Back, &state, &control_tx).await;
        assert!(matches!(response, Response::Error { .. }));
    }
}
