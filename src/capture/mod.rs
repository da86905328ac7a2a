//! Capture module for the camera trigger boundary
//!
//! Issues fire-and-forget capture requests. The only contract is
//! "request submitted"; no result is awaited or interpreted.

use std::process::{Command, Stdio};

use tracing::{debug, info};

/// Errors that can occur when issuing a capture request
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("no capture command configured")]
    NotConfigured,

    #[error("failed to launch capture command: {0}")]
    Launch(String),
}

/// Service that submits image capture requests to the camera subsystem.
///
/// Implementations are fire-and-forget: a successful return means the
/// request was submitted, not that a photo was taken.
pub trait CaptureService: Send + Sync {
    /// Submit one capture request and return immediately
    fn request_capture(&self) -> Result<(), CaptureError>;
}

/// Capture service that launches a configured external camera command
pub struct CommandCaptureService {
    command: Vec<String>,
}

impl CommandCaptureService {
    /// Create a new service from a command and its arguments
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl CaptureService for CommandCaptureService {
    fn request_capture(&self) -> Result<(), CaptureError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or(CaptureError::NotConfigured)?;

        debug!(%program, "submitting capture request");

        // Detached child; the result-handling hook is out of scope
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CaptureError::Launch(e.to_string()))?;

        info!("capture request submitted");
        Ok(())
    }
}

/// Mock capture service for tests.
///
/// Counts invocations and can be told to fail every request.
#[cfg(test)]
pub struct MockCaptureService {
    calls: std::sync::atomic::AtomicUsize,
    fail: bool,
}

#[cfg(test)]
impl MockCaptureService {
    /// Create a mock that accepts every request
    pub fn new() -> Self {
        Self {
            calls: std::sync::atomic::AtomicUsize::new(0),
            fail: false,
        }
    }

    /// Create a mock that rejects every request
    pub fn failing() -> Self {
        Self {
            calls: std::sync::atomic::AtomicUsize::new(0),
            fail: true,
        }
    }

    /// Number of capture requests received so far
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl CaptureService for MockCaptureService {
    fn request_capture(&self) -> Result<(), CaptureError> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail {
            Err(CaptureError::Launch("mock capture failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_without_command() {
        let service = CommandCaptureService::new(Vec::new());
        assert!(matches!(
            service.request_capture(),
            Err(CaptureError::NotConfigured)
        ));
    }

    #[test]
    fn test_capture_with_missing_program() {
        let service =
            CommandCaptureService::new(vec!["/nonexistent/camera-binary".to_string()]);
        assert!(matches!(
            service.request_capture(),
            Err(CaptureError::Launch(_))
        ));
    }

    #[test]
    fn test_capture_spawns_configured_command() {
        let service = CommandCaptureService::new(vec!["true".to_string()]);
        assert!(service.request_capture().is_ok());
    }

    #[test]
    fn test_mock_counts_calls() {
        let mock = MockCaptureService::new();
        assert_eq!(mock.calls(), 0);
        mock.request_capture().unwrap();
        mock.request_capture().unwrap();
        assert_eq!(mock.calls(), 2);
    }

    #[test]
    fn test_failing_mock_still_counts() {
        let mock = MockCaptureService::failing();
        assert!(mock.request_capture().is_err());
        assert_eq!(mock.calls(), 1);
    }
}
