//! Recognition module for the speech session boundary
//!
//! Wraps an external recognizer process behind a start/stop session
//! interface and forwards its transcript candidates as events tagged
//! with a session generation.

mod session;
mod transcript;

pub use session::{
    ListenerEvent, RecognitionConfig, RecognitionControl, RecognitionError, RecognitionEvent,
    RecognitionListener,
};
pub use transcript::Candidates;
