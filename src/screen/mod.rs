//! Screen flow module
//!
//! Provides the two-screen flow controller:
//! - Landing: waiting for a tap
//! - Listening: recognition session active, outcome flags accumulating

mod controller;

pub use controller::{display_text, ControlEvent, OutcomeFlags, Screen, ScreenController};
