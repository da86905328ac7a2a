//! Lifecycle module for daemon shutdown handling

mod shutdown;

pub use shutdown::ShutdownSignal;
