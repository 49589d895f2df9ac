//! Comms subsystem: external I/O channels.
//!
//! The console channel is the only one; it talks to the consulting agent
//! directly and runs until the shutdown token is cancelled or stdin closes.

pub mod pty;

pub use pty::{PtyChannel, run_pty};
