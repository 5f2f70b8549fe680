//! Command-line interface for medley.
//!
//! Scans the local library, lists albums, searches every enabled service
//! and switches services on and off.

mod commands;

pub use commands::{Cli, Commands, run_command};
