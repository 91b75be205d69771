//! peerchat CLI Library
//!
//! Subcommands for the `peerchat` binary. User-facing output uses `writeln!`
//! to stdout; diagnostics go through tracing to stderr.

pub mod demo_cmd;
pub mod fmt;
pub mod history_cmd;
pub mod key_cmd;
pub mod peers_cmd;
