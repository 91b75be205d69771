//! peerchat Core Library
//!
//! Shared functionality for peerchat components:
//! - Configuration resolution and validation
//! - `SQLite` pool helpers
//! - Tracing initialisation
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod tracing_init;

pub use config::{ChatOptions, Config};
pub use error::{Error, Result};
