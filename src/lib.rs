//! broker-session - broker session normalization and synchronization.
//!
//! Reconciles the many shapes a broker backend reports a session in, keeps one
//! persisted session (plus a legacy mirror) in sync with it, and tracks when
//! the user has to log in to the broker again.

pub mod cli;
pub mod client;
pub mod config;
pub mod core;
pub mod error;
pub mod hooks;
pub mod storage;

pub use config::Config;
pub use error::{Error, Result};
