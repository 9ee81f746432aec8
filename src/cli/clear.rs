//! `broker-session clear` command implementation.

use crate::cli::open_store;
use crate::config::Config;
use crate::error::Result;

/// Remove the local session without telling the backend.
///
/// # Errors
///
/// Returns an error if storage cannot be written.
pub fn run(config: &Config) -> Result<()> {
    open_store(config)?.clear()?;
    println!("Local broker session cleared.");
    Ok(())
}
