//! `broker-session mark-reauth` command implementation.

use crate::cli::{open_store, render_session};
use crate::config::Config;
use crate::error::Result;

/// Flag the stored session as needing reauthentication.
///
/// # Errors
///
/// Returns an error if storage cannot be written.
pub fn run(config: &Config) -> Result<()> {
    match open_store(config)?.mark_needs_reauth()? {
        Some(session) => println!("{}", render_session(Some(&session))?),
        None => println!("No broker session to mark."),
    }
    Ok(())
}
