//! `broker-session show` command implementation.

use crate::cli::{open_store, render_session};
use crate::config::Config;
use crate::error::Result;

/// Print the stored session without contacting the backend.
///
/// # Errors
///
/// Returns an error if the store cannot be opened.
pub fn run(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    println!("{}", render_session(store.load().as_ref())?);
    Ok(())
}
