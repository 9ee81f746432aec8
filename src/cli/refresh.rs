//! `broker-session refresh-token` command implementation.

use crate::cli::{connect, render_session};
use crate::config::Config;
use crate::error::Result;

/// Ask the backend to refresh broker tokens.
///
/// # Errors
///
/// Same as [`status::run`](crate::cli::status::run).
pub async fn run(config: &Config, config_id: Option<&str>) -> Result<()> {
    let client = connect(config)?;
    match client.refresh_tokens(config_id).await? {
        Some(session) => println!("{}", render_session(Some(&session))?),
        None => println!("No broker config to refresh."),
    }
    Ok(())
}
