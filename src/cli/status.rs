//! `broker-session status` command implementation.

use crate::cli::{connect, render_session};
use crate::config::Config;
use crate::error::Result;

/// Check the broker connection and print the refreshed session.
///
/// # Errors
///
/// Returns [`Error::ReauthRequired`](crate::Error::ReauthRequired) when the
/// credentials were rejected, or the transport/HTTP failure.
pub async fn run(config: &Config, config_id: Option<&str>, user_id: Option<&str>) -> Result<()> {
    let client = connect(config)?;
    match client.check_connection_status(config_id, user_id).await? {
        Some(session) => println!("{}", render_session(Some(&session))?),
        None => println!("No broker session to check. Connect a broker first."),
    }
    Ok(())
}
