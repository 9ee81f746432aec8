//! `broker-session callback` command implementation.

use crate::cli::{connect, render_session};
use crate::client::CallbackParams;
use crate::config::Config;
use crate::error::Result;

/// Complete a login from the redirect URL the broker sent the browser to.
///
/// # Errors
///
/// Returns [`Error::OAuth`](crate::Error::OAuth) for a failed or malformed
/// redirect, or the session exchange failure.
pub async fn run(config: &Config, redirect_url: &str, config_id: Option<&str>) -> Result<()> {
    let params = CallbackParams::parse(redirect_url)?;
    let client = connect(config)?;
    let session = client.handle_oauth_callback(&params, config_id).await?;
    println!("{}", render_session(Some(&session))?);
    Ok(())
}
