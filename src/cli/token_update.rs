//! `broker-session token-update` command implementation.

use crate::cli::connect;
use crate::client::TokenUpdate;
use crate::config::Config;
use crate::error::Result;

/// Push an access token obtained outside the OAuth popup.
///
/// # Errors
///
/// Returns an error if the token is empty or the backend keeps failing.
pub async fn run(config: &Config, update: &TokenUpdate) -> Result<()> {
    let client = connect(config)?;
    let body = client.update_token(update).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
