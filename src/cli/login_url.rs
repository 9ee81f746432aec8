//! `broker-session login-url` command implementation.

use crate::client::login_url;
use crate::config::Config;
use crate::error::Result;

/// Print the broker login URL for `config_id`.
///
/// # Errors
///
/// Returns an error if the API key is unset or the login URL is invalid.
pub fn run(config: &Config, config_id: &str) -> Result<()> {
    let url = login_url(&config.broker.login_url, &config.broker.api_key, config_id)?;
    println!("{url}");
    Ok(())
}
