//! `broker-session disconnect` command implementation.

use crate::cli::connect;
use crate::config::Config;
use crate::error::Result;

/// Disconnect the broker and clear the local session.
///
/// # Errors
///
/// Returns an error if the backend refuses or cannot be reached.
pub async fn run(config: &Config, config_id: Option<&str>) -> Result<()> {
    let client = connect(config)?;
    if client.disconnect_broker(config_id).await? {
        println!("Broker disconnected.");
    } else {
        println!("No broker config to disconnect.");
    }
    Ok(())
}
