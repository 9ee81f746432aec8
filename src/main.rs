//! broker-session CLI - broker session status and reauthentication tracking.

use broker_session::client::TokenUpdate;
use broker_session::{Config, Result, cli, config};
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit code for credentials the broker no longer accepts.
const EXIT_REAUTH: u8 = 2;

/// Get the version string.
///
/// - Release builds (on a git tag): "0.1.2"
/// - Development builds: "0.1.2-dev (abc1234)"
/// - Dirty working directory: "0.1.2-dev (abc1234-dirty)"
fn version() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("BROKER_SESSION_GIT_HASH");
    const IS_RELEASE: &str = env!("BROKER_SESSION_IS_RELEASE");

    static VERSION_STRING: std::sync::OnceLock<String> = std::sync::OnceLock::new();

    VERSION_STRING.get_or_init(|| {
        if IS_RELEASE == "true" {
            VERSION.to_string()
        } else {
            format!("{VERSION}-dev ({GIT_HASH})")
        }
    })
}

#[derive(Parser)]
#[command(name = "broker-session")]
#[command(author, version = version(), about = "Broker session status and reauthentication", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// [Backend] Check the broker connection and update the stored session.
    Status {
        /// Broker config ID. Defaults to the stored session's.
        #[arg(long)]
        config_id: Option<String>,

        /// Broker user ID. Defaults to the stored session's.
        #[arg(long)]
        user_id: Option<String>,
    },

    /// [Backend] Refresh broker tokens.
    RefreshToken {
        /// Broker config ID. Defaults to the stored session's.
        #[arg(long)]
        config_id: Option<String>,
    },

    /// [Backend] Disconnect the broker and clear the local session.
    Disconnect {
        /// Broker config ID. Defaults to the stored session's.
        #[arg(long)]
        config_id: Option<String>,
    },

    /// [Backend] Complete a login from the broker's redirect URL.
    Callback {
        /// Full redirect URL, including its query string.
        redirect_url: String,

        /// Config ID to use when the redirect carries no state.
        #[arg(long)]
        config_id: Option<String>,
    },

    /// [Backend] Push an access token obtained outside the login popup.
    TokenUpdate {
        /// Broker user ID.
        #[arg(long)]
        user_id: String,

        /// Access token.
        #[arg(long)]
        access_token: String,

        /// Token lifetime in seconds.
        #[arg(long)]
        expires_in: Option<u64>,

        /// Token expiry timestamp (RFC 3339).
        #[arg(long)]
        expires_at: Option<String>,

        /// Who obtained the token.
        #[arg(long, default_value = "automation")]
        source: String,
    },

    /// [Local] Print the broker login URL for a config.
    LoginUrl {
        /// Broker config ID.
        #[arg(long)]
        config_id: String,
    },

    /// [Local] Show the stored session.
    Show,

    /// [Local] Remove the stored session.
    Clear,

    /// [Local] Flag the stored session as needing reauthentication.
    MarkReauth,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let result = match config::load_config() {
        Ok(config) => run(cli.command, &config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_reauth() => {
            eprintln!("broker-session: {e}");
            eprintln!("Run `broker-session login-url` and complete the broker login again.");
            ExitCode::from(EXIT_REAUTH)
        }
        Err(e) => {
            eprintln!("broker-session: error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Status { config_id, user_id } => {
            cli::status::run(config, config_id.as_deref(), user_id.as_deref()).await
        }
        Commands::RefreshToken { config_id } => {
            cli::refresh::run(config, config_id.as_deref()).await
        }
        Commands::Disconnect { config_id } => {
            cli::disconnect::run(config, config_id.as_deref()).await
        }
        Commands::Callback {
            redirect_url,
            config_id,
        } => cli::callback::run(config, &redirect_url, config_id.as_deref()).await,
        Commands::TokenUpdate {
            user_id,
            access_token,
            expires_in,
            expires_at,
            source,
        } => {
            let update = TokenUpdate {
                expires_in,
                expires_at,
                source,
                ..TokenUpdate::new(user_id, access_token)
            };
            cli::token_update::run(config, &update).await
        }
        Commands::LoginUrl { config_id } => cli::login_url::run(config, &config_id),
        Commands::Show => cli::show::run(config),
        Commands::Clear => cli::clear::run(config),
        Commands::MarkReauth => cli::mark_reauth::run(config),
    }
}

/// Log to stderr so stdout carries only command output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
