//! session-relay: inspect and manage the stored session from the command line.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use session_relay::clock::{Clock, SystemClock};
use session_relay::config::{load_config, RelayConfig};
use session_relay::observability::logging::init_logging;
use session_relay::session::{CredentialBundle, FileStore, HttpRefreshClient, SessionGuard};

#[derive(Parser)]
#[command(name = "session-relay")]
#[command(about = "Manage the assistant's stored session", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the stored credential and breaker state
    Status,
    /// Check the stored credential, refreshing it if it is about to expire
    Ensure,
    /// Refresh the stored credential now
    Refresh,
    /// Store credentials obtained at login
    Login {
        #[arg(long)]
        access_token: String,
        #[arg(long)]
        refresh_token: String,
        /// Seconds until the access token expires
        #[arg(long, default_value_t = 3600)]
        expires_in: u64,
        #[arg(long)]
        subject: Option<String>,
    },
    /// Remove the stored credential
    Logout,
    /// Validate the configuration and print it
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };
    init_logging(&config.observability);

    tracing::debug!(
        store = %config.store.path,
        refresh_url = %config.refresh.url,
        buffer_secs = config.session.buffer_secs,
        "Configuration loaded"
    );

    let store = Arc::new(FileStore::new(&config.store.path));
    let client = Arc::new(HttpRefreshClient::new(&config.refresh)?);
    let guard = SessionGuard::new(store, client, config.session.clone());
    let now = SystemClock.now_secs();

    match cli.command {
        Commands::Status => {
            match guard.current().await {
                Ok(bundle) => print_bundle(&bundle, now),
                Err(e) => println!("no usable session: {}", e),
            }
            let breaker = guard.breaker_state();
            println!("breaker: {}", serde_json::to_string(&breaker)?);
        }
        Commands::Ensure => {
            let bundle = guard.ensure_valid().await?;
            print_bundle(&bundle, now);
        }
        Commands::Refresh => {
            let bundle = guard.force_refresh().await?;
            print_bundle(&bundle, SystemClock.now_secs());
        }
        Commands::Login {
            access_token,
            refresh_token,
            expires_in,
            subject,
        } => {
            let bundle = login_bundle(access_token, refresh_token, now, expires_in, subject);
            guard.store_credentials(bundle).await?;
            println!("credentials stored");
        }
        Commands::Logout => {
            guard.clear().await?;
            println!("session cleared");
        }
        Commands::CheckConfig => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn login_bundle(
    access_token: String,
    refresh_token: String,
    now: u64,
    expires_in: u64,
    subject: Option<String>,
) -> CredentialBundle {
    let bundle = CredentialBundle::new(access_token, refresh_token, now.saturating_add(expires_in));
    match subject {
        Some(subject) => bundle.with_subject(subject),
        None => bundle,
    }
}

fn print_bundle(bundle: &CredentialBundle, now: u64) {
    println!("subject:    {}", bundle.subject_id.as_deref().unwrap_or("-"));
    println!("token type: {}", bundle.token_type);
    println!("expires at: {} ({}s remaining)", bundle.expires_at, bundle.remaining_secs(now));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_bundle_expiry_saturates() {
        let bundle = login_bundle("at".into(), "rt".into(), 1_700_000_000, u64::MAX, None);
        assert_eq!(bundle.expires_at, u64::MAX);

        let bundle = login_bundle("at".into(), "rt".into(), 100, 3_600, Some("user-1".into()));
        assert_eq!(bundle.expires_at, 3_700);
        assert_eq!(bundle.subject_id.as_deref(), Some("user-1"));
    }
}
