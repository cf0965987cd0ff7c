//! OIDC Agent - OpenID Connect authorization code flow client
//!
#![doc = "OIDC Agent - OpenID Connect authorization code flow client"]
#![doc = "Main entry point for the oidc-agent application."]

use anyhow::Result;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use oidc_agent::cli::{Cli, Commands};
use oidc_agent::commands;
use oidc_agent::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/oidc.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Login {
            userinfo,
            logout,
            no_browser,
        } => {
            tracing::info!("Starting authorization code flow");
            let options = commands::login::LoginOptions {
                userinfo: userinfo || config.flow.call_userinfo,
                logout,
                open_browser: config.flow.open_browser && !no_browser,
            };
            commands::login::run_login(&config, options).await?;
            Ok(())
        }
        Commands::Discover => {
            tracing::info!("Fetching discovery document");
            commands::discover::run_discover(&config).await?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr so stdout carries only command output.
fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose {
        "oidc_agent=debug"
    } else {
        "oidc_agent=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
