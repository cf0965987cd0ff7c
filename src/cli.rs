//! Command-line interface definition for the OIDC agent
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for logging in through the authorization code flow
//! and inspecting the provider's discovery document.

use clap::{Parser, Subcommand};

/// OIDC agent - OpenID Connect authorization code flow client
///
/// Signs a user in against a single identity provider, optionally fetches
/// their userinfo claims, and can perform RP-initiated logout.
#[derive(Parser, Debug, Clone)]
#[command(name = "oidc-agent")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config/oidc.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Override the configured client id
    #[arg(long, global = true)]
    pub client_id: Option<String>,

    /// Override the configured authorization scope
    #[arg(long, global = true)]
    pub scope: Option<String>,

    /// Override the configured redirect URI
    #[arg(long, global = true)]
    pub redirect_uri: Option<String>,

    /// Override the configured discovery URI
    #[arg(long, global = true)]
    pub discovery_uri: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the authorization code flow and print the signed-in user
    Login {
        /// Fetch userinfo claims after the token exchange
        #[arg(short, long)]
        userinfo: bool,

        /// Perform RP-initiated logout once the login completes
        #[arg(long)]
        logout: bool,

        /// Print the authorization URL without opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Fetch the discovery document and print the provider endpoints
    Discover,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
