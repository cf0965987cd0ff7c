//! Discovery document inspection

use anyhow::Result;

use crate::auth::discovery::{DiscoveryClient, DiscoveryDocument};
use crate::auth::http::build_client;
use crate::config::Config;

/// Fetches the configured discovery document and prints its endpoints.
///
/// # Errors
///
/// Returns an error if the configuration is incomplete or discovery fails.
pub async fn run_discover(config: &Config) -> Result<()> {
    let client_config = config.client_config()?;
    let discovery = DiscoveryClient::new(build_client(&config.http)?);
    let document = discovery
        .fetch(client_config.discovery_uri().as_str())
        .await?;

    print!("{}", render_endpoints(&document));
    Ok(())
}

/// Formats the endpoints the flow relies on, one per line.
pub fn render_endpoints(document: &DiscoveryDocument) -> String {
    let rows = [
        ("issuer", document.issuer().map(str::to_string)),
        (
            "authorization_endpoint",
            document.authorization_endpoint().map(|u| u.to_string()),
        ),
        (
            "token_endpoint",
            document.token_endpoint().map(|u| u.to_string()),
        ),
        (
            "userinfo_endpoint",
            document.userinfo_endpoint().map(|u| u.to_string()),
        ),
        (
            "end_session_endpoint",
            document.end_session_endpoint().map(|u| u.to_string()),
        ),
    ];

    rows.iter()
        .map(|(name, value)| {
            format!(
                "{:<24} {}\n",
                name,
                value.as_deref().unwrap_or("(not published)")
            )
        })
        .collect()
}
