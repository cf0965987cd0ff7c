//! Shared HTTP client construction
//!
//! Discovery and token exchange share one client. Userinfo gets its own
//! client that never follows redirects, so a bearer token is only ever sent
//! to the endpoint advertised by the provider.

use std::time::Duration;

use crate::config::HttpConfig;
use crate::error::{OidcError, Result};

/// Builds the default client used for discovery and token requests.
///
/// # Errors
///
/// Returns [`OidcError::Configuration`] if the TLS backend cannot be
/// initialised.
pub fn build_client(config: &HttpConfig) -> Result<reqwest::Client> {
    builder(config)
        .build()
        .map_err(|e| OidcError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// Builds a client with redirect following disabled.
pub fn build_no_redirect_client(config: &HttpConfig) -> Result<reqwest::Client> {
    builder(config)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| OidcError::Configuration(format!("failed to build HTTP client: {e}")))
}

fn builder(config: &HttpConfig) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .user_agent(config.user_agent.clone())
}
