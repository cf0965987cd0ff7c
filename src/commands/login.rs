//! Login command handler
//!
//! Runs the full flow with the loopback collaborator, prints the signed-in
//! user and, when asked, logs straight back out.

use std::sync::Arc;

use anyhow::Result;

use crate::auth::context::AuthenticationContext;
use crate::auth::loopback::LoopbackAuthorizer;
use crate::auth::orchestrator::{FlowOrchestrator, LogoutOutcome};
use crate::config::Config;

/// Options for [`run_login`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LoginOptions {
    /// Fetch userinfo after the token exchange
    pub userinfo: bool,
    /// Perform RP-initiated logout after printing the result
    pub logout: bool,
    /// Try to launch the system browser
    pub open_browser: bool,
}

/// Signs the user in and prints a summary of the resulting context.
///
/// # Errors
///
/// Returns an error if the configuration is incomplete or the flow fails.
pub async fn run_login(config: &Config, options: LoginOptions) -> Result<()> {
    let loopback = Arc::new(LoopbackAuthorizer::new(options.open_browser));
    let orchestrator = FlowOrchestrator::new(
        config.client_config()?,
        &config.http,
        loopback.clone(),
        loopback,
    )?;

    let mut context = orchestrator.authorize(options.userinfo).await?;
    print!("{}", render_summary(&context));

    if options.logout {
        match orchestrator.logout(&mut context).await? {
            LogoutOutcome::Dispatched(url) => println!("Logged out via {}", url),
            LogoutOutcome::Skipped => {
                println!("Provider has no end_session_endpoint; logout skipped")
            }
        }
    }

    Ok(())
}

/// Human-readable summary of a completed flow.
pub fn render_summary(context: &AuthenticationContext) -> String {
    let mut out = String::new();

    match context.user() {
        Some(user) => {
            out.push_str(&format!("Signed in as {}\n", user.username));
            for (name, value) in &user.attributes {
                let rendered = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                out.push_str(&format!("  {}: {}\n", name, rendered));
            }
        }
        None => out.push_str("Signed in (no ID token issued)\n"),
    }

    if let Some(token) = context.token() {
        out.push_str(&format!("Token type: {}\n", token.token_type));
        match token.expires_at() {
            Some(expires_at) => out.push_str(&format!(
                "Access token expires: {}\n",
                expires_at.to_rfc3339()
            )),
            None => out.push_str("Access token expires: never\n"),
        }
        if token.refresh_token.is_some() {
            out.push_str("Refresh token: issued\n");
        }
    }

    if context.user_info().is_some() {
        out.push_str("Userinfo: fetched\n");
    }

    out
}
