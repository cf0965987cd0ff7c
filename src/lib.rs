//! OIDC Agent - OpenID Connect authorization code flow client library
//!
//! This library signs a user in against a single OpenID Connect provider
//! using the authorization code flow with PKCE, optionally fetches their
//! userinfo claims, and performs RP-initiated logout.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `auth`: Discovery, authorization, token exchange, userinfo and the flow orchestrator
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//! - `commands`: Handlers behind each CLI subcommand
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use oidc_agent::{Config, FlowOrchestrator, LoopbackAuthorizer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_file("config/oidc.yaml")?;
//!     config.validate()?;
//!
//!     let loopback = Arc::new(LoopbackAuthorizer::new(config.flow.open_browser));
//!     let orchestrator = FlowOrchestrator::new(
//!         config.client_config()?,
//!         &config.http,
//!         loopback.clone(),
//!         loopback,
//!     )?;
//!     let context = orchestrator.authorize(config.flow.call_userinfo).await?;
//!     println!("{:?}", context.user());
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use auth::context::{AuthenticationContext, User};
pub use auth::loopback::LoopbackAuthorizer;
pub use auth::orchestrator::{FlowOrchestrator, FlowState, LogoutOutcome};
pub use config::{ClientConfig, Config};
pub use error::{OidcError, Result};
