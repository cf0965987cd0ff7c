//! Command handlers for the CLI
//!
//! - `login`    -- Run the authorization code flow, optionally fetch
//!   userinfo and log out again
//! - `discover` -- Print the provider's discovery document endpoints
//!
//! Handlers are small and delegate to [`crate::auth`].

pub mod discover;
pub mod login;
