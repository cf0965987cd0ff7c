//! Error types for the OIDC agent
//!
//! This module defines the error taxonomy shared by every step of the
//! authorization code flow, using `thiserror` for ergonomic error handling.
//!
//! Every flow step funnels its failure into a single [`OidcError`] value so
//! callers see one typed failure channel per `authorize` invocation.

use thiserror::Error;

/// Main error type for OIDC agent operations
///
/// The four primary variants mirror where a failure originated: the local
/// configuration, the caller (misuse or missing prerequisite state), the
/// identity provider, or the user-agent collaborator during authorization.
#[derive(Error, Debug)]
pub enum OidcError {
    /// Invalid or missing client configuration. Raised before any flow starts.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Local misuse: malformed URI, missing prerequisite state, etc.
    #[error("Client error: {0}")]
    Client(String),

    /// Non-success response, transport failure, or unparsable provider payload.
    #[error("Server error{}: {message}", fmt_status(.status))]
    Server {
        /// HTTP status returned by the provider, when one was received
        status: Option<u16>,
        /// Description of the failure
        message: String,
    },

    /// The user denied consent or the user-agent collaborator reported failure
    #[error("Authorization error: {0}")]
    Authorization(String),
}

impl OidcError {
    /// Builds a [`OidcError::Server`] carrying an HTTP status.
    pub fn server_status(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Builds a [`OidcError::Server`] for transport or parse failures where no
    /// status was received.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            status: None,
            message: message.into(),
        }
    }

    /// Returns the HTTP status carried by a server error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether the core would retry this failure.
    ///
    /// Always `false`: the flow never retries, retry policy belongs to the
    /// caller.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

fn fmt_status(status: &Option<u16>) -> String {
    status
        .map(|code| format!(" (status {code})"))
        .unwrap_or_default()
}

/// Result type alias for OIDC agent operations
pub type Result<T> = std::result::Result<T, OidcError>;
