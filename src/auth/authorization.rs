//! Authorization step types and collaborator traits
//!
//! The interactive part of the flow (sending the user to the provider and
//! receiving the redirect) is delegated to an [`AuthorizationStep`]. Showing
//! a URL to the user, as RP-initiated logout needs, is delegated to a
//! [`UserAgent`]. The orchestrator owns neither a browser nor a listener.
//!
//! Each authorization attempt gets an [`AuthorizationSession`]. Whatever the
//! collaborator holds for the attempt (a bound port, a browser tab) hangs
//! off the session via [`AuthorizationSession::on_release`] and is released
//! exactly once, when the code exchange has finished or the session is
//! dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::Engine as _;
use url::Url;

use crate::auth::pkce::PkceChallenge;
use crate::config::ClientConfig;
use crate::error::{OidcError, Result};

/// The only response type this client requests.
pub const RESPONSE_TYPE_CODE: &str = "code";

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

/// A fully-formed authorization request for one attempt.
///
/// # Examples
///
/// ```
/// use oidc_agent::auth::authorization::AuthorizationRequest;
/// use oidc_agent::config::ClientConfig;
/// use url::Url;
///
/// let config = ClientConfig::new(
///     "app1",
///     "openid profile",
///     "http://127.0.0.1:8765/callback",
///     "https://idp.example/.well-known/openid-configuration",
/// )
/// .unwrap();
///
/// let request = AuthorizationRequest::new(
///     Url::parse("https://idp.example/authz").unwrap(),
///     Url::parse("https://idp.example/token").unwrap(),
///     &config,
/// );
///
/// let url = request.to_url();
/// assert!(url.as_str().starts_with("https://idp.example/authz?response_type=code"));
/// assert!(url.query().unwrap().contains("client_id=app1"));
/// ```
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    pub client_id: String,
    pub scope: String,
    pub redirect_uri: Url,
    pub response_type: String,
    /// Random nonce the redirect must echo back.
    pub state: String,
    pub pkce: PkceChallenge,
}

impl AuthorizationRequest {
    /// Builds a request for `config` with a fresh state and PKCE pair.
    pub fn new(authorization_endpoint: Url, token_endpoint: Url, config: &ClientConfig) -> Self {
        Self {
            authorization_endpoint,
            token_endpoint,
            client_id: config.client_id().to_string(),
            scope: config.scope().to_string(),
            redirect_uri: config.redirect_uri().clone(),
            response_type: RESPONSE_TYPE_CODE.to_string(),
            state: random_state(),
            pkce: PkceChallenge::generate(),
        }
    }

    /// The URL the user agent must visit.
    pub fn to_url(&self) -> Url {
        let mut url = self.authorization_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("response_type", &self.response_type);
            query.append_pair("client_id", &self.client_id);
            query.append_pair("redirect_uri", self.redirect_uri.as_str());
            query.append_pair("scope", &self.scope);
            query.append_pair("state", &self.state);
            query.append_pair("code_challenge", &self.pkce.challenge);
            query.append_pair("code_challenge_method", &self.pkce.method);
        }
        url
    }
}

/// A successful authorization redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResponse {
    pub code: String,
    /// The `state` echoed by the provider, if any.
    pub state: Option<String>,
}

/// Why an authorization attempt produced no code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationError {
    /// OAuth `error` code from the redirect, or a local reason such as
    /// `"access_denied"` or `"cancelled"`.
    pub reason: String,
    pub description: Option<String>,
}

impl AuthorizationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl std::fmt::Display for AuthorizationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{}: {}", self.reason, description),
            None => f.write_str(&self.reason),
        }
    }
}

impl std::error::Error for AuthorizationError {}

impl From<AuthorizationError> for OidcError {
    fn from(err: AuthorizationError) -> Self {
        OidcError::Authorization(err.to_string())
    }
}

/// Generates a random `state` nonce: 16 bytes, base64url without padding.
pub fn random_state() -> String {
    use rand::RngCore as _;

    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

// ---------------------------------------------------------------------------
// AuthorizationSession
// ---------------------------------------------------------------------------

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// Handle on the resources of one authorization attempt.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use oidc_agent::auth::authorization::AuthorizationSession;
///
/// let released = Arc::new(AtomicUsize::new(0));
/// let session = AuthorizationSession::new();
/// let counter = Arc::clone(&released);
/// session.on_release(move || {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// assert!(session.release());
/// assert!(!session.release());
/// drop(session);
/// assert_eq!(released.load(Ordering::SeqCst), 1);
/// ```
#[derive(Default)]
pub struct AuthorizationSession {
    released: AtomicBool,
    hooks: Mutex<Vec<ReleaseHook>>,
}

impl AuthorizationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `hook` to run on release. Runs it immediately if the
    /// session is already released.
    pub fn on_release(&self, hook: impl FnOnce() + Send + 'static) {
        let mut hooks = self.lock_hooks();
        if !self.is_released() {
            hooks.push(Box::new(hook));
            return;
        }
        drop(hooks);
        hook();
    }

    /// Releases the session. Returns `true` only for the call that actually
    /// performed the release.
    pub fn release(&self) -> bool {
        if self
            .released
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let hooks = std::mem::take(&mut *self.lock_hooks());
        tracing::debug!("Releasing authorization session ({} hooks)", hooks.len());
        for hook in hooks {
            hook();
        }
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    fn lock_hooks(&self) -> std::sync::MutexGuard<'_, Vec<ReleaseHook>> {
        self.hooks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for AuthorizationSession {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for AuthorizationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationSession")
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Performs the interactive authorization step.
///
/// Implementations present `request.to_url()` to the user and resolve with
/// the code from the redirect, or with the reason no code was issued.
#[async_trait]
pub trait AuthorizationStep: Send + Sync {
    async fn authorize(
        &self,
        request: &AuthorizationRequest,
        session: &AuthorizationSession,
    ) -> std::result::Result<AuthorizationResponse, AuthorizationError>;
}

/// Shows a URL to the user, e.g. by launching a browser.
#[async_trait]
pub trait UserAgent: Send + Sync {
    async fn present(&self, url: &Url) -> Result<()>;
}
