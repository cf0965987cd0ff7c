//! Authentication context aggregate
//!
//! [`AuthenticationContext`] holds everything the flow learned about one
//! signed-in user: the discovery document, the token response, the userinfo
//! response and the derived [`User`]. Each step fills in its own slot;
//! logout clears all of them.
//!
//! The context serializes to JSON with a `schema_version` so a caller can
//! persist it between runs.

use serde::{Deserialize, Serialize};

use crate::auth::discovery::DiscoveryDocument;
use crate::auth::token::{TokenResponse, SUBJECT_CLAIM};
use crate::auth::userinfo::UserInfoResponse;
use crate::error::{OidcError, Result};

/// Current on-disk layout of [`AuthenticationContext`].
pub const CONTEXT_SCHEMA_VERSION: u32 = 1;

fn current_schema_version() -> u32 {
    CONTEXT_SCHEMA_VERSION
}

/// The signed-in user, derived from ID token or userinfo claims.
///
/// `username` is the `sub` claim. `attributes` holds every other claim with
/// nested objects and arrays kept as nested JSON values.
///
/// # Examples
///
/// ```
/// use oidc_agent::auth::context::User;
///
/// let claims = serde_json::json!({
///     "sub": "alice",
///     "email": "a@x",
///     "address": {"country": "NZ"}
/// });
/// let user = User::from_claims(claims.as_object().unwrap()).unwrap();
///
/// assert_eq!(user.username, "alice");
/// assert_eq!(user.attribute("email").unwrap(), "a@x");
/// assert_eq!(user.attribute("address").unwrap()["country"], "NZ");
/// assert!(user.attribute("sub").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Subject identifier.
    pub username: String,

    /// All non-subject claims.
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl User {
    /// Builds a user from a claim set.
    ///
    /// # Errors
    ///
    /// Returns [`OidcError::Server`] when the claims carry no string `sub`.
    pub fn from_claims(claims: &serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        let username = claims
            .get(SUBJECT_CLAIM)
            .and_then(|v| v.as_str())
            .ok_or_else(|| OidcError::server("claims do not contain a string 'sub'"))?
            .to_string();

        let attributes = claims
            .iter()
            .filter(|(name, _)| name.as_str() != SUBJECT_CLAIM)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Ok(Self {
            username,
            attributes,
        })
    }

    /// Looks up a single attribute.
    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }
}

/// Per-user authentication state accumulated by the flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationContext {
    #[serde(default = "current_schema_version")]
    schema_version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    discovery: Option<DiscoveryDocument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<TokenResponse>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_info: Option<UserInfoResponse>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<User>,
}

impl Default for AuthenticationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthenticationContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self {
            schema_version: CONTEXT_SCHEMA_VERSION,
            discovery: None,
            token: None,
            user_info: None,
            user: None,
        }
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn discovery(&self) -> Option<&DiscoveryDocument> {
        self.discovery.as_ref()
    }

    pub fn token(&self) -> Option<&TokenResponse> {
        self.token.as_ref()
    }

    pub fn user_info(&self) -> Option<&UserInfoResponse> {
        self.user_info.as_ref()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn set_discovery(&mut self, discovery: DiscoveryDocument) {
        self.discovery = Some(discovery);
    }

    pub fn set_token(&mut self, token: TokenResponse) {
        self.token = Some(token);
    }

    pub fn set_user_info(&mut self, user_info: UserInfoResponse) {
        self.user_info = Some(user_info);
    }

    pub fn set_user(&mut self, user: User) {
        self.user = Some(user);
    }

    /// Returns `true` when no slot is populated.
    pub fn is_empty(&self) -> bool {
        self.discovery.is_none()
            && self.token.is_none()
            && self.user_info.is_none()
            && self.user.is_none()
    }

    /// Clears every slot, leaving an empty context.
    pub fn dispose(&mut self) {
        self.discovery = None;
        self.token = None;
        self.user_info = None;
        self.user = None;
    }
}
