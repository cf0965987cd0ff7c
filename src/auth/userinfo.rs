//! UserInfo endpoint client
//!
//! Fetches the claims for the signed-in user with the access token as a
//! bearer credential. The HTTP client handed to [`UserInfoClient`] must not
//! follow redirects (see [`crate::auth::http::build_no_redirect_client`]) so
//! the bearer token is never replayed to another host.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::context::{AuthenticationContext, User};
use crate::auth::token::SUBJECT_CLAIM;
use crate::error::{OidcError, Result};

/// Claims returned by the userinfo endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserInfoResponse {
    claims: serde_json::Map<String, serde_json::Value>,
}

impl UserInfoResponse {
    /// Wraps a parsed userinfo body.
    ///
    /// # Errors
    ///
    /// Returns [`OidcError::Server`] if the body is not a JSON object or has
    /// no string `sub` claim.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(claims) = value else {
            return Err(OidcError::server("userinfo response is not a JSON object"));
        };
        if !claims.get(SUBJECT_CLAIM).is_some_and(|v| v.is_string()) {
            return Err(OidcError::server("userinfo response has no 'sub' claim"));
        }
        Ok(Self { claims })
    }

    /// The `sub` claim.
    pub fn subject(&self) -> &str {
        self.claim_str(SUBJECT_CLAIM).unwrap_or_default()
    }

    pub fn claim(&self, name: &str) -> Option<&serde_json::Value> {
        self.claims.get(name)
    }

    /// A claim's value when it is a JSON string.
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.claim(name).and_then(|v| v.as_str())
    }

    pub fn claims(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.claims
    }
}

/// Calls the userinfo endpoint.
#[derive(Debug, Clone)]
pub struct UserInfoClient {
    http: reqwest::Client,
}

impl UserInfoClient {
    /// Creates a userinfo client. `http` should be built without redirect
    /// following.
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Fetches userinfo for `ctx`, storing the response and the derived
    /// [`User`] back into it.
    ///
    /// When `ctx` already has both a token and a userinfo response, the
    /// cached response is returned without any network call.
    ///
    /// # Errors
    ///
    /// - [`OidcError::Client`] if `ctx` has no token or no discovery
    ///   document, or the document lacks a userinfo endpoint. The user must
    ///   re-initiate authentication.
    /// - [`OidcError::Server`] for transport failures, non-200 replies and
    ///   malformed bodies. `ctx` is left unchanged.
    pub async fn fetch(&self, ctx: &mut AuthenticationContext) -> Result<UserInfoResponse> {
        if let (Some(_), Some(cached)) = (ctx.token(), ctx.user_info()) {
            tracing::debug!("Returning cached userinfo response");
            return Ok(cached.clone());
        }

        let access_token = ctx
            .token()
            .map(|t| t.access_token.clone())
            .ok_or_else(|| {
                OidcError::Client(
                    "no access token in the authentication context; re-initiate authentication"
                        .to_string(),
                )
            })?;

        let discovery = ctx.discovery().ok_or_else(|| {
            OidcError::Client(
                "discovery document is absent; re-initiate authentication".to_string(),
            )
        })?;

        let endpoint = discovery.userinfo_endpoint().ok_or_else(|| {
            OidcError::Client("discovery document has no usable userinfo_endpoint".to_string())
        })?;

        let response = self.request(&endpoint, &access_token).await?;
        let user = User::from_claims(response.claims())?;

        ctx.set_user_info(response.clone());
        ctx.set_user(user);
        Ok(response)
    }

    /// GETs `endpoint` with `Authorization: Bearer <access_token>`.
    ///
    /// # Errors
    ///
    /// Returns [`OidcError::Server`] unless the provider answers `200 OK`
    /// with a JSON object carrying `sub`.
    pub async fn request(&self, endpoint: &Url, access_token: &str) -> Result<UserInfoResponse> {
        tracing::debug!("Calling userinfo endpoint {}", endpoint);

        let resp = self
            .http
            .get(endpoint.clone())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| OidcError::server(format!("userinfo request failed: {e}")))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(OidcError::server_status(
                status.as_u16(),
                format!("userinfo endpoint returned {status}"),
            ));
        }

        let value: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| OidcError::server(format!("failed to parse userinfo response: {e}")))?;

        UserInfoResponse::from_json(value)
    }
}
