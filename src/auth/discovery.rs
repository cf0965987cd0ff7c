//! OpenID Connect provider discovery
//!
//! This module retrieves the provider metadata document published at the
//! configured discovery URI (OpenID Connect Discovery 1.0).
//!
//! The document is retained verbatim. Nothing is validated at fetch time;
//! each endpoint accessor parses its own key lazily and yields `None` when
//! the key is missing or not a usable URL. Callers turn a missing endpoint
//! into an error at the point where they need it.
//!
//! # References
//!
//! - OpenID Connect Discovery 1.0 <https://openid.net/specs/openid-connect-discovery-1_0.html>

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{OidcError, Result};

/// Metadata key of the authorization endpoint.
pub const AUTHORIZATION_ENDPOINT: &str = "authorization_endpoint";
/// Metadata key of the token endpoint.
pub const TOKEN_ENDPOINT: &str = "token_endpoint";
/// Metadata key of the RP-initiated logout endpoint.
pub const END_SESSION_ENDPOINT: &str = "end_session_endpoint";
/// Metadata key of the userinfo endpoint.
pub const USERINFO_ENDPOINT: &str = "userinfo_endpoint";

// ---------------------------------------------------------------------------
// DiscoveryDocument
// ---------------------------------------------------------------------------

/// Provider metadata document, kept as the raw JSON object.
///
/// # Examples
///
/// ```
/// use oidc_agent::auth::discovery::DiscoveryDocument;
///
/// let doc = DiscoveryDocument::from_json(serde_json::json!({
///     "authorization_endpoint": "https://idp.example/authz",
///     "token_endpoint": "not a url"
/// }))
/// .unwrap();
///
/// assert_eq!(
///     doc.authorization_endpoint().unwrap().as_str(),
///     "https://idp.example/authz"
/// );
/// // Unparsable and missing endpoints are simply absent.
/// assert!(doc.token_endpoint().is_none());
/// assert!(doc.userinfo_endpoint().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiscoveryDocument {
    metadata: serde_json::Map<String, serde_json::Value>,
}

impl DiscoveryDocument {
    /// Wraps a parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`OidcError::Server`] when the value is not a JSON object.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Object(metadata) => Ok(Self { metadata }),
            other => Err(OidcError::server(format!(
                "discovery document must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Returns a string-valued metadata property.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    /// Parses a metadata property as an absolute URL.
    ///
    /// Missing keys, non-string values and unparsable URLs all yield `None`.
    pub fn endpoint(&self, key: &str) -> Option<Url> {
        let raw = self.property(key)?;
        match Url::parse(raw) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!("discovery property {key} could not be parsed: {e}");
                None
            }
        }
    }

    /// The provider's authorization endpoint.
    pub fn authorization_endpoint(&self) -> Option<Url> {
        self.endpoint(AUTHORIZATION_ENDPOINT)
    }

    /// The provider's token endpoint.
    pub fn token_endpoint(&self) -> Option<Url> {
        self.endpoint(TOKEN_ENDPOINT)
    }

    /// The provider's RP-initiated logout endpoint.
    pub fn end_session_endpoint(&self) -> Option<Url> {
        self.endpoint(END_SESSION_ENDPOINT)
    }

    /// The provider's userinfo endpoint.
    pub fn userinfo_endpoint(&self) -> Option<Url> {
        self.endpoint(USERINFO_ENDPOINT)
    }

    /// The `issuer` identifier, if published.
    pub fn issuer(&self) -> Option<&str> {
        self.property("issuer")
    }

    /// The raw metadata object.
    pub fn as_map(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.metadata
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// DiscoveryClient
// ---------------------------------------------------------------------------

/// Fetches provider metadata documents.
///
/// # Examples
///
/// ```no_run
/// use oidc_agent::auth::discovery::DiscoveryClient;
///
/// # async fn example() -> oidc_agent::error::Result<()> {
/// let client = DiscoveryClient::new(reqwest::Client::new());
/// let doc = client
///     .fetch("https://idp.example/.well-known/openid-configuration")
///     .await?;
/// println!("token endpoint: {:?}", doc.token_endpoint());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DiscoveryClient {
    http: reqwest::Client,
}

impl DiscoveryClient {
    /// Creates a discovery client on top of a shared HTTP client.
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// GETs `discovery_uri` and returns the parsed document.
    ///
    /// # Errors
    ///
    /// - [`OidcError::Client`] if `discovery_uri` is malformed. No request is
    ///   made in that case.
    /// - [`OidcError::Server`] if the request fails, the status is anything
    ///   other than `200 OK`, or the body is not a JSON object.
    pub async fn fetch(&self, discovery_uri: &str) -> Result<DiscoveryDocument> {
        let url = Url::parse(discovery_uri).map_err(|e| {
            OidcError::Client(format!("discovery endpoint is malformed ({discovery_uri}): {e}"))
        })?;

        tracing::debug!("Calling discovery endpoint {}", url);

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| {
                OidcError::server(format!("error while calling the discovery endpoint: {e}"))
            })?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(OidcError::server_status(
                status.as_u16(),
                format!("discovery endpoint returned {status}"),
            ));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| OidcError::server(format!("failed to read discovery response: {e}")))?;

        let value: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            OidcError::server(format!("error while parsing the discovery response as JSON: {e}"))
        })?;

        DiscoveryDocument::from_json(value)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn full_document() -> DiscoveryDocument {
        DiscoveryDocument::from_json(serde_json::json!({
            "issuer": "https://idp.example",
            "authorization_endpoint": "https://idp.example/authz",
            "token_endpoint": "https://idp.example/token",
            "userinfo_endpoint": "https://idp.example/userinfo",
            "end_session_endpoint": "https://idp.example/logout",
            "scopes_supported": ["openid", "profile"]
        }))
        .unwrap()
    }

    #[test]
    fn test_all_four_endpoints_are_projected() {
        let doc = full_document();
        assert_eq!(
            doc.authorization_endpoint().unwrap().as_str(),
            "https://idp.example/authz"
        );
        assert_eq!(
            doc.token_endpoint().unwrap().as_str(),
            "https://idp.example/token"
        );
        assert_eq!(
            doc.userinfo_endpoint().unwrap().as_str(),
            "https://idp.example/userinfo"
        );
        assert_eq!(
            doc.end_session_endpoint().unwrap().as_str(),
            "https://idp.example/logout"
        );
        assert_eq!(doc.issuer(), Some("https://idp.example"));
    }

    #[test]
    fn test_missing_endpoint_is_none() {
        let doc = DiscoveryDocument::from_json(serde_json::json!({
            "authorization_endpoint": "https://idp.example/authz"
        }))
        .unwrap();
        assert!(doc.end_session_endpoint().is_none());
        assert!(doc.authorization_endpoint().is_some());
    }

    #[test]
    fn test_non_string_endpoint_is_none() {
        let doc = DiscoveryDocument::from_json(serde_json::json!({
            "token_endpoint": 42
        }))
        .unwrap();
        assert!(doc.token_endpoint().is_none());
        assert!(doc.property("token_endpoint").is_none());
    }

    #[test]
    fn test_relative_endpoint_is_none() {
        let doc = DiscoveryDocument::from_json(serde_json::json!({
            "userinfo_endpoint": "/userinfo"
        }))
        .unwrap();
        assert!(doc.userinfo_endpoint().is_none());
    }

    #[test]
    fn test_unknown_keys_are_retained() {
        let doc = full_document();
        assert!(doc.as_map().contains_key("scopes_supported"));
    }

    #[test]
    fn test_non_object_document_is_server_error() {
        let err = DiscoveryDocument::from_json(serde_json::json!(["a", "b"])).unwrap_err();
        assert!(matches!(err, OidcError::Server { status: None, .. }));
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn test_document_serializes_verbatim() {
        let doc = full_document();
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["token_endpoint"], "https://idp.example/token");
        let back: DiscoveryDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }

    #[tokio::test]
    async fn test_fetch_malformed_uri_is_client_error() {
        let client = DiscoveryClient::new(reqwest::Client::new());
        let err = client.fetch("not a uri").await.unwrap_err();
        assert!(matches!(err, OidcError::Client(_)));
    }

    // Wiremock integration tests are in tests/discovery_test.rs
}
