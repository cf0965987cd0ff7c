//! Authorization code exchange at the token endpoint
//!
//! [`TokenClient`] POSTs the `authorization_code` grant (with the PKCE
//! verifier) to the provider and converts the reply into a
//! [`TokenResponse`].
//!
//! The ID token is kept as its compact string. Claims are decoded on demand
//! by [`TokenResponse::id_token_claims`], every call decoding again. The
//! signature is not verified here: the token arrived directly from the
//! token endpoint over TLS.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use base64::Engine as _;

use crate::auth::authorization::{AuthorizationRequest, AuthorizationResponse};
use crate::error::{OidcError, Result};

/// Claim carrying the subject identifier.
pub const SUBJECT_CLAIM: &str = "sub";

// ---------------------------------------------------------------------------
// TokenResponse
// ---------------------------------------------------------------------------

/// Tokens issued by the provider for one successful code exchange.
///
/// Optional fields the provider did not send stay `None`.
///
/// # Examples
///
/// ```
/// use oidc_agent::auth::token::TokenResponse;
///
/// let token = TokenResponse {
///     token_type: "Bearer".to_string(),
///     access_token: "AT1".to_string(),
///     access_token_expiration_time: None,
///     id_token: None,
///     refresh_token: None,
/// };
///
/// // A token with no expiry is never considered expired.
/// assert!(!token.is_expired());
/// assert!(token.id_token_claims().unwrap().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Token type, typically `"Bearer"`.
    pub token_type: String,

    /// The access token.
    pub access_token: String,

    /// Access token expiry as milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_expiration_time: Option<i64>,

    /// Compact-serialized ID token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Refresh token, when the provider issued one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    /// Access token expiry as a UTC timestamp.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.access_token_expiration_time
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
    }

    /// Returns `true` when the access token is expired or expires within
    /// the next 60 seconds. Tokens without an expiry never expire.
    pub fn is_expired(&self) -> bool {
        let Some(expires_at) = self.expires_at() else {
            return false;
        };
        expires_at
            .checked_sub_signed(chrono::Duration::seconds(60))
            .map_or(true, |threshold| Utc::now() >= threshold)
    }

    /// Decodes the ID token claims.
    ///
    /// Returns `Ok(None)` when no ID token was issued.
    ///
    /// # Errors
    ///
    /// Returns [`OidcError::Server`] when the ID token is not a decodable JWT.
    pub fn id_token_claims(&self) -> Result<Option<IdTokenClaims>> {
        self.id_token
            .as_deref()
            .map(|jwt| decode_unsigned_claims(jwt).map(IdTokenClaims))
            .transpose()
    }
}

// ---------------------------------------------------------------------------
// IdTokenClaims
// ---------------------------------------------------------------------------

/// Claims decoded from an ID token payload.
#[derive(Debug, Clone, PartialEq)]
pub struct IdTokenClaims(serde_json::Map<String, serde_json::Value>);

impl IdTokenClaims {
    /// The `sub` claim.
    pub fn subject(&self) -> Option<&str> {
        self.claim(SUBJECT_CLAIM).and_then(|v| v.as_str())
    }

    /// Looks up a claim by name.
    pub fn claim(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    /// All claims.
    pub fn claims(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.0
    }
}

/// Decodes the payload of a compact JWT without checking its signature.
///
/// # Errors
///
/// Returns [`OidcError::Server`] if the token does not have three segments,
/// the payload is not base64url, or it is not a JSON object.
///
/// # Examples
///
/// ```
/// use oidc_agent::auth::token::decode_unsigned_claims;
///
/// // {"alg":"none"} . {"sub":"alice"} . (empty signature)
/// let jwt = "eyJhbGciOiJub25lIn0.eyJzdWIiOiJhbGljZSJ9.";
/// let claims = decode_unsigned_claims(jwt).unwrap();
/// assert_eq!(claims["sub"], "alice");
/// ```
pub fn decode_unsigned_claims(jwt: &str) -> Result<serde_json::Map<String, serde_json::Value>> {
    let parts: Vec<&str> = jwt.split('.').collect();
    if parts.len() != 3 {
        return Err(OidcError::server(
            "id_token is not a valid JWT (expected 3 segments)",
        ));
    }

    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|e| OidcError::server(format!("id_token payload is not base64url: {e}")))?;

    match serde_json::from_slice(&payload) {
        Ok(serde_json::Value::Object(claims)) => Ok(claims),
        Ok(_) => Err(OidcError::server("id_token payload is not a JSON object")),
        Err(e) => Err(OidcError::server(format!(
            "id_token payload is not valid JSON: {e}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Token endpoint wire types
// ---------------------------------------------------------------------------

/// Raw JSON response from the token endpoint.
#[derive(Debug, Deserialize)]
struct RawTokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl RawTokenResponse {
    /// `expires_in` seconds become an absolute epoch-millis expiry. An
    /// expiry that does not fit in a timestamp is dropped.
    fn into_token_response(self, issued_at: DateTime<Utc>) -> TokenResponse {
        let access_token_expiration_time = self.expires_in.and_then(|secs| {
            let expiry = secs
                .checked_mul(1000)
                .and_then(|millis| issued_at.timestamp_millis().checked_add(millis))
                .filter(|millis| Utc.timestamp_millis_opt(*millis).single().is_some());
            if expiry.is_none() {
                tracing::warn!("Ignoring unrepresentable expires_in of {} seconds", secs);
            }
            expiry
        });

        TokenResponse {
            token_type: self.token_type,
            access_token: self.access_token,
            access_token_expiration_time,
            id_token: self.id_token,
            refresh_token: self.refresh_token,
        }
    }
}

/// OAuth 2.0 error response body (RFC 6749 section 5.2).
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

// ---------------------------------------------------------------------------
// TokenClient
// ---------------------------------------------------------------------------

/// Exchanges authorization codes for tokens.
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: reqwest::Client,
}

impl TokenClient {
    /// Creates a token client on top of a shared HTTP client.
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Redeems the code in `response` at the token endpoint named by
    /// `request`.
    ///
    /// The form carries `grant_type=authorization_code`, the code, the
    /// redirect URI, the client id and the PKCE verifier from `request`.
    ///
    /// # Errors
    ///
    /// Returns [`OidcError::Server`] when the request fails, the provider
    /// answers with a non-success status (its OAuth error code is included
    /// in the message), or the body is not a token response.
    pub async fn exchange(
        &self,
        request: &AuthorizationRequest,
        response: &AuthorizationResponse,
    ) -> Result<TokenResponse> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", response.code.as_str()),
            ("redirect_uri", request.redirect_uri.as_str()),
            ("client_id", request.client_id.as_str()),
            ("code_verifier", request.pkce.verifier.as_str()),
        ];

        tracing::debug!("Exchanging authorization code at {}", request.token_endpoint);

        let resp = self
            .http
            .post(request.token_endpoint.clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| OidcError::server(format!("token exchange request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let detail = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{}: {}", err.error, description),
                    None => err.error,
                },
                Err(_) => body,
            };
            return Err(OidcError::server_status(
                status.as_u16(),
                format!("token endpoint returned {status}: {detail}"),
            ));
        }

        let raw: RawTokenResponse = resp
            .json()
            .await
            .map_err(|e| OidcError::server(format!("failed to parse token response: {e}")))?;

        Ok(raw.into_token_response(Utc::now()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    fn encode_segment(value: &serde_json::Value) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(value.to_string())
    }

    fn jwt(claims: serde_json::Value) -> String {
        format!(
            "{}.{}.sig",
            encode_segment(&serde_json::json!({"alg": "RS256", "typ": "JWT"})),
            encode_segment(&claims)
        )
    }

    fn token_with_id(id_token: Option<String>) -> TokenResponse {
        TokenResponse {
            token_type: "Bearer".to_string(),
            access_token: "AT1".to_string(),
            access_token_expiration_time: None,
            id_token,
            refresh_token: None,
        }
    }

    #[test]
    fn test_decode_unsigned_claims_reads_payload() {
        let claims =
            decode_unsigned_claims(&jwt(serde_json::json!({"sub": "alice", "email": "a@x"})))
                .unwrap();
        assert_eq!(claims["sub"], "alice");
        assert_eq!(claims["email"], "a@x");
    }

    #[test]
    fn test_decode_unsigned_claims_accepts_padded_payload() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(r#"{"sub":"bob"}"#);
        let token = format!("e30.{payload}.sig");
        assert!(payload.ends_with('='));
        assert_eq!(decode_unsigned_claims(&token).unwrap()["sub"], "bob");
    }

    #[test]
    fn test_decode_unsigned_claims_rejects_wrong_segment_count() {
        let err = decode_unsigned_claims("only.two").unwrap_err();
        assert!(err.to_string().contains("3 segments"));
    }

    #[test]
    fn test_decode_unsigned_claims_rejects_non_object_payload() {
        let token = format!("e30.{}.sig", encode_segment(&serde_json::json!([1, 2])));
        assert!(decode_unsigned_claims(&token).is_err());
    }

    #[test]
    fn test_decode_unsigned_claims_rejects_bad_base64() {
        assert!(decode_unsigned_claims("e30.!!!.sig").is_err());
    }

    #[test]
    fn test_id_token_claims_decodes_on_each_call() {
        let token = token_with_id(Some(jwt(serde_json::json!({"sub": "alice"}))));
        let first = token.id_token_claims().unwrap().unwrap();
        let second = token.id_token_claims().unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.subject(), Some("alice"));
    }

    #[test]
    fn test_id_token_claims_none_without_id_token() {
        assert!(token_with_id(None).id_token_claims().unwrap().is_none());
    }

    #[test]
    fn test_raw_response_computes_expiration_millis() {
        let issued_at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let raw = RawTokenResponse {
            access_token: "AT1".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: Some(3600),
            id_token: None,
            refresh_token: None,
        };
        let token = raw.into_token_response(issued_at);
        assert_eq!(
            token.access_token_expiration_time,
            Some(1_700_000_000_000 + 3_600_000)
        );
        assert_eq!(token.expires_at().unwrap().timestamp(), 1_700_003_600);
    }

    #[test]
    fn test_raw_response_leaves_absent_fields_unset() {
        let raw: RawTokenResponse =
            serde_json::from_str(r#"{"access_token":"AT1","token_type":"Bearer"}"#).unwrap();
        let token = raw.into_token_response(Utc::now());
        assert!(token.access_token_expiration_time.is_none());
        assert!(token.id_token.is_none());
        assert!(token.refresh_token.is_none());
    }

    #[test]
    fn test_missing_token_type_defaults_to_bearer() {
        let raw: RawTokenResponse = serde_json::from_str(r#"{"access_token":"AT1"}"#).unwrap();
        assert_eq!(raw.token_type, "Bearer");
    }

    #[test]
    fn test_is_expired_respects_skew() {
        let mut token = token_with_id(None);
        token.access_token_expiration_time =
            Some((Utc::now() + chrono::Duration::seconds(30)).timestamp_millis());
        assert!(token.is_expired(), "expiring within the 60s skew counts as expired");

        token.access_token_expiration_time =
            Some((Utc::now() + chrono::Duration::hours(1)).timestamp_millis());
        assert!(!token.is_expired());
    }

    #[test]
    fn test_raw_response_drops_unrepresentable_expiry() {
        let issued_at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        for expires_in in [i64::MAX, i64::MIN, i64::MAX / 1000] {
            let raw = RawTokenResponse {
                access_token: "AT1".to_string(),
                token_type: "Bearer".to_string(),
                expires_in: Some(expires_in),
                id_token: None,
                refresh_token: None,
            };
            let token = raw.into_token_response(issued_at);
            assert!(token.access_token_expiration_time.is_none());
            assert!(!token.is_expired());
        }
    }

    #[test]
    fn test_is_expired_near_minimum_timestamp() {
        let mut token = token_with_id(None);
        token.access_token_expiration_time = Some(DateTime::<Utc>::MIN_UTC.timestamp_millis());
        assert!(token.expires_at().is_some());
        assert!(token.is_expired());
    }

    #[test]
    fn test_token_response_serializes_without_absent_fields() {
        let json = serde_json::to_value(token_with_id(None)).unwrap();
        assert!(json.get("refresh_token").is_none());
        assert_eq!(json["access_token"], "AT1");
    }
}
