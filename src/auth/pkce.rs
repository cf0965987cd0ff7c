//! PKCE S256 verifier and challenge generation
//!
//! Every authorization request carries a fresh Proof Key for Code Exchange
//! pair (RFC 7636). The challenge goes to the authorization endpoint, the
//! verifier goes to the token endpoint with the authorization code.
//!
//! # References
//!
//! - RFC 7636 <https://www.rfc-editor.org/rfc/rfc7636>

use base64::Engine as _;
use sha2::{Digest, Sha256};

/// The only challenge method this crate produces.
pub const S256: &str = "S256";

/// A PKCE S256 verifier and its derived challenge.
///
/// # Examples
///
/// ```
/// use oidc_agent::auth::pkce::PkceChallenge;
///
/// let pkce = PkceChallenge::generate();
/// assert_eq!(pkce.verifier.len(), 43);
/// assert_eq!(pkce.method, "S256");
/// assert_ne!(pkce.verifier, pkce.challenge);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge {
    /// 32 random bytes, base64url without padding (43 characters).
    pub verifier: String,

    /// base64url(SHA-256(verifier)) without padding.
    pub challenge: String,

    /// Always `"S256"`.
    pub method: String,
}

impl PkceChallenge {
    /// Generates a fresh verifier/challenge pair.
    pub fn generate() -> Self {
        use rand::RngCore as _;

        let mut random_bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut random_bytes);
        let verifier = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes);

        Self::from_verifier(verifier)
    }

    /// Derives the S256 challenge for an existing verifier.
    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        let verifier = verifier.into();
        // RFC 7636 section 4.2: BASE64URL(SHA256(ASCII(code_verifier)))
        let digest = Sha256::digest(verifier.as_bytes());
        let challenge = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest.as_slice());

        Self {
            verifier,
            challenge,
            method: S256.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_produces_correct_verifier_length() {
        let pkce = PkceChallenge::generate();
        assert_eq!(
            pkce.verifier.len(),
            43,
            "32 random bytes in base64url without padding produces 43 chars"
        );
    }

    #[test]
    fn test_generate_produces_unique_verifiers() {
        let a = PkceChallenge::generate();
        let b = PkceChallenge::generate();
        assert_ne!(a.verifier, b.verifier);
        assert_ne!(a.challenge, b.challenge);
    }

    #[test]
    fn test_challenge_uses_url_safe_base64_no_padding() {
        let pkce = PkceChallenge::generate();
        assert!(
            pkce.challenge
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "challenge must only contain base64url characters, got: {}",
            pkce.challenge
        );
    }

    /// RFC 7636 Appendix B test vector.
    #[test]
    fn test_s256_known_answer_rfc7636_appendix_b() {
        let pkce = PkceChallenge::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(pkce.challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
        assert_eq!(pkce.method, "S256");
    }
}
