//! Bearer-token authentication.
//!
//! Tokens are HS256 JWTs issued by an external identity provider; this side
//! only verifies them. Authorization is a fixed allowlist of SHA-256 digests
//! of lower-cased verified emails, compared in constant time. Token material
//! is never logged.

use crate::config::AuthSettings;
use crate::error::{NotatError, Result};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

/// Claims Notat cares about; everything else in the token is ignored.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub email: String,
    pub exp: usize,
}

/// Verifies bearer tokens against the configured secret and email allowlist.
pub struct AuthVerifier {
    decoding_key: Option<DecodingKey>,
    allowlist: Vec<[u8; 32]>,
}

impl AuthVerifier {
    pub fn new(settings: &AuthSettings) -> Self {
        let decoding_key = settings
            .auth_secret()
            .map(|secret| DecodingKey::from_secret(secret.as_bytes()));

        let mut allowlist = Vec::with_capacity(settings.verified_email_hashes.len());
        for entry in &settings.verified_email_hashes {
            match parse_hex_digest(entry) {
                Some(digest) => allowlist.push(digest),
                None => warn!("Ignoring malformed email digest in allowlist"),
            }
        }

        Self {
            decoding_key,
            allowlist,
        }
    }

    /// SHA-256 digest of the lower-cased, trimmed email.
    pub fn email_digest(email: &str) -> [u8; 32] {
        let normalized = email.trim().to_lowercase();
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hasher.finalize().into()
    }

    /// Whether an email is on the verified allowlist.
    pub fn is_email_verified(&self, email: &str) -> bool {
        let digest = Self::email_digest(email);
        // Compare against every entry; no early exit within a comparison
        let mut verified = false;
        for entry in &self.allowlist {
            verified |= constant_time_eq(entry, &digest);
        }
        verified
    }

    /// Verify a bearer token and return its email claim.
    pub fn verify_token(&self, token: &str) -> Result<String> {
        let Some(key) = &self.decoding_key else {
            return Err(NotatError::Unauthorized(
                "Authentication is not configured".to_string(),
            ));
        };

        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, key, &validation)
            .map_err(|_| NotatError::Unauthorized("Invalid or expired token".to_string()))?;

        if !self.is_email_verified(&data.claims.email) {
            return Err(NotatError::Unauthorized(
                "Email is not on the verified list".to_string(),
            ));
        }

        Ok(data.claims.email)
    }
}

/// Byte-wise equality without data-dependent early exit.
fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Parse a 64-character hex digest.
fn parse_hex_digest(input: &str) -> Option<[u8; 32]> {
    let input = input.trim();
    if input.len() != 64 || !input.is_ascii() {
        return None;
    }
    let mut digest = [0u8; 32];
    for (i, byte) in digest.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&input[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(digest)
}

impl AuthSettings {
    /// The effective JWT secret, if configured.
    fn auth_secret(&self) -> Option<&str> {
        self.jwt_secret.as_deref().filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn hex(digest: &[u8; 32]) -> String {
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    fn settings_with(emails: &[&str]) -> AuthSettings {
        AuthSettings {
            jwt_secret: Some(SECRET.to_string()),
            verified_email_hashes: emails
                .iter()
                .map(|e| hex(&AuthVerifier::email_digest(e)))
                .collect(),
        }
    }

    fn token_for(email: &str, secret: &str, exp_offset: i64) -> String {
        let exp = (chrono::Utc::now().timestamp() + exp_offset) as usize;
        let claims = Claims {
            email: email.to_string(),
            exp,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_email_digest_is_case_insensitive() {
        assert_eq!(
            AuthVerifier::email_digest("User@Example.COM"),
            AuthVerifier::email_digest("user@example.com")
        );
        assert_eq!(
            AuthVerifier::email_digest("  user@example.com  "),
            AuthVerifier::email_digest("user@example.com")
        );
    }

    #[test]
    fn test_allowlist_membership() {
        let verifier = AuthVerifier::new(&settings_with(&["alice@example.com"]));
        assert!(verifier.is_email_verified("alice@example.com"));
        assert!(verifier.is_email_verified("ALICE@example.com"));
        assert!(!verifier.is_email_verified("bob@example.com"));
    }

    #[test]
    fn test_verify_token_happy_path() {
        let verifier = AuthVerifier::new(&settings_with(&["alice@example.com"]));
        let token = token_for("alice@example.com", SECRET, 3600);
        assert_eq!(verifier.verify_token(&token).unwrap(), "alice@example.com");
    }

    #[test]
    fn test_verify_token_rejects_unlisted_email() {
        let verifier = AuthVerifier::new(&settings_with(&["alice@example.com"]));
        let token = token_for("mallory@example.com", SECRET, 3600);
        let err = verifier.verify_token(&token).unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn test_verify_token_rejects_wrong_secret() {
        let verifier = AuthVerifier::new(&settings_with(&["alice@example.com"]));
        let token = token_for("alice@example.com", "other-secret", 3600);
        assert!(verifier.verify_token(&token).is_err());
    }

    #[test]
    fn test_verify_token_rejects_expired() {
        let verifier = AuthVerifier::new(&settings_with(&["alice@example.com"]));
        let token = token_for("alice@example.com", SECRET, -3600);
        assert!(verifier.verify_token(&token).is_err());
    }

    #[test]
    fn test_unconfigured_auth_rejects_everything() {
        let verifier = AuthVerifier::new(&AuthSettings::default());
        assert!(verifier.verify_token("anything").is_err());
    }

    #[test]
    fn test_parse_hex_digest() {
        let digest = AuthVerifier::email_digest("x@y.z");
        assert_eq!(parse_hex_digest(&hex(&digest)), Some(digest));
        assert_eq!(parse_hex_digest("zz"), None);
        assert_eq!(parse_hex_digest(&"g".repeat(64)), None);
    }

    #[test]
    fn test_constant_time_eq() {
        let a = [1u8; 32];
        let mut b = a;
        assert!(constant_time_eq(&a, &b));
        b[31] ^= 1;
        assert!(!constant_time_eq(&a, &b));
    }
}
