//! Session token issuance and verification.
//!
//! Tokens are compact three-part strings, `base64url(header).base64url(claims).base64url(sig)`,
//! signed with HMAC-SHA256 over the first two parts. The claims carry the user id, the
//! username, and an embedded expiry, so any instance can verify a token without shared
//! session storage. There is no server-side revocation; a token stays valid until its
//! `exp` elapses.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Default validity window: 1000 hours.
pub const DEFAULT_TTL_SECONDS: i64 = 1000 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionTokenHeader {
    pub alg: String,
    pub typ: String,
}

impl SessionTokenHeader {
    fn hs256() -> Self {
        Self {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Identity facts embedded in a session token. Immutable once minted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: i64,
    pub name: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("invalid key")]
    Key,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, Error> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, Error> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| Error::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Stateless authority that mints and checks session tokens.
///
/// Pure computation over a shared secret; safe to call concurrently without
/// coordination.
pub struct TokenAuthority {
    secret: SecretString,
    ttl_seconds: i64,
}

impl TokenAuthority {
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            ttl_seconds: DEFAULT_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_ttl_seconds(mut self, seconds: i64) -> Self {
        self.ttl_seconds = seconds;
        self
    }

    fn mac(&self) -> Result<HmacSha256, Error> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes()).map_err(|_| Error::Key)
    }

    /// Mint a signed token for the given identity, expiring `ttl_seconds` from now.
    ///
    /// # Errors
    ///
    /// Returns an error if the header or claims cannot be encoded, or the key is
    /// unusable for HMAC.
    pub fn issue(&self, user_id: i64, username: &str) -> Result<String, Error> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            name: username.to_string(),
            iat: now,
            exp: now + self.ttl_seconds,
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, Error> {
        let header_b64 = b64e_json(&SessionTokenHeader::hs256())?;
        let claims_b64 = b64e_json(claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_b64 = Base64UrlUnpadded::encode_string(&signature);

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Check a presented token and return its claims when it is genuine and unexpired.
    ///
    /// Malformed encoding, signature mismatch, and elapsed expiry all collapse into
    /// `None`; callers only need to treat the token as unauthenticated.
    #[must_use]
    pub fn verify(&self, token: &str) -> Option<Claims> {
        self.decode(token).ok()
    }

    fn decode(&self, token: &str) -> Result<Claims, Error> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::TokenFormat);
        };

        let header: SessionTokenHeader = b64d_json(header_b64)?;
        if header.alg != "HS256" {
            return Err(Error::UnsupportedAlg(header.alg));
        }

        let signature = Base64UrlUnpadded::decode_vec(signature_b64).map_err(|_| Error::Base64)?;
        let signing_input = format!("{header_b64}.{claims_b64}");
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        // verify_slice compares in constant time.
        mac.verify_slice(&signature)
            .map_err(|_| Error::InvalidSignature)?;

        let claims: Claims = b64d_json(claims_b64)?;
        if claims.exp <= Utc::now().timestamp() {
            return Err(Error::Expired);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority() -> TokenAuthority {
        TokenAuthority::new(SecretString::from("test-secret".to_string()))
    }

    #[test]
    fn issue_verify_round_trip() {
        let authority = authority();
        let token = authority.issue(42, "alice").unwrap();
        let claims = authority.verify(&token).expect("token should verify");
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.name, "alice");
        assert_eq!(claims.exp - claims.iat, DEFAULT_TTL_SECONDS);
    }

    #[test]
    fn verify_rejects_any_single_byte_mutation() {
        let authority = authority();
        let token = authority.issue(7, "bob").unwrap();
        let bytes = token.as_bytes();

        for index in 0..bytes.len() {
            let mut mutated = bytes.to_vec();
            // Stay within the base64url alphabet so only the signature check can fail.
            mutated[index] = if mutated[index] == b'A' { b'B' } else { b'A' };
            if mutated == bytes {
                continue;
            }
            let mutated = String::from_utf8(mutated).unwrap();
            assert!(
                authority.verify(&mutated).is_none(),
                "mutation at byte {index} should invalidate the token"
            );
        }
    }

    #[test]
    fn verify_rejects_expired_token_with_intact_signature() {
        let authority = TokenAuthority::new(SecretString::from("test-secret".to_string()))
            .with_ttl_seconds(-60);
        let token = authority.issue(1, "carol").unwrap();
        assert!(authority.verify(&token).is_none());

        // The same token fails for the expiry, not the signature.
        match authority.decode(&token) {
            Err(Error::Expired) => (),
            other => panic!("expected Expired, got {other:?}"),
        }
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let token = authority().issue(1, "dave").unwrap();
        let other = TokenAuthority::new(SecretString::from("another-secret".to_string()));
        assert!(other.verify(&token).is_none());
    }

    #[test]
    fn verify_rejects_malformed_tokens() {
        let authority = authority();
        assert!(authority.verify("").is_none());
        assert!(authority.verify("not-a-token").is_none());
        assert!(authority.verify("a.b").is_none());
        assert!(authority.verify("a.b.c.d").is_none());
        assert!(authority.verify("!!!.@@@.###").is_none());
    }

    #[test]
    fn verify_rejects_unsupported_algorithm() {
        let authority = authority();
        let header = b64e_json(&SessionTokenHeader {
            alg: "none".to_string(),
            typ: "JWT".to_string(),
        })
        .unwrap();
        let claims = b64e_json(&Claims {
            sub: 1,
            name: "eve".to_string(),
            iat: 0,
            exp: i64::MAX,
        })
        .unwrap();
        let forged = format!("{header}.{claims}.");
        assert!(authority.verify(&forged).is_none());
    }
}
