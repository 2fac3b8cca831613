//! Signed streaming and admin tokens.
//!
//! Both token kinds are compact HMAC-SHA256 tokens (three base64url
//! segments) signed with the shared site secret. Expiry is carried in a
//! custom `expiry` claim (unix seconds) and checked manually, so the
//! two kinds share one verification path; callers distinguish by
//! claims.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::MediaType;

pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Payload binding a stream URL to specific content coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamClaims {
    pub id: String,
    #[serde(rename = "mediaType")]
    pub media_type: MediaType,
    #[serde(rename = "qualityIndex", default)]
    pub quality_index: usize,
    #[serde(rename = "seasonNumber", default, skip_serializing_if = "Option::is_none")]
    pub season_number: Option<i64>,
    #[serde(rename = "episodeNumber", default, skip_serializing_if = "Option::is_none")]
    pub episode_number: Option<i64>,
    /// Unix seconds.
    pub expiry: f64,
}

impl StreamClaims {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        media_type: MediaType,
        quality_index: usize,
        season_number: Option<i64>,
        episode_number: Option<i64>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            media_type,
            quality_index,
            season_number,
            episode_number,
            expiry: (Utc::now().timestamp() as f64) + ttl.as_secs_f64(),
        }
    }
}

/// Claims carried by administrative login tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminClaims {
    pub sub: String,
    pub role: String,
    /// Unix seconds.
    pub expiry: f64,
}

/// Issues and verifies site tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    algorithm: Algorithm,
}

impl TokenService {
    #[must_use]
    pub fn new(site_secret: &str) -> Self {
        Self {
            encoding_key: Arc::new(EncodingKey::from_secret(site_secret.as_bytes())),
            decoding_key: Arc::new(DecodingKey::from_secret(site_secret.as_bytes())),
            algorithm: Algorithm::HS256,
        }
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String> {
        let header = Header::new(self.algorithm);
        encode(&header, claims, &self.encoding_key)
            .map_err(|e| Error::Internal(format!("Failed to sign token: {e}")))
    }

    /// Issue a one-day admin token for a successfully authenticated
    /// administrator.
    pub fn issue_admin_token(&self, username: &str) -> Result<String> {
        let claims = AdminClaims {
            sub: username.to_string(),
            role: "admin".to_string(),
            expiry: (Utc::now().timestamp() as f64) + DEFAULT_TOKEN_TTL.as_secs_f64(),
        };
        self.sign(&claims)
    }

    pub fn issue_stream_token(&self, claims: &StreamClaims) -> Result<String> {
        self.sign(claims)
    }

    /// Verify signature and structure, check the custom `expiry` claim,
    /// and deserialize the payload.
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T> {
        let mut validation = Validation::new(self.algorithm);
        // Expiry lives in the custom `expiry` claim, not `exp`.
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::new();

        let data = decode::<Value>(token, &self.decoding_key, &validation)
            .map_err(|e| Error::Authentication(format!("Invalid token: {e}")))?;

        if let Some(expiry) = data.claims.get("expiry").and_then(Value::as_f64) {
            if expiry < Utc::now().timestamp() as f64 {
                return Err(Error::Authentication("Token has expired".to_string()));
            }
        }

        serde_json::from_value(data.claims)
            .map_err(|e| Error::Authentication(format!("Invalid token claims: {e}")))
    }

    /// Verify a stream token and require its id to match the URL path
    /// id it is being used against.
    pub fn verify_stream_token(&self, token: &str, path_id: &str) -> Result<StreamClaims> {
        let claims: StreamClaims = self.verify(token)?;
        if claims.id != path_id {
            return Err(Error::Authentication("Token ID mismatch".to_string()));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("test-site-secret")
    }

    fn claims(id: &str, ttl: Duration) -> StreamClaims {
        StreamClaims::new(id, MediaType::Movie, 0, None, None, ttl)
    }

    #[test]
    fn stream_token_round_trip() {
        let tokens = service();
        let payload = StreamClaims::new("42", MediaType::Show, 1, Some(2), Some(3), DEFAULT_TOKEN_TTL);
        let token = tokens.issue_stream_token(&payload).unwrap();
        let verified = tokens.verify_stream_token(&token, "42").unwrap();
        assert_eq!(verified, payload);
    }

    #[test]
    fn expired_token_is_rejected() {
        let tokens = service();
        let mut payload = claims("42", DEFAULT_TOKEN_TTL);
        payload.expiry = (Utc::now().timestamp() - 60) as f64;
        let token = tokens.issue_stream_token(&payload).unwrap();
        let err = tokens.verify_stream_token(&token, "42").unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let tokens = service();
        let token = tokens
            .issue_stream_token(&claims("42", DEFAULT_TOKEN_TTL))
            .unwrap();

        // Flip one byte in the payload segment.
        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        let mut payload = parts[1].clone().into_bytes();
        payload[0] = if payload[0] == b'A' { b'B' } else { b'A' };
        parts[1] = String::from_utf8(payload).unwrap();
        let tampered = parts.join(".");

        assert!(tokens.verify_stream_token(&tampered, "42").is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = service()
            .issue_stream_token(&claims("42", DEFAULT_TOKEN_TTL))
            .unwrap();
        let other = TokenService::new("different-secret");
        assert!(other.verify_stream_token(&token, "42").is_err());
    }

    #[test]
    fn path_id_mismatch_is_rejected() {
        let tokens = service();
        let token = tokens
            .issue_stream_token(&claims("42", DEFAULT_TOKEN_TTL))
            .unwrap();
        let err = tokens.verify_stream_token(&token, "43").unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[test]
    fn admin_token_carries_role() {
        let tokens = service();
        let token = tokens.issue_admin_token("admin").unwrap();
        let verified: AdminClaims = tokens.verify(&token).unwrap();
        assert_eq!(verified.sub, "admin");
        assert_eq!(verified.role, "admin");
        assert!(verified.expiry > Utc::now().timestamp() as f64);
    }

    #[test]
    fn malformed_token_is_rejected() {
        let tokens = service();
        assert!(tokens.verify::<AdminClaims>("not.a.token").is_err());
        assert!(tokens.verify::<AdminClaims>("garbage").is_err());
    }
}
