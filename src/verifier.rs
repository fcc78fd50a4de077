//! Bearer token verification against the identity provider's signing keys.
//!
//! Verification never touches the network itself; keys come from a
//! [`KeySource`], normally the shared [`KeyRing`](crate::keyring::KeyRing).
//! A key id missing from the current snapshot is not retried against a
//! refetch.

use crate::error::VerifyError;
use crate::keyring::KeySource;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Claims of an identity-provider issued token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Remaining claims (aud, iat, token_use, cognito:username, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Outcome of a successful verification.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedToken {
    pub subject: String,
    pub key_id: String,
    pub claims: Claims,
}

pub struct TokenVerifier {
    keys: Arc<dyn KeySource>,
    client_id: String,
    leeway_secs: u64,
}

impl TokenVerifier {
    /// `client_id` is the audience every accepted token must carry.
    pub fn new(keys: Arc<dyn KeySource>, client_id: impl Into<String>) -> Self {
        Self {
            keys,
            client_id: client_id.into(),
            leeway_secs: 0,
        }
    }

    /// Tolerated clock skew on `exp`.
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Number of signing keys currently obtainable from the key source.
    pub async fn key_count(&self) -> usize {
        self.keys.get_keys().await.len()
    }

    pub async fn verify(&self, token: &str) -> Result<VerifiedToken, VerifyError> {
        let header = decode_header(token).map_err(|_| VerifyError::MalformedToken)?;
        let key_id = header.kid.ok_or(VerifyError::MalformedToken)?;

        let keys = self.keys.get_keys().await;
        if keys.is_empty() {
            tracing::warn!("No signing keys available, rejecting token");
            return Err(VerifyError::KeyUnavailable);
        }

        let jwk = keys.get(&key_id).ok_or_else(|| {
            tracing::debug!(kid = %key_id, "Token signed with unknown key");
            VerifyError::UnknownKey(key_id.clone())
        })?;
        let key = DecodingKey::from_jwk(jwk)
            .map_err(|e| VerifyError::InvalidToken(format!("unusable signing key: {}", e)))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.client_id.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "aud"]);
        validation.leeway = self.leeway_secs;

        let data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => VerifyError::Expired,
            _ => VerifyError::InvalidToken(e.to_string()),
        })?;

        Ok(VerifiedToken {
            subject: data.claims.sub.clone(),
            key_id,
            claims: data.claims,
        })
    }
}
