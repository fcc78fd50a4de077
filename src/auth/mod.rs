//! Request authentication.
//!
//! The strategy is chosen once, when the [`Authenticator`] is built from
//! configuration: either every bearer token is verified and bound to an
//! internal user, or verification is disabled and every caller is the fixed
//! development user. Nothing downstream branches on the toggle.

use crate::config::GatewayConfig;
use crate::error::{BinderError, Rejection, VerifyError};
use crate::identity::{BusinessType, IdentityBinder, Role, Tenant, User, UserStatus};
use crate::keyring::KeyRing;
use crate::verifier::{Claims, TokenVerifier};
use anyhow::{bail, Context, Result};
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;


/// Subject of the development user served when verification is disabled.
pub const DEV_SUBJECT: &str = "dev-user-id";

/// Tenant of the development user.
pub const DEV_TENANT_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Extract bearer token from HTTP Authorization header
///
/// Expected format: "Authorization: Bearer <token>"
/// Returns the token string if present and valid.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, TokenError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(TokenError::Missing)?
        .to_str()
        .map_err(|_| TokenError::InvalidFormat)?;

    parse_bearer_token(auth_header)
}

/// Parse bearer token from Authorization header value
fn parse_bearer_token(header_value: &str) -> Result<String, TokenError> {
    let parts: Vec<&str> = header_value.splitn(2, ' ').collect();

    if parts.len() != 2 {
        return Err(TokenError::InvalidFormat);
    }

    if !parts[0].eq_ignore_ascii_case("bearer") {
        return Err(TokenError::InvalidFormat);
    }

    let token = parts[1].trim();
    if token.is_empty() {
        return Err(TokenError::Empty);
    }

    Ok(token.to_string())
}

/// Token extraction errors
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum TokenError {
    /// Authorization header not present
    #[error("authorization header missing")]
    Missing,
    /// Not "Bearer <token>"
    #[error("authorization header is not a bearer token")]
    InvalidFormat,
    /// Token is empty string
    #[error("bearer token is empty")]
    Empty,
}

/// Authentication failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Identity(#[from] BinderError),

    /// Known user whose account is not active
    #[error("user account is {0}")]
    Inactive(&'static str),
}

impl AuthError {
    pub fn rejection(&self) -> Rejection {
        match self {
            AuthError::Token(_) => Rejection::Unauthenticated,
            AuthError::Verify(e) => e.rejection(),
            AuthError::Identity(e) => e.rejection(),
            AuthError::Inactive(_) => Rejection::Forbidden,
        }
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    pub user: User,
    /// Verified token claims; `None` for the development user
    pub claims: Option<Claims>,
}

impl AuthContext {
    pub fn tenant_id(&self) -> &str {
        &self.user.tenant_id
    }

    pub fn require_role(&self, role: Role) -> Result<(), BinderError> {
        IdentityBinder::require_role(&self.user, role)
    }
}

enum Strategy {
    Verified {
        verifier: Arc<TokenVerifier>,
        binder: IdentityBinder,
    },
    Disabled {
        user: User,
    },
}

pub struct Authenticator {
    strategy: Strategy,
}

impl Authenticator {
    /// Verifies bearer tokens and binds them to internal users.
    pub fn verified(verifier: Arc<TokenVerifier>, binder: IdentityBinder) -> Self {
        Self {
            strategy: Strategy::Verified { verifier, binder },
        }
    }

    /// Treats every caller as the fixed development user.
    ///
    /// Does not touch the database; [`from_config`](Self::from_config) also
    /// seeds the development tenant so tenant-scoped writes succeed.
    pub fn disabled() -> Self {
        Self {
            strategy: Strategy::Disabled { user: dev_user() },
        }
    }

    /// Selects the strategy from `config.auth.enabled`.
    ///
    /// With auth enabled the identity provider must be fully configured; the
    /// key ring is created empty and fetched on first use.
    pub fn from_config(config: &GatewayConfig, binder: IdentityBinder) -> Result<Self> {
        if !config.auth.enabled {
            binder
                .ensure_tenant(&dev_tenant())
                .context("Failed to seed the development tenant")?;
            tracing::warn!(
                subject = DEV_SUBJECT,
                tenant_id = DEV_TENANT_ID,
                "Authentication DISABLED, every request runs as the development user"
            );
            return Ok(Self::disabled());
        }

        let identity = &config.identity;
        let jwks_url = identity
            .jwks_url()
            .context("identity.region and identity.user_pool_id (or identity.jwks_url) are required when auth is enabled")?;
        if identity.client_id.is_empty() {
            bail!("identity.client_id is required when auth is enabled");
        }

        let keyring = KeyRing::new(
            jwks_url,
            Duration::from_secs(identity.jwks_cache_ttl_seconds),
            Duration::from_secs(identity.fetch_timeout_seconds),
        )?;
        let verifier = TokenVerifier::new(Arc::new(keyring), identity.client_id.clone())
            .with_leeway(identity.leeway_seconds);

        Ok(Self::verified(Arc::new(verifier), binder))
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.strategy, Strategy::Verified { .. })
    }

    /// Authenticates a raw bearer token.
    ///
    /// Verified path: verify signature and claims, resolve the subject to an
    /// internal user, and require that user to be active.
    pub async fn authenticate(&self, bearer: Option<&str>) -> Result<AuthContext, AuthError> {
        match &self.strategy {
            Strategy::Disabled { user } => Ok(AuthContext {
                user: user.clone(),
                claims: None,
            }),
            Strategy::Verified { verifier, binder } => {
                let token = bearer.ok_or(TokenError::Missing)?;
                if token.trim().is_empty() {
                    return Err(TokenError::Empty.into());
                }

                let verified = verifier.verify(token).await.map_err(|e| {
                    tracing::warn!(error = %e, "Token verification failed");
                    e
                })?;
                let user = binder.resolve(&verified.subject)?;

                if user.status != UserStatus::Active {
                    tracing::debug!(user_id = user.id, status = user.status.as_str(), "Rejected non-active user");
                    return Err(AuthError::Inactive(user.status.as_str()));
                }

                Ok(AuthContext {
                    user,
                    claims: Some(verified.claims),
                })
            }
        }
    }

    /// Authenticates the `Authorization` header of a request.
    pub async fn authenticate_headers(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        if !self.is_enabled() {
            return self.authenticate(None).await;
        }
        let token = extract_bearer_token(headers)?;
        self.authenticate(Some(&token)).await
    }

    /// Fetches signing keys ahead of the first request. Returns the number
    /// of keys available; always 0 when verification is disabled.
    pub async fn warm(&self) -> usize {
        match &self.strategy {
            Strategy::Verified { verifier, .. } => verifier.key_count().await,
            Strategy::Disabled { .. } => 0,
        }
    }
}

fn dev_tenant() -> Tenant {
    let epoch = DateTime::<Utc>::default();
    Tenant {
        id: DEV_TENANT_ID.to_string(),
        business_name: "Development Tenant".to_string(),
        business_type: BusinessType::Other,
        email: "dev-tenant@example.com".to_string(),
        estimated_invoices_monthly: None,
        created_at: epoch,
        updated_at: epoch,
    }
}

fn dev_user() -> User {
    let epoch = DateTime::<Utc>::default();
    User {
        id: 1,
        tenant_id: DEV_TENANT_ID.to_string(),
        subject: DEV_SUBJECT.to_string(),
        email: "dev@example.com".to_string(),
        first_name: Some("Development".to_string()),
        last_name: Some("User".to_string()),
        role: Role::Admin,
        status: UserStatus::Active,
        created_at: epoch,
        updated_at: epoch,
    }
}
