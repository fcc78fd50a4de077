//! QuickBooks Online (Intuit).
//!
//! Client credentials travel as HTTP Basic auth. The company (realm) id
//! arrives on the redirect, not in the token response, so callers pass it to
//! the vault as the credential's `org_id`.

use super::token_endpoint::{self, ClientAuth, TokenEndpoint};
use super::{expiry_from, IntegrationConfig, IntegrationType, TokenResponse};
use crate::error::AdapterError;
use chrono::{DateTime, Utc};

pub const DEFAULT_TOKEN_URL: &str = "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer";
pub const DEFAULT_AUTH_URL: &str = "https://appcenter.intuit.com/connect/oauth2";
pub const DEFAULT_EXPIRES_IN: i64 = 3600;
const DEFAULT_SCOPES: &[&str] = &["com.intuit.quickbooks.accounting"];

pub struct QuickBooksAdapter {
    endpoint: TokenEndpoint,
    auth_url: String,
    scopes: Vec<String>,
}

impl QuickBooksAdapter {
    pub fn new(config: &IntegrationConfig, http: reqwest::Client) -> Result<Self, AdapterError> {
        Ok(Self {
            endpoint: TokenEndpoint::from_config(
                IntegrationType::QuickBooks,
                config,
                DEFAULT_TOKEN_URL,
                ClientAuth::BasicAuth,
                http,
            )?,
            auth_url: config
                .auth_url
                .clone()
                .unwrap_or_else(|| DEFAULT_AUTH_URL.to_string()),
            scopes: config
                .scopes
                .clone()
                .unwrap_or_else(|| DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()),
        })
    }

    pub async fn exchange_auth_code(&self, code: &str) -> Result<TokenResponse, AdapterError> {
        self.endpoint.authorization_code(code).await
    }

    /// Intuit may rotate the refresh token; the new one, when present, must
    /// replace the stored one.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenResponse, AdapterError> {
        self.endpoint.refresh(refresh_token).await
    }

    pub fn compute_expiry(&self, token: &TokenResponse) -> Result<DateTime<Utc>, AdapterError> {
        expiry_from(token, IntegrationType::QuickBooks, DEFAULT_EXPIRES_IN, Utc::now())
    }

    pub fn authorization_url(&self, state: &str) -> String {
        token_endpoint::authorization_url(&self.auth_url, &self.endpoint, &self.scopes, " ", state, &[])
    }
}
