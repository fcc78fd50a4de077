//! Xero.
//!
//! Client credentials travel as HTTP Basic auth. Access tokens live for 30
//! minutes and refresh tokens rotate on every use.

use super::token_endpoint::{self, ClientAuth, TokenEndpoint};
use super::{expiry_from, IntegrationConfig, IntegrationType, TokenResponse};
use crate::error::AdapterError;
use chrono::{DateTime, Utc};

pub const DEFAULT_TOKEN_URL: &str = "https://identity.xero.com/connect/token";
pub const DEFAULT_AUTH_URL: &str = "https://login.xero.com/identity/connect/authorize";
pub const DEFAULT_EXPIRES_IN: i64 = 1800;
const DEFAULT_SCOPES: &[&str] = &["openid", "offline_access", "accounting.transactions"];

pub struct XeroAdapter {
    endpoint: TokenEndpoint,
    auth_url: String,
    scopes: Vec<String>,
}

impl XeroAdapter {
    pub fn new(config: &IntegrationConfig, http: reqwest::Client) -> Result<Self, AdapterError> {
        Ok(Self {
            endpoint: TokenEndpoint::from_config(
                IntegrationType::Xero,
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

    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenResponse, AdapterError> {
        self.endpoint.refresh(refresh_token).await
    }

    pub fn compute_expiry(&self, token: &TokenResponse) -> Result<DateTime<Utc>, AdapterError> {
        expiry_from(token, IntegrationType::Xero, DEFAULT_EXPIRES_IN, Utc::now())
    }

    pub fn authorization_url(&self, state: &str) -> String {
        token_endpoint::authorization_url(&self.auth_url, &self.endpoint, &self.scopes, " ", state, &[])
    }
}
