//! Accounting-system OAuth adapters.
//!
//! The set of integrations is closed: [`Integration`] is a sum type over the
//! Zoho, QuickBooks and Xero adapters and [`IntegrationType`] is the tag the
//! credential vault partitions on. Every adapter satisfies the same contract:
//!
//! - `exchange_auth_code` - authorization-code grant
//! - `refresh_access_token` - refresh-token grant
//! - `compute_expiry` - relative `expires_in` to an absolute timestamp
//! - `integration_id` - the vault partition key
//!
//! Request and response logging goes through [`redact`], which masks client
//! secrets, authorization codes and tokens before anything is emitted.

use crate::error::AdapterError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

pub mod quickbooks;
pub mod redact;
mod token_endpoint;
pub mod xero;
pub mod zoho;

pub use quickbooks::QuickBooksAdapter;
pub use xero::XeroAdapter;
pub use zoho::ZohoAdapter;

/// Supported third-party integrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationType {
    Zoho,
    QuickBooks,
    Xero,
}

impl IntegrationType {
    pub const ALL: [IntegrationType; 3] = [
        IntegrationType::Zoho,
        IntegrationType::QuickBooks,
        IntegrationType::Xero,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationType::Zoho => "zoho",
            IntegrationType::QuickBooks => "quickbooks",
            IntegrationType::Xero => "xero",
        }
    }
}

impl std::fmt::Display for IntegrationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntegrationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zoho" => Ok(IntegrationType::Zoho),
            "quickbooks" => Ok(IntegrationType::QuickBooks),
            "xero" => Ok(IntegrationType::Xero),
            other => Err(format!("unknown integration '{}'", other)),
        }
    }
}

/// OAuth client settings for one integration.
#[derive(Clone, Default, Deserialize)]
pub struct IntegrationConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    /// Token endpoint; provider default when unset
    #[serde(default)]
    pub token_url: Option<String>,
    /// Consent page; provider default when unset
    #[serde(default)]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
}

impl IntegrationConfig {
    /// Client id, secret and redirect URI are all present.
    pub fn is_configured(&self) -> bool {
        [&self.client_id, &self.client_secret, &self.redirect_uri]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.is_empty()))
    }
}

impl std::fmt::Debug for IntegrationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| redact::REDACTED))
            .field("redirect_uri", &self.redirect_uri)
            .field("token_url", &self.token_url)
            .field("auth_url", &self.auth_url)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Token endpoint response (standard OAuth 2.0 fields plus provider extras).
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Everything else the provider returned (api_domain, scope, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Accepts `expires_in` as a number or a numeric string.
fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(i64),
        Text(String),
    }

    match Option::<Seconds>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Seconds::Number(n)) => Ok(Some(n)),
        Some(Seconds::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

impl TokenResponse {
    /// Non-secret response fields, kept alongside the stored credential.
    pub fn additional_data(&self) -> Option<Value> {
        let mut data = Map::new();
        if let Some(expires_in) = self.expires_in {
            data.insert("expires_in".to_string(), Value::from(expires_in));
        }
        if let Some(token_type) = &self.token_type {
            data.insert("token_type".to_string(), Value::from(token_type.clone()));
        }
        for (key, value) in &self.extra {
            if !redact::is_secret_field(key) {
                data.insert(key.clone(), value.clone());
            }
        }

        if data.is_empty() {
            None
        } else {
            Some(Value::Object(data))
        }
    }
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &redact::REDACTED)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| redact::REDACTED))
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Converts a relative `expires_in` into an absolute timestamp anchored at `now`.
///
/// A lifetime too large to represent is an invalid provider response.
pub(crate) fn expiry_from(
    token: &TokenResponse,
    integration: IntegrationType,
    default_secs: i64,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, AdapterError> {
    let seconds = token.expires_in.unwrap_or(default_secs).max(0);
    Duration::try_seconds(seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| AdapterError::InvalidResponse {
            integration: integration.to_string(),
            reason: format!("expires_in of {} seconds is out of range", seconds),
        })
}

/// A configured accounting integration.
pub enum Integration {
    Zoho(ZohoAdapter),
    QuickBooks(QuickBooksAdapter),
    Xero(XeroAdapter),
}

impl Integration {
    /// Builds the adapter for `kind`, failing with
    /// [`AdapterError::NotConfigured`] when client credentials are missing.
    pub fn from_config(
        kind: IntegrationType,
        config: &IntegrationConfig,
        http: reqwest::Client,
    ) -> Result<Self, AdapterError> {
        Ok(match kind {
            IntegrationType::Zoho => Integration::Zoho(ZohoAdapter::new(config, http)?),
            IntegrationType::QuickBooks => {
                Integration::QuickBooks(QuickBooksAdapter::new(config, http)?)
            }
            IntegrationType::Xero => Integration::Xero(XeroAdapter::new(config, http)?),
        })
    }

    pub fn integration_id(&self) -> IntegrationType {
        match self {
            Integration::Zoho(_) => IntegrationType::Zoho,
            Integration::QuickBooks(_) => IntegrationType::QuickBooks,
            Integration::Xero(_) => IntegrationType::Xero,
        }
    }

    pub async fn exchange_auth_code(&self, code: &str) -> Result<TokenResponse, AdapterError> {
        match self {
            Integration::Zoho(a) => a.exchange_auth_code(code).await,
            Integration::QuickBooks(a) => a.exchange_auth_code(code).await,
            Integration::Xero(a) => a.exchange_auth_code(code).await,
        }
    }

    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenResponse, AdapterError> {
        match self {
            Integration::Zoho(a) => a.refresh_access_token(refresh_token).await,
            Integration::QuickBooks(a) => a.refresh_access_token(refresh_token).await,
            Integration::Xero(a) => a.refresh_access_token(refresh_token).await,
        }
    }

    pub fn compute_expiry(&self, token: &TokenResponse) -> Result<DateTime<Utc>, AdapterError> {
        match self {
            Integration::Zoho(a) => a.compute_expiry(token),
            Integration::QuickBooks(a) => a.compute_expiry(token),
            Integration::Xero(a) => a.compute_expiry(token),
        }
    }

    /// Provider consent page URL carrying the CSRF `state`.
    pub fn authorization_url(&self, state: &str) -> String {
        match self {
            Integration::Zoho(a) => a.authorization_url(state),
            Integration::QuickBooks(a) => a.authorization_url(state),
            Integration::Xero(a) => a.authorization_url(state),
        }
    }
}
