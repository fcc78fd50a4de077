pub mod env;

use anyhow::{Context, Result};
use serde::Deserialize;

pub use crate::integrations::IntegrationConfig;
use crate::integrations::IntegrationType;

/// Complete gateway configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub integrations: IntegrationsConfig,
}

/// SQLite location
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

fn default_database_path() -> String {
    "gatekeeper.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Identity provider (Cognito user pool)
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub user_pool_id: String,
    /// App client id, the expected token audience
    #[serde(default)]
    pub client_id: String,
    /// Overrides the JWKS URL derived from region and pool
    #[serde(default)]
    pub jwks_url: Option<String>,
    #[serde(default = "default_jwks_cache_ttl")]
    pub jwks_cache_ttl_seconds: u64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_seconds: u64,
    /// Tolerated clock skew on token expiry
    #[serde(default)]
    pub leeway_seconds: u64,
}

fn default_jwks_cache_ttl() -> u64 {
    3600
}

fn default_fetch_timeout() -> u64 {
    10
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            region: String::new(),
            user_pool_id: String::new(),
            client_id: String::new(),
            jwks_url: None,
            jwks_cache_ttl_seconds: default_jwks_cache_ttl(),
            fetch_timeout_seconds: default_fetch_timeout(),
            leeway_seconds: 0,
        }
    }
}

impl IdentityConfig {
    /// The provider's JWKS endpoint, if enough is configured to know it.
    pub fn jwks_url(&self) -> Option<String> {
        if let Some(url) = self.jwks_url.as_ref().filter(|u| !u.is_empty()) {
            return Some(url.clone());
        }
        if self.region.is_empty() || self.user_pool_id.is_empty() {
            return None;
        }
        Some(format!(
            "https://cognito-idp.{}.amazonaws.com/{}/.well-known/jwks.json",
            self.region, self.user_pool_id
        ))
    }
}

/// Bearer token verification toggle
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// When false every caller is the fixed development user
    #[serde(default = "default_auth_enabled")]
    pub enabled: bool,
}

fn default_auth_enabled() -> bool {
    true
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: default_auth_enabled(),
        }
    }
}

/// Secrets
#[derive(Clone, Default, Deserialize)]
pub struct SecurityConfig {
    /// Credential encryption secret (32 bytes used as-is, anything else hashed)
    #[serde(default)]
    pub encryption_key: Option<String>,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Third-party OAuth clients
#[derive(Debug, Clone, Deserialize)]
pub struct IntegrationsConfig {
    /// Timeout for token endpoint calls
    #[serde(default = "default_integration_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub zoho: IntegrationConfig,
    #[serde(default)]
    pub quickbooks: IntegrationConfig,
    #[serde(default)]
    pub xero: IntegrationConfig,
}

fn default_integration_timeout() -> u64 {
    30
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_integration_timeout(),
            zoho: IntegrationConfig::default(),
            quickbooks: IntegrationConfig::default(),
            xero: IntegrationConfig::default(),
        }
    }
}

impl IntegrationsConfig {
    pub fn get(&self, kind: IntegrationType) -> &IntegrationConfig {
        match kind {
            IntegrationType::Zoho => &self.zoho,
            IntegrationType::QuickBooks => &self.quickbooks,
            IntegrationType::Xero => &self.xero,
        }
    }

    pub fn get_mut(&mut self, kind: IntegrationType) -> &mut IntegrationConfig {
        match kind {
            IntegrationType::Zoho => &mut self.zoho,
            IntegrationType::QuickBooks => &mut self.quickbooks,
            IntegrationType::Xero => &mut self.xero,
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<GatewayConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: GatewayConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file {}", path))?;
    Ok(config)
}
