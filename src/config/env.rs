//! `GATEKEEPER_*` environment overrides.
//!
//! Values that fail to parse are logged and ignored, leaving the file or
//! default value in place.

use super::GatewayConfig;
use crate::integrations::IntegrationType;

impl GatewayConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env_overrides(|name| std::env::var(name).ok());
        cfg
    }

    /// Overlays variables returned by `lookup` on top of this configuration.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("GATEKEEPER_DATABASE_PATH") {
            self.database.path = v;
        }

        if let Some(v) = lookup("GATEKEEPER_REGION") {
            self.identity.region = v;
        }
        if let Some(v) = lookup("GATEKEEPER_USER_POOL_ID") {
            self.identity.user_pool_id = v;
        }
        if let Some(v) = lookup("GATEKEEPER_CLIENT_ID") {
            self.identity.client_id = v;
        }
        if let Some(v) = lookup("GATEKEEPER_JWKS_URL") {
            self.identity.jwks_url = Some(v);
        }
        if let Some(n) = parsed(&lookup, "GATEKEEPER_JWKS_CACHE_TTL_SECONDS") {
            self.identity.jwks_cache_ttl_seconds = n;
        }
        if let Some(n) = parsed(&lookup, "GATEKEEPER_FETCH_TIMEOUT_SECONDS") {
            self.identity.fetch_timeout_seconds = n;
        }
        if let Some(n) = parsed(&lookup, "GATEKEEPER_LEEWAY_SECONDS") {
            self.identity.leeway_seconds = n;
        }

        if let Some(b) = parsed(&lookup, "GATEKEEPER_AUTH_ENABLED") {
            self.auth.enabled = b;
        }

        if let Some(v) = lookup("GATEKEEPER_ENCRYPTION_KEY") {
            self.security.encryption_key = Some(v);
        }

        if let Some(n) = parsed(&lookup, "GATEKEEPER_INTEGRATIONS_TIMEOUT_SECONDS") {
            self.integrations.timeout_seconds = n;
        }
        for kind in IntegrationType::ALL {
            let prefix = format!("GATEKEEPER_{}", kind.as_str().to_uppercase());
            let integration = self.integrations.get_mut(kind);

            if let Some(v) = lookup(&format!("{}_CLIENT_ID", prefix)) {
                integration.client_id = Some(v);
            }
            if let Some(v) = lookup(&format!("{}_CLIENT_SECRET", prefix)) {
                integration.client_secret = Some(v);
            }
            if let Some(v) = lookup(&format!("{}_REDIRECT_URI", prefix)) {
                integration.redirect_uri = Some(v);
            }
            if let Some(v) = lookup(&format!("{}_TOKEN_URL", prefix)) {
                integration.token_url = Some(v);
            }
            if let Some(v) = lookup(&format!("{}_AUTH_URL", prefix)) {
                integration.auth_url = Some(v);
            }
        }
    }
}

fn parsed<F, T>(lookup: &F, name: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}
