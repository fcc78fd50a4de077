//! Component wiring from a [`GatewayConfig`].

use crate::auth::Authenticator;
use crate::config::GatewayConfig;
use crate::credentials::{CredentialCipher, CredentialCustodian, CredentialVault};
use crate::db::Database;
use crate::error::AdapterError;
use crate::identity::IdentityBinder;
use crate::integrations::{Integration, IntegrationType};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Every long-lived component, built once at startup.
pub struct Gateway {
    binder: IdentityBinder,
    authenticator: Authenticator,
    custodian: CredentialCustodian,
    integrations: HashMap<IntegrationType, Integration>,
}

impl Gateway {
    /// Opens the database and builds all components.
    ///
    /// Fails when the encryption secret is missing, when auth is enabled
    /// without an identity provider, or when the database cannot be opened.
    /// Integrations without client credentials are skipped.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let cipher = CredentialCipher::new(config.security.encryption_key.as_deref().unwrap_or(""))
            .context("security.encryption_key is required")?;

        let db = Database::open(&config.database.path)?;
        Self::build(config, db, cipher)
    }

    /// Same as [`Gateway::from_config`] over an already opened database.
    pub fn with_database(config: &GatewayConfig, db: Database) -> Result<Self> {
        let cipher = CredentialCipher::new(config.security.encryption_key.as_deref().unwrap_or(""))
            .context("security.encryption_key is required")?;
        Self::build(config, db, cipher)
    }

    fn build(config: &GatewayConfig, db: Database, cipher: CredentialCipher) -> Result<Self> {
        let binder = IdentityBinder::new(db.clone());
        let authenticator = Authenticator::from_config(config, binder.clone())?;
        let custodian = CredentialCustodian::new(Arc::new(CredentialVault::new(db, cipher)));

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.integrations.timeout_seconds))
            .build()
            .context("Failed to build integrations HTTP client")?;

        let mut integrations = HashMap::new();
        for kind in IntegrationType::ALL {
            match Integration::from_config(kind, config.integrations.get(kind), http.clone()) {
                Ok(integration) => {
                    integrations.insert(kind, integration);
                }
                Err(AdapterError::NotConfigured(reason)) => {
                    tracing::debug!(integration = %kind, reason = %reason, "Integration not configured");
                }
                Err(e) => return Err(e).with_context(|| format!("Failed to configure {}", kind)),
            }
        }

        Ok(Self {
            binder,
            authenticator,
            custodian,
            integrations,
        })
    }

    pub fn binder(&self) -> &IdentityBinder {
        &self.binder
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn custodian(&self) -> &CredentialCustodian {
        &self.custodian
    }

    /// The adapter for `kind`, if its client credentials are configured.
    pub fn integration(&self, kind: IntegrationType) -> Option<&Integration> {
        self.integrations.get(&kind)
    }

    /// Configured integrations in declaration order.
    pub fn configured_integrations(&self) -> Vec<IntegrationType> {
        IntegrationType::ALL
            .into_iter()
            .filter(|kind| self.integrations.contains_key(kind))
            .collect()
    }
}
