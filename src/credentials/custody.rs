//! Connect and refresh flows joining the integration adapters to the vault.

use super::{Credential, CredentialLookup, CredentialVault, DecryptedCredential, NewCredential};
use crate::error::{AdapterError, CustodyError};
use crate::integrations::{Integration, IntegrationType};
use std::sync::Arc;

/// Keeps each tenant's integration credentials current.
#[derive(Clone)]
pub struct CredentialCustodian {
    vault: Arc<CredentialVault>,
}

impl CredentialCustodian {
    pub fn new(vault: Arc<CredentialVault>) -> Self {
        Self { vault }
    }

    pub fn vault(&self) -> &CredentialVault {
        &self.vault
    }

    /// Exchanges an authorization code and stores the resulting tokens,
    /// replacing any existing credential for the pair.
    pub async fn connect(
        &self,
        tenant_id: &str,
        integration: &Integration,
        code: &str,
        org_id: Option<String>,
        external_tenant_id: Option<String>,
    ) -> Result<Credential, CustodyError> {
        let kind = integration.integration_id();
        let token = integration.exchange_auth_code(code).await?;

        let refresh_token = token.refresh_token.clone().ok_or_else(|| AdapterError::InvalidResponse {
            integration: kind.to_string(),
            reason: "authorization response carried no refresh token".to_string(),
        })?;
        let expires_at = integration.compute_expiry(&token)?;

        let credential = NewCredential::new(token.access_token.clone(), refresh_token, expires_at)
            .with_org_id(org_id)
            .with_external_tenant_id(external_tenant_id)
            .with_additional_data(token.additional_data());

        let stored = self.vault.store(tenant_id, kind, &credential)?;
        tracing::info!(tenant_id, integration = %kind, "Integration connected");
        Ok(stored)
    }

    /// Returns a usable access token, refreshing and re-storing it first when
    /// the stored one has expired.
    ///
    /// A provider that does not rotate refresh tokens leaves the stored
    /// refresh token in place.
    pub async fn access_token(
        &self,
        tenant_id: &str,
        integration: &Integration,
    ) -> Result<DecryptedCredential, CustodyError> {
        let kind = integration.integration_id();
        let expired = match self.vault.retrieve(tenant_id, kind)? {
            None => {
                return Err(CustodyError::NotConnected {
                    tenant_id: tenant_id.to_string(),
                    integration: kind.to_string(),
                })
            }
            Some(CredentialLookup::Active(credential)) => return Ok(credential),
            Some(CredentialLookup::Expired(expired)) => expired,
        };

        tracing::debug!(tenant_id, integration = %kind, expired_at = %expired.expires_at, "Refreshing access token");
        let token = integration.refresh_access_token(&expired.refresh_token).await?;

        let refresh_token = token
            .refresh_token
            .clone()
            .unwrap_or_else(|| expired.refresh_token.clone());
        let expires_at = integration.compute_expiry(&token)?;
        let additional_data = token.additional_data().or(expired.additional_data);

        let credential = NewCredential::new(token.access_token.clone(), refresh_token, expires_at)
            .with_org_id(expired.org_id)
            .with_external_tenant_id(expired.external_tenant_id)
            .with_additional_data(additional_data);
        self.vault.store(tenant_id, kind, &credential)?;

        tracing::info!(tenant_id, integration = %kind, "Access token refreshed");
        Ok(DecryptedCredential {
            access_token: credential.access_token,
            refresh_token: credential.refresh_token,
            expires_at: credential.expires_at,
            org_id: credential.org_id,
            external_tenant_id: credential.external_tenant_id,
            additional_data: credential.additional_data,
        })
    }

    /// Removes the stored credential. Returns whether one existed.
    pub fn disconnect(&self, tenant_id: &str, kind: IntegrationType) -> Result<bool, CustodyError> {
        let removed = self.vault.delete(tenant_id, kind)?;
        if removed {
            tracing::info!(tenant_id, integration = %kind, "Integration disconnected");
        }
        Ok(removed)
    }

    pub fn connected(&self, tenant_id: &str) -> Result<Vec<IntegrationType>, CustodyError> {
        Ok(self.vault.list_integrations(tenant_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialCipher;
    use crate::db::{timestamp, Database};
    use crate::integrations::IntegrationConfig;
    use chrono::{Duration, Utc};
    use mockito::Matcher;
    use rusqlite::params;

    const TENANT: &str = "7d5f0c1e-0000-4000-8000-000000000001";

    fn custodian() -> CredentialCustodian {
        let db = Database::open_in_memory().unwrap();
        let now = timestamp(&Utc::now());
        db.lock()
            .unwrap()
            .execute(
                "INSERT INTO tenants (id, business_name, business_type, email, created_at, updated_at)
                 VALUES (?1, 'Acme', 'llc', 'owner@acme.test', ?2, ?2)",
                params![TENANT, now],
            )
            .unwrap();
        let vault = CredentialVault::new(db, CredentialCipher::new("custody-test").unwrap());
        CredentialCustodian::new(Arc::new(vault))
    }

    fn zoho(token_url: String) -> Integration {
        let config = IntegrationConfig {
            client_id: Some("client".to_string()),
            client_secret: Some("secret".to_string()),
            redirect_uri: Some("https://app.example.com/callback".to_string()),
            token_url: Some(token_url),
            ..Default::default()
        };
        Integration::from_config(IntegrationType::Zoho, &config, reqwest::Client::new()).unwrap()
    }

    #[tokio::test]
    async fn test_connect_stores_exchanged_tokens() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"access_token":"A1","refresh_token":"R1","expires_in":3600,"api_domain":"https://www.zohoapis.in"}"#)
            .create_async()
            .await;

        let custodian = custodian();
        let integration = zoho(format!("{}/token", server.url()));
        let stored = custodian
            .connect(TENANT, &integration, "code", Some("org-9".to_string()), None)
            .await
            .unwrap();
        assert_eq!(stored.org_id.as_deref(), Some("org-9"));

        let active = custodian.access_token(TENANT, &integration).await.unwrap();
        assert_eq!(active.access_token, "A1");
        assert_eq!(active.refresh_token, "R1");
        assert_eq!(active.additional_data.unwrap()["api_domain"], "https://www.zohoapis.in");
    }

    #[tokio::test]
    async fn test_connect_without_refresh_token_stores_nothing() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"access_token":"A1","expires_in":3600}"#)
            .create_async()
            .await;

        let custodian = custodian();
        let integration = zoho(format!("{}/token", server.url()));
        let err = custodian
            .connect(TENANT, &integration, "code", None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, CustodyError::Adapter(AdapterError::InvalidResponse { .. })));
        assert!(custodian.connected(TENANT).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unrepresentable_lifetime_stores_nothing() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"access_token":"A1","refresh_token":"R1","expires_in":9000000000000}"#)
            .create_async()
            .await;

        let custodian = custodian();
        let integration = zoho(format!("{}/token", server.url()));
        let err = custodian
            .connect(TENANT, &integration, "code", None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, CustodyError::Adapter(AdapterError::InvalidResponse { .. })));
        assert!(custodian.connected(TENANT).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_restored() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(Matcher::UrlEncoded("refresh_token".into(), "R".into()))
            .with_status(200)
            .with_body(r#"{"access_token":"A2","expires_in":3600}"#)
            .expect(1)
            .create_async()
            .await;

        let custodian = custodian();
        custodian
            .vault()
            .store(
                TENANT,
                IntegrationType::Zoho,
                &NewCredential::new("A", "R", Utc::now() - Duration::minutes(5))
                    .with_org_id(Some("org-1".to_string())),
            )
            .unwrap();

        let integration = zoho(format!("{}/token", server.url()));
        let refreshed = custodian.access_token(TENANT, &integration).await.unwrap();
        assert_eq!(refreshed.access_token, "A2");
        // Provider did not rotate, the old refresh token stays
        assert_eq!(refreshed.refresh_token, "R");
        assert_eq!(refreshed.org_id.as_deref(), Some("org-1"));

        // Second call is served from the vault without another refresh
        let again = custodian.access_token(TENANT, &integration).await.unwrap();
        assert_eq!(again.access_token, "A2");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_stored_credential() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let custodian = custodian();
        let expired_at = Utc::now() - Duration::minutes(1);
        custodian
            .vault()
            .store(TENANT, IntegrationType::Zoho, &NewCredential::new("A", "R", expired_at))
            .unwrap();

        let integration = zoho(format!("{}/token", server.url()));
        let err = custodian.access_token(TENANT, &integration).await.unwrap_err();
        assert!(matches!(err, CustodyError::Adapter(AdapterError::UpstreamAuth { status: 400, .. })));

        match custodian.vault().retrieve(TENANT, IntegrationType::Zoho).unwrap() {
            Some(CredentialLookup::Expired(expired)) => assert_eq!(expired.refresh_token, "R"),
            other => panic!("unexpected lookup: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_not_connected_and_disconnect() {
        let custodian = custodian();
        let integration = zoho("http://127.0.0.1:1/token".to_string());

        let err = custodian.access_token(TENANT, &integration).await.unwrap_err();
        assert!(matches!(err, CustodyError::NotConnected { .. }));

        assert!(!custodian.disconnect(TENANT, IntegrationType::Zoho).unwrap());
        custodian
            .vault()
            .store(
                TENANT,
                IntegrationType::Zoho,
                &NewCredential::new("A", "R", Utc::now() + Duration::hours(1)),
            )
            .unwrap();
        assert!(custodian.disconnect(TENANT, IntegrationType::Zoho).unwrap());
        assert!(custodian.connected(TENANT).unwrap().is_empty());
    }
}
