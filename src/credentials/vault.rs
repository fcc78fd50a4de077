//! Encrypted credential storage using SQLite.
//!
//! Stores one OAuth token pair per (tenant, integration). Both tokens are
//! encrypted before the database is touched and the row is written inside a
//! single immediate transaction, so readers never observe a half-written pair.

use super::{Credential, CredentialCipher, CredentialLookup, DecryptedCredential, ExpiredCredential, NewCredential};
use crate::db::{parse_timestamp, timestamp, Database};
use crate::error::{StorageError, VaultError};
use crate::integrations::IntegrationType;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use tracing::{debug, warn};

const SELECT_COLUMNS: &str = r#"
    SELECT id, tenant_id, integration,
           access_token, refresh_token, expires_at,
           org_id, external_tenant_id, additional_data,
           created_at, updated_at
    FROM credentials
"#;

/// Encrypted credential vault backed by the gateway database.
///
/// # Schema
/// ```sql
/// CREATE TABLE credentials (
///     id                 INTEGER PRIMARY KEY AUTOINCREMENT,
///     tenant_id          TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
///     integration        TEXT NOT NULL,     -- zoho | quickbooks | xero
///     access_token       TEXT NOT NULL,     -- Encrypted
///     refresh_token      TEXT NOT NULL,     -- Encrypted
///     expires_at         TEXT NOT NULL,     -- ISO 8601 timestamp
///     org_id             TEXT,
///     external_tenant_id TEXT,
///     additional_data    TEXT,              -- JSON
///     created_at         TEXT NOT NULL,
///     updated_at         TEXT NOT NULL,
///     UNIQUE(tenant_id, integration)
/// );
/// ```
///
/// # Thread Safety
/// - Writes for the same pair are serialized by the connection mutex and the
///   immediate transaction
/// - The vault is the only component that writes ciphertext
pub struct CredentialVault {
    db: Database,
    cipher: CredentialCipher,
}

/// Raw column values, parsed into a [`Credential`] outside the row closure.
struct CredentialRow {
    id: i64,
    tenant_id: String,
    integration: String,
    access_token: String,
    refresh_token: String,
    expires_at: String,
    org_id: Option<String>,
    external_tenant_id: Option<String>,
    additional_data: Option<String>,
    created_at: String,
    updated_at: String,
}

impl CredentialRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            integration: row.get(2)?,
            access_token: row.get(3)?,
            refresh_token: row.get(4)?,
            expires_at: row.get(5)?,
            org_id: row.get(6)?,
            external_tenant_id: row.get(7)?,
            additional_data: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_credential(self) -> Result<Credential, StorageError> {
        let integration = self
            .integration
            .parse::<IntegrationType>()
            .map_err(StorageError::Corrupt)?;
        let additional_data = self
            .additional_data
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|e| StorageError::Corrupt(format!("additional_data: {}", e)))?;

        Ok(Credential {
            id: self.id,
            tenant_id: self.tenant_id,
            integration,
            encrypted_access_token: self.access_token,
            encrypted_refresh_token: self.refresh_token,
            expires_at: parse_timestamp("expires_at", &self.expires_at)?,
            org_id: self.org_id,
            external_tenant_id: self.external_tenant_id,
            additional_data,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
        })
    }
}

impl CredentialVault {
    pub fn new(db: Database, cipher: CredentialCipher) -> Self {
        Self { db, cipher }
    }

    /// Stores credentials for a tenant and integration.
    ///
    /// If a row already exists for the pair it is overwritten in place: same
    /// id and `created_at`, new tokens, metadata and `updated_at`.
    pub fn store(
        &self,
        tenant_id: &str,
        integration: IntegrationType,
        credential: &NewCredential,
    ) -> Result<Credential, VaultError> {
        // Encrypt both tokens before opening the transaction
        let access_token = self.cipher.encrypt(&credential.access_token)?;
        let refresh_token = self.cipher.encrypt(&credential.refresh_token)?;

        let additional_data = credential.additional_data.as_ref().map(|v| v.to_string());
        let expires_at = timestamp(&credential.expires_at);
        let now = timestamp(&Utc::now());

        let mut conn = self.db.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            r#"
            INSERT INTO credentials (
                tenant_id, integration,
                access_token, refresh_token, expires_at,
                org_id, external_tenant_id, additional_data,
                created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            ON CONFLICT(tenant_id, integration) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                org_id = excluded.org_id,
                external_tenant_id = excluded.external_tenant_id,
                additional_data = excluded.additional_data,
                updated_at = excluded.updated_at
            "#,
            params![
                tenant_id,
                integration.as_str(),
                access_token,
                refresh_token,
                expires_at,
                credential.org_id,
                credential.external_tenant_id,
                additional_data,
                now,
            ],
        )?;

        let row = tx.query_row(
            &format!("{} WHERE tenant_id = ?1 AND integration = ?2", SELECT_COLUMNS),
            params![tenant_id, integration.as_str()],
            CredentialRow::from_row,
        )?;
        let stored = row.into_credential()?;

        tx.commit()?;

        debug!(
            tenant_id = %tenant_id,
            integration = %integration,
            credential_id = stored.id,
            expires_at = %stored.expires_at,
            "Stored encrypted credentials"
        );

        Ok(stored)
    }

    /// Returns the stored row (ciphertext and metadata) without decrypting.
    pub fn find(
        &self,
        tenant_id: &str,
        integration: IntegrationType,
    ) -> Result<Option<Credential>, VaultError> {
        let conn = self.db.lock()?;
        let row = conn
            .query_row(
                &format!("{} WHERE tenant_id = ?1 AND integration = ?2", SELECT_COLUMNS),
                params![tenant_id, integration.as_str()],
                CredentialRow::from_row,
            )
            .optional()?;

        Ok(row.map(CredentialRow::into_credential).transpose()?)
    }

    /// Retrieves and decrypts credentials for a tenant and integration.
    ///
    /// # Returns
    /// * `Ok(Some(Active))` - Access token still valid
    /// * `Ok(Some(Expired))` - Access token expired; carries the refresh token
    /// * `Ok(None)` - No credentials stored
    /// * `Err` - Decryption failed (fatal for this record) or database error
    pub fn retrieve(
        &self,
        tenant_id: &str,
        integration: IntegrationType,
    ) -> Result<Option<CredentialLookup>, VaultError> {
        self.retrieve_at(tenant_id, integration, Utc::now())
    }

    /// [`retrieve`](Self::retrieve) against an explicit clock.
    pub fn retrieve_at(
        &self,
        tenant_id: &str,
        integration: IntegrationType,
        now: DateTime<Utc>,
    ) -> Result<Option<CredentialLookup>, VaultError> {
        let Some(credential) = self.find(tenant_id, integration)? else {
            return Ok(None);
        };

        let refresh_token = self.decrypt(&credential, &credential.encrypted_refresh_token)?;

        if now >= credential.expires_at {
            debug!(
                tenant_id = %tenant_id,
                integration = %integration,
                expires_at = %credential.expires_at,
                "Stored access token has expired"
            );
            return Ok(Some(CredentialLookup::Expired(ExpiredCredential {
                refresh_token,
                expires_at: credential.expires_at,
                org_id: credential.org_id,
                external_tenant_id: credential.external_tenant_id,
                additional_data: credential.additional_data,
            })));
        }

        let access_token = self.decrypt(&credential, &credential.encrypted_access_token)?;

        Ok(Some(CredentialLookup::Active(DecryptedCredential {
            access_token,
            refresh_token,
            expires_at: credential.expires_at,
            org_id: credential.org_id,
            external_tenant_id: credential.external_tenant_id,
            additional_data: credential.additional_data,
        })))
    }

    fn decrypt(&self, credential: &Credential, ciphertext: &str) -> Result<String, VaultError> {
        self.cipher.decrypt(ciphertext).map_err(|e| {
            warn!(
                tenant_id = %credential.tenant_id,
                integration = %credential.integration,
                credential_id = credential.id,
                "Stored credential could not be decrypted (key mismatch or corruption)"
            );
            VaultError::Cipher(e)
        })
    }

    /// Deletes credentials for a tenant and integration.
    ///
    /// # Returns
    /// * `Ok(true)` - A row existed and was deleted
    /// * `Ok(false)` - Nothing stored
    pub fn delete(&self, tenant_id: &str, integration: IntegrationType) -> Result<bool, VaultError> {
        let rows_affected = self.db.lock()?.execute(
            "DELETE FROM credentials WHERE tenant_id = ?1 AND integration = ?2",
            params![tenant_id, integration.as_str()],
        )?;

        if rows_affected > 0 {
            debug!(tenant_id = %tenant_id, integration = %integration, "Deleted credentials");
        }

        Ok(rows_affected > 0)
    }

    /// Lists the integrations a tenant has credentials for.
    pub fn list_integrations(&self, tenant_id: &str) -> Result<Vec<IntegrationType>, VaultError> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(
            "SELECT integration FROM credentials WHERE tenant_id = ?1 ORDER BY integration",
        )?;

        let names = stmt
            .query_map(params![tenant_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<String>, _>>()?;

        let integrations = names
            .iter()
            .map(|name| name.parse::<IntegrationType>().map_err(StorageError::Corrupt))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(integrations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CipherError;
    use chrono::Duration;
    use serde_json::json;
    use std::sync::Arc;

    fn seed_tenant(db: &Database, id: &str) {
        let now = timestamp(&Utc::now());
        db.lock()
            .unwrap()
            .execute(
                "INSERT INTO tenants (id, business_name, business_type, email, created_at, updated_at)
                 VALUES (?1, 'Acme', 'llc', ?2, ?3, ?3)",
                params![id, format!("{}@example.com", id), now],
            )
            .unwrap();
    }

    fn create_test_vault() -> (Database, CredentialVault) {
        let db = Database::open_in_memory().unwrap();
        seed_tenant(&db, "t1");
        seed_tenant(&db, "t2");
        let vault = CredentialVault::new(db.clone(), CredentialCipher::new("vault-test-secret").unwrap());
        (db, vault)
    }

    fn create_test_credentials() -> NewCredential {
        NewCredential::new(
            "access-token-12345",
            "refresh-token-67890",
            Utc::now() + Duration::hours(1),
        )
        .with_org_id(Some("org-1".to_string()))
        .with_additional_data(Some(json!({"api_domain": "https://www.zohoapis.in"})))
    }

    fn count_rows(db: &Database) -> i64 {
        db.lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM credentials", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_store_and_retrieve() {
        let (_, vault) = create_test_vault();
        let creds = create_test_credentials();

        let stored = vault.store("t1", IntegrationType::Zoho, &creds).expect("Failed to store");
        assert_eq!(stored.tenant_id, "t1");
        assert_eq!(stored.integration, IntegrationType::Zoho);
        assert_ne!(stored.encrypted_access_token, creds.access_token);

        let retrieved = vault
            .retrieve("t1", IntegrationType::Zoho)
            .expect("Failed to retrieve")
            .expect("Credentials not found");

        match retrieved {
            CredentialLookup::Active(active) => {
                assert_eq!(active.access_token, creds.access_token);
                assert_eq!(active.refresh_token, creds.refresh_token);
                assert_eq!(active.org_id.as_deref(), Some("org-1"));
                assert_eq!(
                    active.additional_data,
                    Some(json!({"api_domain": "https://www.zohoapis.in"}))
                );
            }
            other => panic!("expected active credentials, got {:?}", other),
        }
    }

    #[test]
    fn test_retrieve_nonexistent() {
        let (_, vault) = create_test_vault();
        assert!(vault.retrieve("t1", IntegrationType::Xero).unwrap().is_none());
    }

    #[test]
    fn test_store_twice_is_upsert() {
        let (db, vault) = create_test_vault();

        let first = vault
            .store("t1", IntegrationType::QuickBooks, &create_test_credentials())
            .unwrap();

        let second_creds = NewCredential::new("new-access", "new-refresh", Utc::now() + Duration::hours(2))
            .with_external_tenant_id(Some("realm-9".to_string()));
        let second = vault.store("t1", IntegrationType::QuickBooks, &second_creds).unwrap();

        assert_eq!(count_rows(&db), 1);
        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
        // Metadata reflects the second call, including cleared fields
        assert_eq!(second.org_id, None);
        assert_eq!(second.external_tenant_id.as_deref(), Some("realm-9"));
        assert_eq!(second.additional_data, None);

        match vault.retrieve("t1", IntegrationType::QuickBooks).unwrap().unwrap() {
            CredentialLookup::Active(active) => {
                assert_eq!(active.access_token, "new-access");
                assert_eq!(active.refresh_token, "new-refresh");
            }
            other => panic!("expected active credentials, got {:?}", other),
        }
    }

    #[test]
    fn test_expired_credentials_carry_refresh_token() {
        let (_, vault) = create_test_vault();
        let past = Utc::now() - Duration::minutes(5);

        vault
            .store("t1", IntegrationType::Zoho, &NewCredential::new("A", "R", past))
            .unwrap();

        match vault.retrieve("t1", IntegrationType::Zoho).unwrap().unwrap() {
            CredentialLookup::Expired(expired) => {
                assert_eq!(expired.refresh_token, "R");
                assert_eq!(expired.expires_at, past);
            }
            other => panic!("expected expired credentials, got {:?}", other),
        }
    }

    #[test]
    fn test_expiry_boundary_is_expired() {
        let (_, vault) = create_test_vault();
        let expires_at = Utc::now() + Duration::minutes(10);
        vault
            .store("t1", IntegrationType::Xero, &NewCredential::new("A", "R", expires_at))
            .unwrap();

        let just_before = vault
            .retrieve_at("t1", IntegrationType::Xero, expires_at - Duration::seconds(1))
            .unwrap()
            .unwrap();
        assert!(!just_before.is_expired());

        let at_expiry = vault
            .retrieve_at("t1", IntegrationType::Xero, expires_at)
            .unwrap()
            .unwrap();
        assert!(at_expiry.is_expired());
    }

    #[test]
    fn test_tokens_are_ciphertext_at_rest() {
        let (db, vault) = create_test_vault();
        vault
            .store("t1", IntegrationType::Zoho, &create_test_credentials())
            .unwrap();

        let (access, refresh): (String, String) = db
            .lock()
            .unwrap()
            .query_row(
                "SELECT access_token, refresh_token FROM credentials WHERE tenant_id = 't1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert!(!access.contains("access-token-12345"));
        assert!(!refresh.contains("refresh-token-67890"));
    }

    #[test]
    fn test_decryption_failure_is_not_masked() {
        let (db, vault) = create_test_vault();
        vault
            .store("t1", IntegrationType::Zoho, &create_test_credentials())
            .unwrap();

        let other = CredentialVault::new(db, CredentialCipher::new("a-different-secret").unwrap());
        let result = other.retrieve("t1", IntegrationType::Zoho);
        assert!(matches!(
            result,
            Err(VaultError::Cipher(CipherError::Decryption(_)))
        ));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (_, vault) = create_test_vault();
        vault
            .store("t1", IntegrationType::Zoho, &create_test_credentials())
            .unwrap();

        assert!(vault.delete("t1", IntegrationType::Zoho).unwrap());
        assert!(vault.retrieve("t1", IntegrationType::Zoho).unwrap().is_none());
        assert!(!vault.delete("t1", IntegrationType::Zoho).unwrap());
    }

    #[test]
    fn test_list_integrations() {
        let (_, vault) = create_test_vault();
        let creds = create_test_credentials();

        vault.store("t1", IntegrationType::Zoho, &creds).unwrap();
        vault.store("t1", IntegrationType::Xero, &creds).unwrap();
        vault.store("t2", IntegrationType::QuickBooks, &creds).unwrap();

        let t1 = vault.list_integrations("t1").unwrap();
        assert_eq!(t1, vec![IntegrationType::Xero, IntegrationType::Zoho]);

        let t2 = vault.list_integrations("t2").unwrap();
        assert_eq!(t2, vec![IntegrationType::QuickBooks]);

        assert!(vault.list_integrations("t3").unwrap().is_empty());
    }

    #[test]
    fn test_store_for_unknown_tenant_writes_nothing() {
        let (db, vault) = create_test_vault();
        let result = vault.store("missing", IntegrationType::Zoho, &create_test_credentials());
        assert!(matches!(result, Err(VaultError::Storage(_))));
        assert_eq!(count_rows(&db), 0);
    }

    #[test]
    fn test_tenant_delete_cascades() {
        let (db, vault) = create_test_vault();
        vault
            .store("t1", IntegrationType::Zoho, &create_test_credentials())
            .unwrap();

        db.lock()
            .unwrap()
            .execute("DELETE FROM tenants WHERE id = 't1'", [])
            .unwrap();

        assert!(vault.retrieve("t1", IntegrationType::Zoho).unwrap().is_none());
    }

    #[test]
    fn test_concurrent_stores_keep_pairs_consistent() {
        let (db, vault) = create_test_vault();
        let vault = Arc::new(vault);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let vault = Arc::clone(&vault);
                std::thread::spawn(move || {
                    let creds = NewCredential::new(
                        format!("access-{}", i),
                        format!("refresh-{}", i),
                        Utc::now() + Duration::hours(1),
                    );
                    vault.store("t1", IntegrationType::Zoho, &creds).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(count_rows(&db), 1);
        match vault.retrieve("t1", IntegrationType::Zoho).unwrap().unwrap() {
            CredentialLookup::Active(active) => {
                let access_suffix = active.access_token.trim_start_matches("access-");
                let refresh_suffix = active.refresh_token.trim_start_matches("refresh-");
                assert_eq!(access_suffix, refresh_suffix);
            }
            other => panic!("expected active credentials, got {:?}", other),
        }
    }
}
